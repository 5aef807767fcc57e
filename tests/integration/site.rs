use anyhow::Result;

use staticsite_lib::config::{ConfigError, SiteConfig};
use staticsite_lib::site::graph::{CERTIFICATE_VALIDATION, DISTRIBUTION, validation_record_id};
use staticsite_lib::site::{ResourceKind, SiteOutputs, SitePlan};

use super::test_utils::{TempConfig, ZONE_ID, fixture};

const CONFIG: &str = r#"{
    "dirPath": "./www",
    "dnsZoneId": "Z0123456789EXAMPLE",
    "domainName": "example.com",
    "altDomainNames": "www.example.com,,cdn.example.com",
    "errorDocument": "404.html"
}"#;

#[test]
fn plan_from_config_file_declares_full_stack() -> Result<()> {
    let file = TempConfig::write(CONFIG)?;
    let config = SiteConfig::load(&file.path)?;
    let plan = SitePlan::build(&config, &SiteOutputs::placeholders())?;

    assert_eq!(
        plan.distribution.aliases,
        vec!["example.com", "www.example.com", "cdn.example.com"]
    );
    assert_eq!(plan.distribution.default_root_object, "index.html");
    assert_eq!(
        plan.distribution.custom_error_responses[0].response_page_path,
        "/404.html"
    );

    let records = plan
        .resources
        .nodes()
        .iter()
        .filter(|node| node.kind == ResourceKind::ValidationRecord)
        .count();
    assert_eq!(records, 3);
    assert_eq!(
        plan.apply_waves.last().map(Vec::as_slice),
        Some([DISTRIBUTION.to_string()].as_slice())
    );

    let json = serde_json::to_value(&plan)?;
    assert_eq!(json["bucketPolicy"]["Version"], "2012-10-17");
    assert_eq!(json["bucketFolder"]["acl"], "private");
    assert_eq!(json["outputs"]["cdnUrl"], "https://${distribution.domainName}");
    Ok(())
}

#[test]
fn graph_matches_records_the_provisioner_creates() -> Result<()> {
    let file = TempConfig::write(CONFIG)?;
    let config = SiteConfig::load(&file.path)?;
    let plan = SitePlan::build(&config, &SiteOutputs::placeholders())?;

    let fx = fixture();
    let handle = fx
        .provisioner
        .provision(&config.domain_name, &config.alt_domains(), ZONE_ID, true)?;

    let record_deps = plan.resources.dependencies_of(CERTIFICATE_VALIDATION)?;
    for option in &handle.certificate.validation_options {
        let base = option.domain.trim_start_matches("*.");
        assert!(record_deps.contains(&validation_record_id(base)));
    }
    assert_eq!(handle.validation_records.len(), record_deps.len() - 1);

    let outputs = SiteOutputs::placeholders().with_certificate_arn(handle.certificate_id());
    let plan = SitePlan::build(&config, &outputs)?;
    assert_eq!(
        plan.distribution.viewer_certificate.acm_certificate_arn,
        handle.certificate_id()
    );
    Ok(())
}

#[test]
fn wildcard_alias_shares_the_apex_record_node() -> Result<()> {
    let file = TempConfig::write(
        r#"{
            "dirPath": "./www",
            "dnsZoneId": "Z0123456789EXAMPLE",
            "domainName": "Example.com.",
            "altDomainNames": "*.example.com,www.example.com"
        }"#,
    )?;
    let config = SiteConfig::load(&file.path)?;
    let plan = SitePlan::build(&config, &SiteOutputs::placeholders())?;
    assert_eq!(plan.bucket, "example.com");

    let fx = fixture();
    let handle = fx
        .provisioner
        .provision(&config.domain_name, &config.alt_domains(), ZONE_ID, true)?;

    let record_nodes: Vec<String> = plan
        .resources
        .nodes()
        .iter()
        .filter(|node| node.kind == ResourceKind::ValidationRecord)
        .map(|node| node.id.clone())
        .collect();
    assert_eq!(record_nodes.len(), handle.validation_records.len());
    for option in &handle.certificate.validation_options {
        let base = option.domain.trim_start_matches("*.");
        assert!(record_nodes.contains(&validation_record_id(base)), "{}", option.domain);
    }
    Ok(())
}

#[test]
fn config_without_domain_is_rejected() -> Result<()> {
    let file = TempConfig::write(r#"{"dirPath": "www", "dnsZoneId": "Z1", "domainName": " "}"#)?;
    let err = SiteConfig::load(&file.path).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("domainName")), "{err:?}");
    Ok(())
}
