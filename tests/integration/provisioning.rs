use anyhow::{Result, anyhow};

use staticsite_lib::domain::fqdn;
use staticsite_lib::issuance::providers::InMemoryAuthority;
use staticsite_lib::issuance::{
    CertificateAuthority, CertificateRequest, CertificateStatus, DnsRecord, DnsRecordSpec,
    ProvisionError, RecordType,
};

use super::test_utils::{ZONE_ID, alts, fixture, fixture_with, lossy_fixture};

#[test]
fn single_domain_creates_one_validation_record_and_issues() -> Result<()> {
    let fx = fixture();
    let handle = fx.provisioner.provision("example.com", &[], ZONE_ID, true)?;

    assert_eq!(handle.certificate.status, CertificateStatus::Issued);
    assert_eq!(handle.validation_records.len(), 1);
    let record = &handle.validation_records[0];
    assert_eq!(record.name, "_acme.example.com.");
    assert_eq!(record.record_type, RecordType::Cname);
    assert_eq!(record.ttl, 60);
    assert_eq!(record.zone_id, ZONE_ID);

    let validation = handle
        .validation
        .as_ref()
        .ok_or_else(|| anyhow!("validated handle has no validation"))?;
    assert_eq!(validation.certificate_id, handle.certificate.id);
    assert_eq!(validation.validation_record_fqdns, vec![record.fqdn.clone()]);
    assert_eq!(fx.zone.records().len(), 1);
    Ok(())
}

#[test]
fn unvalidated_request_leaves_zone_untouched() -> Result<()> {
    let fx = fixture();
    let handle = fx
        .provisioner
        .provision_unvalidated("example.com", &alts(&["www.example.com"]), ZONE_ID)?;

    assert_eq!(handle.certificate.status, CertificateStatus::PendingValidation);
    assert!(handle.validation_records.is_empty());
    assert!(handle.validation.is_none());
    assert!(fx.zone.records().is_empty());
    Ok(())
}

#[test]
fn one_alternate_yields_two_records() -> Result<()> {
    let fx = fixture();
    let handle = fx
        .provisioner
        .provision("example.com", &alts(&["www.example.com"]), ZONE_ID, true)?;

    let names: Vec<&str> = handle
        .validation_records
        .iter()
        .map(|record| record.name.as_str())
        .collect();
    assert_eq!(names, vec!["_acme.example.com.", "_acme.www.example.com."]);
    assert!(handle.certificate.is_issued());
    Ok(())
}

#[test]
fn every_alternate_is_proven() -> Result<()> {
    let fx = fixture();
    let domains = ["www.example.com", "cdn.example.com", "static.example.com"];
    let handle = fx
        .provisioner
        .provision("example.com", &alts(&domains), ZONE_ID, true)?;

    assert_eq!(handle.validation_records.len(), 4);
    assert!(handle.certificate.is_issued());
    for option in &handle.certificate.validation_options {
        let record = fx
            .zone
            .lookup(&option.resource_record_name, option.resource_record_type)
            .ok_or_else(|| anyhow!("no record for {}", option.domain))?;
        assert!(record.has_value(&option.resource_record_value));
    }

    let proofs = &handle
        .validation
        .as_ref()
        .ok_or_else(|| anyhow!("validated handle has no validation"))?
        .validation_record_fqdns;
    assert!(handle.certificate.unproven_domains(proofs).is_empty());
    Ok(())
}

#[test]
fn apex_and_wildcard_share_a_record() -> Result<()> {
    let fx = fixture();
    let handle = fx
        .provisioner
        .provision("example.com", &alts(&["*.example.com"]), ZONE_ID, true)?;

    assert_eq!(handle.certificate.validation_options.len(), 2);
    assert_eq!(handle.validation_records.len(), 1);
    assert!(handle.certificate.is_issued());
    Ok(())
}

#[test]
fn repeated_provisioning_reuses_certificate_and_records() -> Result<()> {
    let fx = fixture();
    let first = fx
        .provisioner
        .provision("example.com", &alts(&["www.example.com"]), ZONE_ID, true)?;
    let second = fx
        .provisioner
        .provision("www.example.com", &alts(&["example.com"]), ZONE_ID, true)?;

    assert_eq!(first.certificate_id(), second.certificate_id());
    assert_eq!(fx.authority.certificate_count(), 1);
    assert_eq!(fx.zone.records().len(), 2);
    assert!(second.certificate.is_issued());
    Ok(())
}

#[test]
fn missing_proof_times_out_without_issuing() -> Result<()> {
    let fx = lossy_fixture(1);
    let err = fx
        .provisioner
        .provision("example.com", &alts(&["www.example.com"]), ZONE_ID, true)
        .err()
        .ok_or_else(|| anyhow!("validation should not succeed"))?;

    let (certificate_id, reason) = match err {
        ProvisionError::ValidationTimeout {
            certificate_id,
            reason,
        } => (certificate_id, reason),
        other => return Err(anyhow!("expected ValidationTimeout, got {other:?}")),
    };
    assert!(reason.contains("www.example.com"), "{reason}");
    let certificate = fx
        .authority
        .certificate(&certificate_id)
        .ok_or_else(|| anyhow!("certificate {certificate_id} vanished"))?;
    assert_ne!(certificate.status, CertificateStatus::Issued);
    assert_eq!(fx.zone.records().len(), 1);
    Ok(())
}

#[test]
fn conflicting_record_aborts_before_validation() -> Result<()> {
    let fx = fixture();
    fx.zone.seed(DnsRecord::from_spec(&DnsRecordSpec {
        zone_id: ZONE_ID.to_string(),
        name: "_acme.example.com.".to_string(),
        record_type: RecordType::Cname,
        values: vec!["_stale.validations.invalid.".to_string()],
        ttl: 300,
    }));

    let err = fx
        .provisioner
        .provision("example.com", &[], ZONE_ID, true)
        .err()
        .ok_or_else(|| anyhow!("conflicting record should fail"))?;
    assert!(
        matches!(err, ProvisionError::RecordConflict { ref name, .. } if fqdn(name) == "_acme.example.com"),
        "{err:?}"
    );

    // An identical request returns the same, still pending, certificate.
    let certificate = fx
        .authority
        .request_certificate(&CertificateRequest::dns("example.com", vec![]))?;
    assert_eq!(fx.authority.certificate_count(), 1);
    assert_eq!(certificate.status, CertificateStatus::PendingValidation);
    Ok(())
}

#[test]
fn unknown_zone_is_reported_as_record_failure() {
    let fx = fixture();
    let err = fx
        .provisioner
        .provision("example.com", &[], "ZNOSUCHZONE", true)
        .unwrap_err();
    assert!(matches!(err, ProvisionError::RecordConflict { .. }), "{err:?}");
}

#[test]
fn late_validation_options_are_polled() -> Result<()> {
    let fx = fixture_with(|authority| authority.with_delayed_options(3));
    let handle = fx
        .provisioner
        .provision("example.com", &alts(&["www.example.com"]), ZONE_ID, true)?;

    assert!(handle.certificate.is_issued());
    assert_eq!(handle.validation_records.len(), 2);
    Ok(())
}

#[test]
fn options_that_never_appear_reject_the_request() {
    let fx = fixture_with(|authority| authority.with_delayed_options(u32::MAX));
    let err = fx
        .provisioner
        .provision("example.com", &[], ZONE_ID, true)
        .unwrap_err();
    assert!(
        matches!(err, ProvisionError::RequestRejected { ref domain, .. } if domain == "example.com"),
        "{err:?}"
    );
    assert!(fx.zone.records().is_empty());
}

#[test]
fn rejected_request_creates_nothing() {
    let fx = fixture_with(|authority: InMemoryAuthority| authority.rejecting("www.example.com"));
    let err = fx
        .provisioner
        .provision("example.com", &alts(&["www.example.com"]), ZONE_ID, true)
        .unwrap_err();

    assert!(matches!(err, ProvisionError::RequestRejected { .. }), "{err:?}");
    assert_eq!(fx.authority.certificate_count(), 0);
    assert!(fx.zone.records().is_empty());
}

#[test]
fn invalid_inputs_are_rejected_up_front() {
    let fx = fixture();
    for (domain, zone) in [("", ZONE_ID), ("example.com", " "), ("not a domain", ZONE_ID)] {
        let err = fx.provisioner.provision(domain, &[], zone, true).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidRequest(_)), "{err:?}");
    }
    assert_eq!(fx.authority.certificate_count(), 0);
}
