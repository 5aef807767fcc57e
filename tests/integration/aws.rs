//! Live tests against ACM and Route 53.
//!
//! Run with `--features integration-tests -- --ignored` and
//! `STATICSITE_LIVE_DOMAIN` / `STATICSITE_LIVE_ZONE_ID` pointing at a hosted
//! zone you control. Credentials come from the default AWS chain.
#![cfg(feature = "integration-tests")]

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use staticsite_lib::config::ProvisionerSettings;
use staticsite_lib::issuance::providers::{AcmAuthority, Route53Zone};
use staticsite_lib::issuance::{CertificateProvisioner, CertificateStatus};

struct LiveConfig {
    domain: String,
    zone_id: String,
}

fn load_live_config() -> Result<LiveConfig> {
    Ok(LiveConfig {
        domain: env::var("STATICSITE_LIVE_DOMAIN").context("STATICSITE_LIVE_DOMAIN not set")?,
        zone_id: env::var("STATICSITE_LIVE_ZONE_ID").context("STATICSITE_LIVE_ZONE_ID not set")?,
    })
}

fn live_provisioner() -> Result<CertificateProvisioner> {
    let settings = ProvisionerSettings::from_env();
    let authority = Arc::new(AcmAuthority::connect(&settings)?);
    let zone = Arc::new(Route53Zone::connect()?);
    Ok(CertificateProvisioner::new(authority, zone, settings))
}

#[test]
#[ignore]
fn acm_request_is_idempotent() -> Result<()> {
    let config = load_live_config()?;
    let provisioner = live_provisioner()?;

    let first = provisioner.provision_unvalidated(&config.domain, &[], &config.zone_id)?;
    let second = provisioner.provision_unvalidated(&config.domain, &[], &config.zone_id)?;
    assert_eq!(first.certificate_id(), second.certificate_id());
    Ok(())
}

#[test]
#[ignore]
fn acm_certificate_validates_through_route53() -> Result<()> {
    let config = load_live_config()?;
    let provisioner = live_provisioner()?;

    let handle = provisioner.provision(&config.domain, &[], &config.zone_id, true)?;
    assert_eq!(handle.certificate.status, CertificateStatus::Issued);
    assert!(!handle.validation_records.is_empty());
    Ok(())
}
