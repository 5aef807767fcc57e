use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

use staticsite_lib::config::ProvisionerSettings;
use staticsite_lib::issuance::providers::{InMemoryAuthority, InMemoryZone};
use staticsite_lib::issuance::{
    CertificateProvisioner, DnsRecord, DnsRecordSpec, DnsZoneError, DnsZoneService,
};

pub const ZONE_ID: &str = "Z0123456789EXAMPLE";
pub const ZONE_NAME: &str = "example.com";

/// Settings with short polling windows so failing scenarios finish quickly.
pub fn fast_settings() -> ProvisionerSettings {
    ProvisionerSettings {
        record_ttl: 60,
        options_timeout: Duration::from_millis(500),
        options_interval: Duration::from_millis(10),
        validation_timeout: Duration::from_millis(500),
        validation_interval: Duration::from_millis(10),
    }
}

pub struct Fixture {
    pub zone: Arc<InMemoryZone>,
    pub authority: Arc<InMemoryAuthority>,
    pub provisioner: CertificateProvisioner,
}

pub fn fixture() -> Fixture {
    fixture_with(|authority| authority)
}

/// Authority observes the zone directly; `configure` tweaks its behaviour.
pub fn fixture_with(configure: impl FnOnce(InMemoryAuthority) -> InMemoryAuthority) -> Fixture {
    let zone = Arc::new(InMemoryZone::new(ZONE_ID, ZONE_NAME));
    let authority = Arc::new(configure(InMemoryAuthority::observing(zone.clone())));
    let provisioner = CertificateProvisioner::new(authority.clone(), zone.clone(), fast_settings());
    Fixture {
        zone,
        authority,
        provisioner,
    }
}

/// Forwards only the first `limit` records to the real zone and reports the
/// rest as created without storing them.
pub struct LossyZone {
    inner: Arc<InMemoryZone>,
    limit: usize,
    created: AtomicUsize,
}

impl LossyZone {
    pub fn new(inner: Arc<InMemoryZone>, limit: usize) -> Self {
        Self {
            inner,
            limit,
            created: AtomicUsize::new(0),
        }
    }
}

impl DnsZoneService for LossyZone {
    fn create_record(&self, spec: &DnsRecordSpec) -> Result<DnsRecord, DnsZoneError> {
        if self.created.fetch_add(1, Ordering::SeqCst) < self.limit {
            self.inner.create_record(spec)
        } else {
            Ok(DnsRecord::from_spec(spec))
        }
    }
}

pub fn lossy_fixture(limit: usize) -> Fixture {
    let zone = Arc::new(InMemoryZone::new(ZONE_ID, ZONE_NAME));
    let authority = Arc::new(InMemoryAuthority::observing(zone.clone()));
    let lossy = Arc::new(LossyZone::new(zone.clone(), limit));
    let provisioner = CertificateProvisioner::new(authority.clone(), lossy, fast_settings());
    Fixture {
        zone,
        authority,
        provisioner,
    }
}

pub fn alts(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Writes `contents` to a uniquely named file in the temp dir.
pub struct TempConfig {
    pub path: PathBuf,
}

impl TempConfig {
    pub fn write(contents: &str) -> Result<Self> {
        let path = std::env::temp_dir().join(format!(
            "staticsite_it_{}.json",
            Uuid::new_v4().as_simple()
        ));
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for TempConfig {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
