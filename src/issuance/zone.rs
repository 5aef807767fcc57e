use thiserror::Error;

use super::types::{DnsRecord, DnsRecordSpec};

/// Authoritative DNS zone that can host validation records.
pub trait DnsZoneService: Send + Sync {
    /// Creates a record. Re-creating an identical record returns the existing one;
    /// a different record at the same name is a conflict.
    fn create_record(&self, spec: &DnsRecordSpec) -> Result<DnsRecord, DnsZoneError>;
}

#[derive(Error, Debug)]
pub enum DnsZoneError {
    #[error("dns zone not found: {0}")]
    ZoneNotFound(String),
    #[error("record {name} conflicts with existing zone data: {reason}")]
    Conflict { name: String, reason: String },
    #[error("dns zone service unavailable: {0}")]
    Unavailable(String),
}
