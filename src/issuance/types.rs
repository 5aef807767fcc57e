use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::fqdn;

/// Longest idempotency token accepted by the certificate authority.
const IDEMPOTENCY_TOKEN_LEN: usize = 32;

/// How the certificate authority verifies domain ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationMethod {
    Dns,
    Email,
}

/// Lifecycle of a certificate as reported by the authority.
///
/// `PendingValidation` is always the initial state. `Issued` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    PendingValidation,
    Issued,
    Failed,
}

impl CertificateStatus {
    pub fn can_transition_to(self, next: CertificateStatus) -> bool {
        match self {
            CertificateStatus::PendingValidation => true,
            CertificateStatus::Issued => next == CertificateStatus::Issued,
            CertificateStatus::Failed => next == CertificateStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    Cname,
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
        }
    }

    pub fn parse(raw: &str) -> Option<RecordType> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CNAME" => Some(RecordType::Cname),
            "TXT" => Some(RecordType::Txt),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request for one certificate covering a primary domain plus alternates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub primary_domain: String,
    pub alternate_domains: Vec<String>,
    pub validation_method: ValidationMethod,
}

impl CertificateRequest {
    pub fn dns(primary_domain: impl Into<String>, alternate_domains: Vec<String>) -> Self {
        Self {
            primary_domain: primary_domain.into(),
            alternate_domains,
            validation_method: ValidationMethod::Dns,
        }
    }

    /// Primary domain followed by the alternates, in request order.
    pub fn domains(&self) -> Vec<&str> {
        std::iter::once(self.primary_domain.as_str())
            .chain(self.alternate_domains.iter().map(String::as_str))
            .collect()
    }

    /// Token that is stable for the same domain set regardless of order or duplicates.
    pub fn idempotency_token(&self) -> String {
        let domain_set: BTreeSet<String> = self
            .domains()
            .into_iter()
            .map(|domain| domain.trim_end_matches('.').to_lowercase())
            .collect();
        let mut hasher = Sha256::new();
        for domain in &domain_set {
            hasher.update(domain.as_bytes());
            hasher.update(b",");
        }
        let mut token = hex::encode(hasher.finalize());
        token.truncate(IDEMPOTENCY_TOKEN_LEN);
        token
    }
}

/// A DNS record the authority wants to see before it will issue for `domain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOption {
    pub domain: String,
    pub resource_record_name: String,
    pub resource_record_value: String,
    pub resource_record_type: RecordType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Opaque identifier (an ARN for ACM).
    pub id: String,
    pub domain_name: String,
    pub subject_alternative_names: Vec<String>,
    pub validation_options: Vec<ValidationOption>,
    pub status: CertificateStatus,
    pub requested_at: DateTime<Utc>,
}

impl Certificate {
    pub fn is_issued(&self) -> bool {
        self.status == CertificateStatus::Issued
    }

    /// True once the authority has published a validation option for every domain.
    pub fn has_options_for(&self, domains: &[&str]) -> bool {
        domains.iter().all(|domain| {
            let wanted = domain.trim_end_matches('.').to_lowercase();
            self.validation_options
                .iter()
                .any(|option| option.domain.trim_end_matches('.').to_lowercase() == wanted)
        })
    }

    /// Domains whose validation record is not among `proof_fqdns`.
    pub fn unproven_domains(&self, proof_fqdns: &[String]) -> Vec<String> {
        let proofs: BTreeSet<String> = proof_fqdns.iter().map(|name| fqdn(name)).collect();
        self.validation_options
            .iter()
            .filter(|option| !proofs.contains(&fqdn(&option.resource_record_name)))
            .map(|option| option.domain.clone())
            .collect()
    }
}

/// Desired state of a DNS record, before the zone service has created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSpec {
    pub zone_id: String,
    pub name: String,
    pub record_type: RecordType,
    pub values: Vec<String>,
    pub ttl: u32,
}

impl DnsRecordSpec {
    pub fn for_validation(zone_id: &str, option: &ValidationOption, ttl: u32) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            name: option.resource_record_name.clone(),
            record_type: option.resource_record_type,
            values: vec![option.resource_record_value.clone()],
            ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub zone_id: String,
    pub name: String,
    pub record_type: RecordType,
    pub values: Vec<String>,
    pub ttl: u32,
    pub fqdn: String,
}

impl DnsRecord {
    pub fn from_spec(spec: &DnsRecordSpec) -> Self {
        Self {
            zone_id: spec.zone_id.clone(),
            name: spec.name.clone(),
            record_type: spec.record_type,
            values: spec.values.clone(),
            ttl: spec.ttl,
            fqdn: fqdn(&spec.name),
        }
    }

    pub fn has_value(&self, value: &str) -> bool {
        let wanted = normalize_record_value(value);
        self.values
            .iter()
            .any(|candidate| normalize_record_value(candidate) == wanted)
    }
}

/// Links a certificate to the records that prove ownership of its domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateValidation {
    pub certificate_id: String,
    pub validation_record_fqdns: Vec<String>,
}

/// Result of provisioning: the certificate plus whatever was created to validate it.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateHandle {
    pub certificate: Certificate,
    pub validation_records: Vec<DnsRecord>,
    pub validation: Option<CertificateValidation>,
}

impl CertificateHandle {
    pub fn pending(certificate: Certificate) -> Self {
        Self {
            certificate,
            validation_records: Vec::new(),
            validation: None,
        }
    }

    pub fn certificate_id(&self) -> &str {
        &self.certificate.id
    }
}

/// Canonical form for comparing record values across providers
/// (quotes, trailing dots and case differ between APIs and resolvers).
pub fn normalize_record_value(value: &str) -> String {
    value
        .trim()
        .trim_matches('"')
        .trim()
        .trim_end_matches('.')
        .to_lowercase()
}
