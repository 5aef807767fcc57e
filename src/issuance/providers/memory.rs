//! In-process certificate authority and DNS zone.
//!
//! The authority deduplicates requests by domain set and only issues once the
//! validation record of every covered domain is both referenced by the caller
//! and present in the zone it observes.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, info};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{fqdn, matches_zone};
use crate::issuance::authority::{AuthorityError, CertificateAuthority};
use crate::issuance::types::{
    Certificate, CertificateRequest, CertificateStatus, DnsRecord, DnsRecordSpec, RecordType,
    ValidationOption,
};
use crate::issuance::zone::{DnsZoneError, DnsZoneService};

pub struct InMemoryZone {
    zone_id: String,
    zone_name: String,
    records: Mutex<Vec<DnsRecord>>,
}

impl InMemoryZone {
    pub fn new(zone_id: impl Into<String>, zone_name: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            zone_name: zone_name.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Inserts a record directly, bypassing conflict checks.
    pub fn seed(&self, record: DnsRecord) {
        self.lock().push(record);
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.lock().clone()
    }

    pub fn lookup(&self, name: &str, record_type: RecordType) -> Option<DnsRecord> {
        let wanted = fqdn(name);
        self.lock()
            .iter()
            .find(|record| record.fqdn == wanted && record.record_type == record_type)
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DnsRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DnsZoneService for InMemoryZone {
    fn create_record(&self, spec: &DnsRecordSpec) -> Result<DnsRecord, DnsZoneError> {
        if spec.zone_id != self.zone_id {
            return Err(DnsZoneError::ZoneNotFound(spec.zone_id.clone()));
        }
        if !matches_zone(&spec.name, &self.zone_name) {
            return Err(DnsZoneError::Conflict {
                name: spec.name.clone(),
                reason: format!("name is outside zone {}", self.zone_name),
            });
        }

        let candidate = DnsRecord::from_spec(spec);
        let mut records = self.lock();
        if let Some(existing) = records.iter().find(|record| record.fqdn == candidate.fqdn) {
            let identical = existing.record_type == candidate.record_type
                && candidate.values.iter().all(|value| existing.has_value(value))
                && existing.values.len() == candidate.values.len();
            if identical {
                debug!("[memory-dns] record {} already exists", candidate.fqdn);
                return Ok(existing.clone());
            }
            return Err(DnsZoneError::Conflict {
                name: spec.name.clone(),
                reason: format!("a {} record already exists at this name", existing.record_type),
            });
        }

        info!(
            "[memory-dns] created {} {} in {}",
            candidate.record_type, candidate.fqdn, self.zone_id
        );
        records.push(candidate.clone());
        Ok(candidate)
    }
}

struct StoredCertificate {
    certificate: Certificate,
    token: String,
    describes: u32,
}

pub struct InMemoryAuthority {
    observed_zone: Option<Arc<InMemoryZone>>,
    options_after_describes: u32,
    rejected_domains: Vec<String>,
    certificates: Mutex<Vec<StoredCertificate>>,
}

impl Default for InMemoryAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthority {
    /// An authority that trusts the proof FQDNs it is handed.
    pub fn new() -> Self {
        Self {
            observed_zone: None,
            options_after_describes: 0,
            rejected_domains: Vec::new(),
            certificates: Mutex::new(Vec::new()),
        }
    }

    /// An authority that also resolves each proof record in `zone` before issuing.
    pub fn observing(zone: Arc<InMemoryZone>) -> Self {
        Self {
            observed_zone: Some(zone),
            ..Self::new()
        }
    }

    /// Withholds validation options until the certificate has been described
    /// `describes` times.
    pub fn with_delayed_options(mut self, describes: u32) -> Self {
        self.options_after_describes = describes;
        self
    }

    /// Refuses to issue for `domain`.
    pub fn rejecting(mut self, domain: impl Into<String>) -> Self {
        self.rejected_domains.push(domain.into());
        self
    }

    pub fn certificate_count(&self) -> usize {
        self.lock().len()
    }

    pub fn certificate(&self, certificate_id: &str) -> Option<Certificate> {
        self.lock()
            .iter()
            .find(|stored| stored.certificate.id == certificate_id)
            .map(|stored| stored.certificate.clone())
    }

    /// The record the authority expects for `domain`.
    pub fn validation_option_for(domain: &str) -> ValidationOption {
        let base = domain.trim_start_matches("*.").trim_end_matches('.');
        let digest = hex::encode(Sha256::digest(base.as_bytes()));
        ValidationOption {
            domain: domain.to_string(),
            resource_record_name: format!("_acme.{base}."),
            resource_record_value: format!("_{}.validations.invalid.", &digest[..16]),
            resource_record_type: RecordType::Cname,
        }
    }

    /// One option per distinct domain, in first-seen order.
    fn validation_options_for<'a>(
        domains: impl IntoIterator<Item = &'a str>,
    ) -> Vec<ValidationOption> {
        let mut seen: Vec<&str> = Vec::new();
        domains
            .into_iter()
            .filter(|domain| {
                if seen.contains(domain) {
                    false
                } else {
                    seen.push(*domain);
                    true
                }
            })
            .map(Self::validation_option_for)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredCertificate>> {
        self.certificates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn observed(&self, option: &ValidationOption) -> bool {
        match &self.observed_zone {
            None => true,
            Some(zone) => zone
                .lookup(&option.resource_record_name, option.resource_record_type)
                .is_some_and(|record| record.has_value(&option.resource_record_value)),
        }
    }
}

impl CertificateAuthority for InMemoryAuthority {
    fn request_certificate(
        &self,
        request: &CertificateRequest,
    ) -> Result<Certificate, AuthorityError> {
        let domains = request.domains();
        if let Some(domain) = domains
            .iter()
            .find(|domain| self.rejected_domains.iter().any(|rejected| rejected == *domain))
        {
            return Err(AuthorityError::Rejected(format!(
                "not authorized to issue for {domain}"
            )));
        }

        let token = request.idempotency_token();
        let mut certificates = self.lock();
        if let Some(stored) = certificates.iter().find(|stored| {
            stored.token == token && stored.certificate.status != CertificateStatus::Failed
        }) {
            debug!(
                "[memory-ca] reusing {} for identical request",
                stored.certificate.id
            );
            return Ok(stored.certificate.clone());
        }

        let validation_options = if self.options_after_describes == 0 {
            Self::validation_options_for(domains.iter().copied())
        } else {
            Vec::new()
        };
        let certificate = Certificate {
            id: format!(
                "arn:aws:acm:us-east-1:000000000000:certificate/{}",
                Uuid::new_v4()
            ),
            domain_name: request.primary_domain.clone(),
            subject_alternative_names: domains.iter().map(|domain| domain.to_string()).collect(),
            validation_options,
            status: CertificateStatus::PendingValidation,
            requested_at: Utc::now(),
        };
        info!("[memory-ca] requested {}", certificate.id);
        certificates.push(StoredCertificate {
            certificate: certificate.clone(),
            token,
            describes: 0,
        });
        Ok(certificate)
    }

    fn describe_certificate(&self, certificate_id: &str) -> Result<Certificate, AuthorityError> {
        let mut certificates = self.lock();
        let stored = certificates
            .iter_mut()
            .find(|stored| stored.certificate.id == certificate_id)
            .ok_or_else(|| AuthorityError::NotFound(certificate_id.to_string()))?;

        stored.describes += 1;
        if stored.certificate.validation_options.is_empty()
            && stored.describes >= self.options_after_describes
        {
            let certificate = &stored.certificate;
            let options = Self::validation_options_for(
                std::iter::once(certificate.domain_name.as_str())
                    .chain(certificate.subject_alternative_names.iter().map(String::as_str)),
            );
            stored.certificate.validation_options = options;
        }
        Ok(stored.certificate.clone())
    }

    fn await_validation(
        &self,
        certificate_id: &str,
        proof_fqdns: &[String],
    ) -> Result<Certificate, AuthorityError> {
        let mut certificates = self.lock();
        let stored = certificates
            .iter_mut()
            .find(|stored| stored.certificate.id == certificate_id)
            .ok_or_else(|| AuthorityError::NotFound(certificate_id.to_string()))?;

        match stored.certificate.status {
            CertificateStatus::Issued => return Ok(stored.certificate.clone()),
            CertificateStatus::Failed => {
                return Err(AuthorityError::Failed {
                    certificate_id: certificate_id.to_string(),
                    reason: "certificate already failed validation".to_string(),
                });
            }
            CertificateStatus::PendingValidation => {}
        }

        let mut missing = stored.certificate.unproven_domains(proof_fqdns);
        for option in &stored.certificate.validation_options {
            if !self.observed(option) && !missing.contains(&option.domain) {
                missing.push(option.domain.clone());
            }
        }

        if missing.is_empty() {
            settle(&mut stored.certificate, CertificateStatus::Issued);
            info!("[memory-ca] issued {certificate_id}");
            return Ok(stored.certificate.clone());
        }

        settle(&mut stored.certificate, CertificateStatus::Failed);
        Err(AuthorityError::Timeout {
            certificate_id: certificate_id.to_string(),
            reason: format!("no validation record observed for {}", missing.join(", ")),
        })
    }
}

fn settle(certificate: &mut Certificate, next: CertificateStatus) {
    if certificate.status.can_transition_to(next) {
        certificate.status = next;
    } else {
        debug!(
            "[memory-ca] ignoring {:?} -> {:?} for {}",
            certificate.status, next, certificate.id
        );
    }
}
