use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::ProvisionerSettings;
use crate::domain::{fqdn, normalize_domain};

use super::authority::{AuthorityError, CertificateAuthority};
use super::retry::{Polled, poll_until};
use super::types::{
    Certificate, CertificateHandle, CertificateRequest, CertificateValidation, DnsRecord,
    DnsRecordSpec, normalize_record_value,
};
use super::zone::DnsZoneService;

/// Failures of a provisioning run. Every variant is terminal; nothing is retried here.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("invalid certificate request: {0}")]
    InvalidRequest(String),
    #[error("certificate request rejected for {domain}: {reason}")]
    RequestRejected { domain: String, reason: String },
    #[error("validation record {name} could not be created: {reason}")]
    RecordConflict { name: String, reason: String },
    #[error("certificate {certificate_id} was not validated in time: {reason}")]
    ValidationTimeout {
        certificate_id: String,
        reason: String,
    },
    #[error("certificate {certificate_id} was rejected during validation: {reason}")]
    ValidationRejected {
        certificate_id: String,
        reason: String,
    },
}

/// Requests a DNS-validated certificate and, on demand, proves ownership of
/// every covered domain through the given zone.
///
/// Each step consumes the previous step's output: validation records are built
/// from the certificate's validation options, and the validation references the
/// FQDNs of the records that were actually created.
pub struct CertificateProvisioner {
    authority: Arc<dyn CertificateAuthority>,
    zones: Arc<dyn DnsZoneService>,
    settings: ProvisionerSettings,
}

impl CertificateProvisioner {
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        zones: Arc<dyn DnsZoneService>,
        settings: ProvisionerSettings,
    ) -> Self {
        Self {
            authority,
            zones,
            settings,
        }
    }

    /// Requests the certificate without creating any proof of ownership.
    /// The certificate stays in `PendingValidation` until validated elsewhere.
    pub fn provision_unvalidated(
        &self,
        domain_name: &str,
        alt_domain_names: &[String],
        dns_zone_id: &str,
    ) -> Result<CertificateHandle, ProvisionError> {
        self.provision(domain_name, alt_domain_names, dns_zone_id, false)
    }

    pub fn provision(
        &self,
        domain_name: &str,
        alt_domain_names: &[String],
        dns_zone_id: &str,
        validate: bool,
    ) -> Result<CertificateHandle, ProvisionError> {
        let request = build_request(domain_name, alt_domain_names)?;
        if dns_zone_id.trim().is_empty() {
            return Err(ProvisionError::InvalidRequest(
                "dns zone id is required".to_string(),
            ));
        }

        info!(
            "[provision] requesting certificate for {} ({} alternate name(s))",
            request.primary_domain,
            request.alternate_domains.len()
        );
        let certificate = self
            .authority
            .request_certificate(&request)
            .map_err(|err| rejected(&request.primary_domain, err))?;
        info!(
            "[provision] certificate {} is {:?}",
            certificate.id, certificate.status
        );

        if !validate {
            return Ok(CertificateHandle::pending(certificate));
        }

        let certificate = self.wait_for_validation_options(certificate, &request)?;
        let records = self.create_validation_records(dns_zone_id.trim(), &certificate)?;

        let validation = CertificateValidation {
            certificate_id: certificate.id.clone(),
            validation_record_fqdns: records.iter().map(|record| record.fqdn.clone()).collect(),
        };
        info!(
            "[provision] waiting for {} to validate via {} record(s)",
            validation.certificate_id,
            validation.validation_record_fqdns.len()
        );
        let certificate = self
            .authority
            .await_validation(
                &validation.certificate_id,
                &validation.validation_record_fqdns,
            )
            .map_err(|err| validation_failed(&validation.certificate_id, err))?;
        info!(
            "[provision] certificate {} is {:?}",
            certificate.id, certificate.status
        );

        Ok(CertificateHandle {
            certificate,
            validation_records: records,
            validation: Some(validation),
        })
    }

    /// The authority may assign validation options after the request returns.
    fn wait_for_validation_options(
        &self,
        certificate: Certificate,
        request: &CertificateRequest,
    ) -> Result<Certificate, ProvisionError> {
        let domains = request.domains();
        if certificate.has_options_for(&domains) {
            return Ok(certificate);
        }

        debug!(
            "[provision] {} has {} validation option(s) for {} domain(s), polling",
            certificate.id,
            certificate.validation_options.len(),
            domains.len()
        );
        let polled = poll_until(
            "validation options",
            &certificate.id,
            self.settings.options_timeout,
            self.settings.options_interval,
            || {
                let current = self.authority.describe_certificate(&certificate.id)?;
                Ok::<_, AuthorityError>(current.has_options_for(&domains).then_some(current))
            },
        )
        .map_err(|err| rejected(&request.primary_domain, err))?;

        match polled {
            Polled::Ready(current) => Ok(current),
            Polled::TimedOut { elapsed, .. } => Err(ProvisionError::RequestRejected {
                domain: request.primary_domain.clone(),
                reason: format!(
                    "validation options for {} were not populated after {}s",
                    certificate.id,
                    elapsed.as_secs()
                ),
            }),
        }
    }

    /// Creates one record per distinct validation option. Options that share a
    /// record (a domain and its wildcard) produce a single record.
    fn create_validation_records(
        &self,
        dns_zone_id: &str,
        certificate: &Certificate,
    ) -> Result<Vec<DnsRecord>, ProvisionError> {
        let specs = validation_record_specs(dns_zone_id, certificate, self.settings.record_ttl);
        let mut records = Vec::with_capacity(specs.len());
        for spec in specs {
            info!(
                "[provision] creating {} record {} in zone {}",
                spec.record_type, spec.name, spec.zone_id
            );
            let record =
                self.zones
                    .create_record(&spec)
                    .map_err(|err| ProvisionError::RecordConflict {
                        name: spec.name.clone(),
                        reason: err.to_string(),
                    })?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Builds the record specs that prove ownership of every domain on `certificate`.
pub fn validation_record_specs(
    dns_zone_id: &str,
    certificate: &Certificate,
    ttl: u32,
) -> Vec<DnsRecordSpec> {
    let mut seen = HashSet::new();
    certificate
        .validation_options
        .iter()
        .filter(|option| {
            seen.insert((
                fqdn(&option.resource_record_name),
                option.resource_record_type,
                normalize_record_value(&option.resource_record_value),
            ))
        })
        .map(|option| DnsRecordSpec::for_validation(dns_zone_id, option, ttl))
        .collect()
}

fn build_request(
    domain_name: &str,
    alt_domain_names: &[String],
) -> Result<CertificateRequest, ProvisionError> {
    let primary = normalize_domain(domain_name)
        .map_err(|err| ProvisionError::InvalidRequest(err.to_string()))?;

    let mut alternates = Vec::with_capacity(alt_domain_names.len());
    for raw in alt_domain_names {
        if raw.trim().is_empty() {
            continue;
        }
        let alternate =
            normalize_domain(raw).map_err(|err| ProvisionError::InvalidRequest(err.to_string()))?;
        if alternate == primary || alternates.contains(&alternate) {
            warn!("[provision] {alternate} is listed more than once in the certificate request");
        }
        alternates.push(alternate);
    }

    Ok(CertificateRequest::dns(primary, alternates))
}

fn rejected(domain: &str, err: AuthorityError) -> ProvisionError {
    ProvisionError::RequestRejected {
        domain: domain.to_string(),
        reason: err.to_string(),
    }
}

fn validation_failed(certificate_id: &str, err: AuthorityError) -> ProvisionError {
    let certificate_id = certificate_id.to_string();
    match err {
        AuthorityError::Timeout { reason, .. } => ProvisionError::ValidationTimeout {
            certificate_id,
            reason,
        },
        AuthorityError::Failed { reason, .. } => ProvisionError::ValidationRejected {
            certificate_id,
            reason,
        },
        other => ProvisionError::ValidationRejected {
            certificate_id,
            reason: other.to_string(),
        },
    }
}
