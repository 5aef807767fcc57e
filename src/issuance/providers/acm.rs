use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_acm::Client;
use aws_sdk_acm::error::DisplayErrorContext;
use aws_sdk_acm::types::{self as acm, CertificateDetail};
use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::runtime::Runtime;

use crate::config::ProvisionerSettings;
use crate::issuance::authority::{AuthorityError, CertificateAuthority};
use crate::issuance::retry::{Polled, poll_until};
use crate::issuance::types::{
    Certificate, CertificateRequest, CertificateStatus, RecordType, ValidationMethod,
    ValidationOption,
};

/// CloudFront only accepts certificates issued in this region.
const ACM_REGION: &str = "us-east-1";

/// AWS Certificate Manager, using the default AWS credential chain.
pub struct AcmAuthority {
    runtime: Runtime,
    client: Client,
    settings: ProvisionerSettings,
}

impl AcmAuthority {
    pub fn connect(settings: &ProvisionerSettings) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(ACM_REGION))
                .load(),
        );
        Ok(Self {
            runtime,
            client: Client::new(&config),
            settings: settings.clone(),
        })
    }

    async fn request(&self, request: &CertificateRequest) -> Result<String, AuthorityError> {
        let alternates = (!request.alternate_domains.is_empty())
            .then(|| request.alternate_domains.clone());
        let method = match request.validation_method {
            ValidationMethod::Dns => acm::ValidationMethod::Dns,
            ValidationMethod::Email => acm::ValidationMethod::Email,
        };

        let response = self
            .client
            .request_certificate()
            .domain_name(&request.primary_domain)
            .set_subject_alternative_names(alternates)
            .validation_method(method)
            .idempotency_token(request.idempotency_token())
            .send()
            .await
            .map_err(|err| {
                let invalid = err
                    .as_service_error()
                    .map(|e| {
                        e.is_invalid_domain_validation_options_exception()
                            || e.is_invalid_parameter_exception()
                            || e.is_limit_exceeded_exception()
                    })
                    .unwrap_or(false);
                let message = DisplayErrorContext(&err).to_string();
                if invalid {
                    AuthorityError::Rejected(message)
                } else {
                    AuthorityError::Unavailable(message)
                }
            })?;

        response
            .certificate_arn()
            .map(str::to_string)
            .ok_or_else(|| AuthorityError::Rejected("ACM returned no certificate ARN".to_string()))
    }

    async fn describe(&self, certificate_arn: &str) -> Result<CertificateDetail, AuthorityError> {
        let response = self
            .client
            .describe_certificate()
            .certificate_arn(certificate_arn)
            .send()
            .await
            .map_err(|err| {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if missing {
                    AuthorityError::NotFound(certificate_arn.to_string())
                } else {
                    AuthorityError::Unavailable(DisplayErrorContext(&err).to_string())
                }
            })?;

        response.certificate().cloned().ok_or_else(|| {
            AuthorityError::NotFound(format!("{certificate_arn} has no certificate detail"))
        })
    }
}

impl CertificateAuthority for AcmAuthority {
    fn request_certificate(
        &self,
        request: &CertificateRequest,
    ) -> Result<Certificate, AuthorityError> {
        let arn = self.runtime.block_on(self.request(request))?;
        info!("[acm] requested {arn} for {}", request.primary_domain);
        self.describe_certificate(&arn)
    }

    fn describe_certificate(&self, certificate_id: &str) -> Result<Certificate, AuthorityError> {
        let detail = self.runtime.block_on(self.describe(certificate_id))?;
        Ok(certificate_from_detail(certificate_id, &detail))
    }

    fn await_validation(
        &self,
        certificate_id: &str,
        proof_fqdns: &[String],
    ) -> Result<Certificate, AuthorityError> {
        let current = self.describe_certificate(certificate_id)?;
        let unproven = current.unproven_domains(proof_fqdns);
        if !unproven.is_empty() {
            return Err(AuthorityError::Rejected(format!(
                "no validation record supplied for {}",
                unproven.join(", ")
            )));
        }

        let polled = poll_until(
            "certificate validation",
            certificate_id,
            self.settings.validation_timeout,
            self.settings.validation_interval,
            || {
                let detail = self.runtime.block_on(self.describe(certificate_id))?;
                debug!("[acm] {certificate_id} is {:?}", detail.status());
                validation_outcome(certificate_id, &detail)
            },
        )?;

        match polled {
            Polled::Ready(certificate) => Ok(certificate),
            Polled::TimedOut { elapsed, attempts } => Err(AuthorityError::Timeout {
                certificate_id: certificate_id.to_string(),
                reason: format!(
                    "still pending after {}s ({attempts} checks)",
                    elapsed.as_secs()
                ),
            }),
        }
    }
}

fn certificate_from_detail(certificate_arn: &str, detail: &CertificateDetail) -> Certificate {
    let validation_options = detail
        .domain_validation_options()
        .iter()
        .filter_map(|validation| {
            let record = validation.resource_record()?;
            let record_type = RecordType::parse(record.r#type().as_str())?;
            Some(ValidationOption {
                domain: validation.domain_name().to_string(),
                resource_record_name: record.name().to_string(),
                resource_record_value: record.value().to_string(),
                resource_record_type: record_type,
            })
        })
        .collect();

    let requested_at = detail
        .created_at()
        .and_then(|created| DateTime::from_timestamp(created.secs(), created.subsec_nanos()))
        .unwrap_or_else(Utc::now);

    Certificate {
        id: detail
            .certificate_arn()
            .unwrap_or(certificate_arn)
            .to_string(),
        domain_name: detail.domain_name().unwrap_or_default().to_string(),
        subject_alternative_names: detail.subject_alternative_names().to_vec(),
        validation_options,
        status: status_from_acm(detail.status()),
        requested_at,
    }
}

/// Issued yields the certificate, pending yields nothing, and a terminal ACM
/// status becomes the matching authority error.
fn validation_outcome(
    certificate_arn: &str,
    detail: &CertificateDetail,
) -> Result<Option<Certificate>, AuthorityError> {
    let certificate_id = certificate_arn.to_string();
    match detail.status() {
        Some(acm::CertificateStatus::ValidationTimedOut) => Err(AuthorityError::Timeout {
            certificate_id,
            reason: "ACM validation window elapsed before the DNS proof was observed".to_string(),
        }),
        _ => {
            let certificate = certificate_from_detail(certificate_arn, detail);
            match certificate.status {
                CertificateStatus::Issued => Ok(Some(certificate)),
                CertificateStatus::PendingValidation => Ok(None),
                CertificateStatus::Failed => Err(AuthorityError::Failed {
                    certificate_id,
                    reason: detail
                        .failure_reason()
                        .map(|reason| reason.as_str().to_string())
                        .or_else(|| detail.status().map(|status| status.as_str().to_string()))
                        .unwrap_or_else(|| "certificate failed validation".to_string()),
                }),
            }
        }
    }
}

fn status_from_acm(status: Option<&acm::CertificateStatus>) -> CertificateStatus {
    match status {
        Some(acm::CertificateStatus::Issued) => CertificateStatus::Issued,
        Some(
            acm::CertificateStatus::Failed
            | acm::CertificateStatus::ValidationTimedOut
            | acm::CertificateStatus::Revoked
            | acm::CertificateStatus::Expired
            | acm::CertificateStatus::Inactive,
        ) => CertificateStatus::Failed,
        _ => CertificateStatus::PendingValidation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_acm::types::{DomainValidation, ResourceRecord};

    fn detail_with_status(status: acm::CertificateStatus) -> CertificateDetail {
        CertificateDetail::builder()
            .certificate_arn("arn:aws:acm:us-east-1:123:certificate/abc")
            .domain_name("example.com")
            .status(status)
            .build()
    }

    fn detail() -> CertificateDetail {
        let record = ResourceRecord::builder()
            .name("_abc.example.com.")
            .r#type(acm::RecordType::Cname)
            .value("_def.acm-validations.aws.")
            .build()
            .unwrap();
        CertificateDetail::builder()
            .certificate_arn("arn:aws:acm:us-east-1:123:certificate/abc")
            .domain_name("example.com")
            .subject_alternative_names("example.com")
            .subject_alternative_names("www.example.com")
            .domain_validation_options(
                DomainValidation::builder()
                    .domain_name("example.com")
                    .resource_record(record)
                    .build()
                    .unwrap(),
            )
            .domain_validation_options(
                DomainValidation::builder()
                    .domain_name("www.example.com")
                    .build()
                    .unwrap(),
            )
            .status(acm::CertificateStatus::PendingValidation)
            .build()
    }

    #[test]
    fn detail_maps_populated_options_only() {
        let cert = certificate_from_detail("fallback", &detail());
        assert_eq!(cert.id, "arn:aws:acm:us-east-1:123:certificate/abc");
        assert_eq!(cert.subject_alternative_names.len(), 2);
        assert_eq!(cert.validation_options.len(), 1);
        assert_eq!(cert.validation_options[0].resource_record_type, RecordType::Cname);
        assert!(!cert.has_options_for(&["example.com", "www.example.com"]));
        assert_eq!(cert.status, CertificateStatus::PendingValidation);
    }

    #[test]
    fn acm_statuses_collapse_to_three_states() {
        assert_eq!(
            status_from_acm(Some(&acm::CertificateStatus::Issued)),
            CertificateStatus::Issued
        );
        assert_eq!(
            status_from_acm(Some(&acm::CertificateStatus::ValidationTimedOut)),
            CertificateStatus::Failed
        );
        assert_eq!(status_from_acm(None), CertificateStatus::PendingValidation);
    }

    #[test]
    fn acm_validation_timeout_is_a_timeout() {
        let arn = "arn:aws:acm:us-east-1:123:certificate/abc";
        let err = validation_outcome(
            arn,
            &detail_with_status(acm::CertificateStatus::ValidationTimedOut),
        )
        .unwrap_err();
        assert!(
            matches!(&err, AuthorityError::Timeout { certificate_id, .. } if certificate_id == arn),
            "{err:?}"
        );
    }

    #[test]
    fn failed_certificate_carries_acm_reason() {
        let failed = CertificateDetail::builder()
            .certificate_arn("arn:aws:acm:us-east-1:123:certificate/abc")
            .status(acm::CertificateStatus::Failed)
            .failure_reason(acm::FailureReason::CaaError)
            .build();
        let err = validation_outcome("arn", &failed).unwrap_err();
        assert!(
            matches!(&err, AuthorityError::Failed { reason, .. } if reason == "CAA_ERROR"),
            "{err:?}"
        );

        let revoked = detail_with_status(acm::CertificateStatus::Revoked);
        let err = validation_outcome("arn", &revoked).unwrap_err();
        assert!(
            matches!(&err, AuthorityError::Failed { reason, .. } if reason == "REVOKED"),
            "{err:?}"
        );
    }

    #[test]
    fn issued_and_pending_certificates_keep_polling_state() {
        let issued = validation_outcome(
            "arn",
            &detail_with_status(acm::CertificateStatus::Issued),
        )
        .unwrap();
        assert_eq!(issued.map(|cert| cert.status), Some(CertificateStatus::Issued));

        let pending = validation_outcome(
            "arn",
            &detail_with_status(acm::CertificateStatus::PendingValidation),
        )
        .unwrap();
        assert!(pending.is_none());
    }
}
