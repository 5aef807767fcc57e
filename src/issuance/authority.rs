use thiserror::Error;

use super::types::{Certificate, CertificateRequest};

/// Operations any certificate authority must support for DNS-validated issuance.
pub trait CertificateAuthority: Send + Sync {
    /// Requests a certificate. Repeating an identical request may return the
    /// existing certificate instead of creating a new one.
    fn request_certificate(
        &self,
        request: &CertificateRequest,
    ) -> Result<Certificate, AuthorityError>;

    /// Reads the current state of a certificate, including validation options
    /// that were not yet assigned when it was requested.
    fn describe_certificate(&self, certificate_id: &str) -> Result<Certificate, AuthorityError>;

    /// Blocks until the authority has observed the proof records and issued the
    /// certificate, or fails once its validation window is exhausted.
    fn await_validation(
        &self,
        certificate_id: &str,
        proof_fqdns: &[String],
    ) -> Result<Certificate, AuthorityError>;
}

#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("certificate authority unavailable: {0}")]
    Unavailable(String),
    #[error("certificate request rejected: {0}")]
    Rejected(String),
    #[error("certificate not found: {0}")]
    NotFound(String),
    #[error("validation of {certificate_id} timed out: {reason}")]
    Timeout {
        certificate_id: String,
        reason: String,
    },
    #[error("certificate {certificate_id} failed validation: {reason}")]
    Failed {
        certificate_id: String,
        reason: String,
    },
}
