pub mod authority;
pub mod dns;
pub mod providers;
pub mod provisioner;
pub mod retry;
pub mod types;
pub mod zone;

pub use authority::{AuthorityError, CertificateAuthority};
pub use provisioner::{CertificateProvisioner, ProvisionError, validation_record_specs};
pub use types::{
    Certificate, CertificateHandle, CertificateRequest, CertificateStatus, CertificateValidation,
    DnsRecord, DnsRecordSpec, RecordType, ValidationMethod, ValidationOption,
};
pub use zone::{DnsZoneError, DnsZoneService};
