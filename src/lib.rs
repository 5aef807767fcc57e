pub mod config;
pub mod domain;
pub mod issuance;
pub mod site;

pub use config::{ConfigError, ProvisionerSettings, SiteConfig};
pub use issuance::{CertificateHandle, CertificateProvisioner, ProvisionError};
