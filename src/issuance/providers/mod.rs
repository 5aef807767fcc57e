//! Collaborator implementations: AWS-backed and in-process.

pub mod acm;
pub mod memory;
pub mod route53;

pub use acm::AcmAuthority;
pub use memory::{InMemoryAuthority, InMemoryZone};
pub use route53::Route53Zone;
