//! Declarations for the static website stack.
//!
//! Nothing here talks to AWS. A [`SitePlan`] describes every resource, its
//! settings and apply order so it can be reviewed or handed to a deployer.

pub mod distribution;
pub mod graph;
pub mod policy;

use serde::Serialize;

use crate::config::SiteConfig;

pub use distribution::DistributionConfig;
pub use graph::{GraphError, ResourceGraph, ResourceKind, ResourceNode, site_graph};
pub use policy::PolicyDocument;

pub const ORIGIN_ACCESS_COMMENT: &str = "cdn s3 permissions";
pub const FOLDER_ACL: &str = "private";

/// Attributes that only exist once resources are created. Plans use
/// placeholder references until real values are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteOutputs {
    pub bucket_name: String,
    pub bucket_arn: String,
    pub bucket_domain_name: String,
    pub origin_access_identity_iam_arn: String,
    pub origin_access_identity_path: String,
    pub certificate_arn: String,
    pub distribution_domain_name: String,
}

impl SiteOutputs {
    pub fn placeholders() -> Self {
        Self {
            bucket_name: "${bucket.bucket}".to_string(),
            bucket_arn: "${bucket.arn}".to_string(),
            bucket_domain_name: "${bucket.bucketRegionalDomainName}".to_string(),
            origin_access_identity_iam_arn: "${oai.iamArn}".to_string(),
            origin_access_identity_path: "${oai.cloudfrontAccessIdentityPath}".to_string(),
            certificate_arn: "${certificate.arn}".to_string(),
            distribution_domain_name: "${distribution.domainName}".to_string(),
        }
    }

    pub fn with_certificate_arn(mut self, arn: impl Into<String>) -> Self {
        self.certificate_arn = arn.into();
        self
    }

    pub fn cdn_url(&self) -> String {
        format!("https://{}", self.distribution_domain_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginAccessIdentity {
    pub comment: String,
}

/// Mirrors a local directory into the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedFolder {
    pub path: String,
    pub bucket_name: String,
    pub acl: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutputs {
    pub bucket_name: String,
    pub cdn_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitePlan {
    pub bucket: String,
    pub origin_access_identity: OriginAccessIdentity,
    pub bucket_policy: PolicyDocument,
    pub bucket_folder: SyncedFolder,
    pub distribution: DistributionConfig,
    pub resources: ResourceGraph,
    pub apply_waves: Vec<Vec<String>>,
    pub outputs: StackOutputs,
}

impl SitePlan {
    pub fn build(config: &SiteConfig, outputs: &SiteOutputs) -> Result<Self, GraphError> {
        let resources = site_graph(config)?;
        let apply_waves = resources.apply_waves();
        log::debug!(
            "[plan] {} resources in {} waves for {}",
            resources.len(),
            apply_waves.len(),
            config.domain_name
        );

        Ok(Self {
            bucket: config.primary_domain(),
            origin_access_identity: OriginAccessIdentity {
                comment: ORIGIN_ACCESS_COMMENT.to_string(),
            },
            bucket_policy: PolicyDocument::origin_read_access(
                &outputs.bucket_arn,
                &outputs.origin_access_identity_iam_arn,
            ),
            bucket_folder: SyncedFolder {
                path: config.dir_path.display().to_string(),
                bucket_name: outputs.bucket_name.clone(),
                acl: FOLDER_ACL.to_string(),
            },
            distribution: DistributionConfig::for_site(config, outputs),
            resources,
            apply_waves,
            outputs: StackOutputs {
                bucket_name: outputs.bucket_name.clone(),
                cdn_url: outputs.cdn_url(),
            },
        })
    }
}
