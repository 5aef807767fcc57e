//! CDN distribution settings for serving the bucket over HTTPS.

use serde::Serialize;

use crate::config::SiteConfig;

use super::SiteOutputs;

pub const CACHE_TTL_SECS: u64 = 600;
pub const PRICE_CLASS: &str = "PriceClass_100";

const CACHED_METHODS: [&str; 3] = ["GET", "HEAD", "OPTIONS"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionConfig {
    pub enabled: bool,
    pub aliases: Vec<String>,
    pub origins: Vec<Origin>,
    pub default_cache_behavior: CacheBehavior,
    pub price_class: String,
    pub default_root_object: String,
    pub custom_error_responses: Vec<CustomErrorResponse>,
    pub restrictions: Restrictions,
    pub viewer_certificate: ViewerCertificate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub domain_name: String,
    pub origin_id: String,
    pub s3_origin_config: S3OriginConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3OriginConfig {
    pub origin_access_identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheBehavior {
    pub target_origin_id: String,
    pub viewer_protocol_policy: String,
    pub allowed_methods: Vec<String>,
    pub cached_methods: Vec<String>,
    pub default_ttl: u64,
    pub min_ttl: u64,
    pub max_ttl: u64,
    pub forwarded_values: ForwardedValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedValues {
    pub query_string: bool,
    pub cookies: CookieForwarding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieForwarding {
    pub forward: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomErrorResponse {
    pub error_code: u16,
    pub response_code: u16,
    pub response_page_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Restrictions {
    pub geo_restriction: GeoRestriction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoRestriction {
    pub restriction_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerCertificate {
    pub acm_certificate_arn: String,
    pub ssl_support_method: String,
}

impl DistributionConfig {
    pub fn for_site(config: &SiteConfig, outputs: &SiteOutputs) -> Self {
        let methods: Vec<String> = CACHED_METHODS.iter().map(|m| m.to_string()).collect();
        Self {
            enabled: true,
            aliases: config.aliases(),
            origins: vec![Origin {
                domain_name: outputs.bucket_domain_name.clone(),
                origin_id: outputs.bucket_arn.clone(),
                s3_origin_config: S3OriginConfig {
                    origin_access_identity: outputs.origin_access_identity_path.clone(),
                },
            }],
            default_cache_behavior: CacheBehavior {
                target_origin_id: outputs.bucket_arn.clone(),
                viewer_protocol_policy: "redirect-to-https".to_string(),
                allowed_methods: methods.clone(),
                cached_methods: methods,
                default_ttl: CACHE_TTL_SECS,
                min_ttl: CACHE_TTL_SECS,
                max_ttl: CACHE_TTL_SECS,
                forwarded_values: ForwardedValues {
                    query_string: true,
                    cookies: CookieForwarding {
                        forward: "all".to_string(),
                    },
                },
            },
            price_class: PRICE_CLASS.to_string(),
            default_root_object: config.index_document.trim().to_string(),
            custom_error_responses: vec![CustomErrorResponse {
                error_code: 404,
                response_code: 404,
                response_page_path: format!("/{}", config.error_document.trim()),
            }],
            restrictions: Restrictions {
                geo_restriction: GeoRestriction {
                    restriction_type: "none".to_string(),
                },
            },
            viewer_certificate: ViewerCertificate {
                acm_certificate_arn: outputs.certificate_arn.clone(),
                ssl_support_method: "sni-only".to_string(),
            },
        }
    }
}
