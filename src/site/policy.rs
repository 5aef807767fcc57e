use serde::Serialize;

pub const POLICY_VERSION: &str = "2012-10-17";

/// IAM policy document, serialised in the shape S3 bucket policies expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: String,
    pub principal: PolicyPrincipal,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyPrincipal {
    #[serde(rename = "AWS")]
    pub aws: Vec<String>,
}

impl PolicyDocument {
    /// Grants the CDN origin access identity read access to every object in the bucket.
    pub fn origin_read_access(bucket_arn: &str, identity_iam_arn: &str) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: vec![PolicyStatement {
                effect: "Allow".to_string(),
                principal: PolicyPrincipal {
                    aws: vec![identity_iam_arn.to_string()],
                },
                action: vec!["s3:GetObject".to_string()],
                resource: vec![format!("{}/*", bucket_arn.trim_end_matches('/'))],
            }],
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
