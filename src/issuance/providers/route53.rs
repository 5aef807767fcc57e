use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_route53::Client;
use aws_sdk_route53::error::DisplayErrorContext;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use log::{debug, info};
use tokio::runtime::Runtime;

use crate::domain::fqdn;
use crate::issuance::types::{DnsRecord, DnsRecordSpec, RecordType, normalize_record_value};
use crate::issuance::zone::{DnsZoneError, DnsZoneService};

/// Route 53 is a global service; the SDK still needs a signing region.
const ROUTE53_REGION: &str = "us-east-1";

/// Route 53 hosted zones, using the default AWS credential chain.
pub struct Route53Zone {
    runtime: Runtime,
    client: Client,
}

impl Route53Zone {
    pub fn connect() -> Result<Self> {
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(ROUTE53_REGION))
                .load(),
        );
        Ok(Self {
            runtime,
            client: Client::new(&config),
        })
    }

    fn format_value(record_type: RecordType, value: &str) -> String {
        let trimmed = value.trim();
        match record_type {
            RecordType::Txt if trimmed.starts_with('"') && trimmed.ends_with('"') => {
                trimmed.to_string()
            }
            RecordType::Txt => format!("\"{}\"", trimmed.trim_matches('"')),
            RecordType::Cname => trimmed.to_string(),
        }
    }

    async fn find_record(
        &self,
        hosted_zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<ResourceRecordSet>, DnsZoneError> {
        let response = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .start_record_name(name)
            .start_record_type(RrType::from(record_type.as_str()))
            .max_items(1)
            .send()
            .await
            .map_err(|err| {
                let zone_missing = err
                    .as_service_error()
                    .map(|e| e.is_no_such_hosted_zone())
                    .unwrap_or(false);
                if zone_missing {
                    DnsZoneError::ZoneNotFound(hosted_zone_id.to_string())
                } else {
                    DnsZoneError::Unavailable(DisplayErrorContext(&err).to_string())
                }
            })?;

        let wanted = fqdn(name);
        Ok(response
            .resource_record_sets()
            .iter()
            .find(|set| fqdn(set.name()) == wanted)
            .cloned())
    }

    async fn create(&self, spec: &DnsRecordSpec) -> Result<DnsRecord, DnsZoneError> {
        let hosted_zone_id = normalize_zone_id(&spec.zone_id);
        let created = DnsRecord::from_spec(spec);

        if let Some(existing) = self
            .find_record(hosted_zone_id, &spec.name, spec.record_type)
            .await?
        {
            let existing_values: Vec<String> = existing
                .resource_records()
                .iter()
                .map(|record| normalize_record_value(record.value()))
                .collect();
            let same_type = existing.r#type().as_str() == spec.record_type.as_str();
            let same_values = existing_values.len() == spec.values.len()
                && spec
                    .values
                    .iter()
                    .all(|value| existing_values.contains(&normalize_record_value(value)));
            if same_type && same_values {
                debug!("[route53] {} already holds the expected value", created.fqdn);
                return Ok(created);
            }
            return Err(DnsZoneError::Conflict {
                name: spec.name.clone(),
                reason: format!(
                    "existing {} record holds {}",
                    existing.r#type().as_str(),
                    existing_values.join(", ")
                ),
            });
        }

        let records = spec
            .values
            .iter()
            .map(|value| {
                ResourceRecord::builder()
                    .value(Self::format_value(spec.record_type, value))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DnsZoneError::Unavailable(format!("Failed to build ResourceRecord: {e}")))?;

        let record_set = ResourceRecordSet::builder()
            .name(&spec.name)
            .set_type(Some(RrType::from(spec.record_type.as_str())))
            .ttl(i64::from(spec.ttl))
            .set_resource_records(Some(records))
            .build()
            .map_err(|e| {
                DnsZoneError::Unavailable(format!("Failed to build ResourceRecordSet: {e}"))
            })?;

        let change = Change::builder()
            .action(ChangeAction::Create)
            .resource_record_set(record_set)
            .build()
            .map_err(|e| DnsZoneError::Unavailable(format!("Failed to build Change: {e}")))?;

        let change_batch = ChangeBatch::builder()
            .comment("certificate validation")
            .changes(change)
            .build()
            .map_err(|e| DnsZoneError::Unavailable(format!("Failed to build ChangeBatch: {e}")))?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .change_batch(change_batch)
            .send()
            .await
            .map_err(|err| {
                let zone_missing = err
                    .as_service_error()
                    .map(|e| e.is_no_such_hosted_zone())
                    .unwrap_or(false);
                if zone_missing {
                    DnsZoneError::ZoneNotFound(hosted_zone_id.to_string())
                } else {
                    DnsZoneError::Conflict {
                        name: spec.name.clone(),
                        reason: DisplayErrorContext(&err).to_string(),
                    }
                }
            })?;
        info!(
            "[route53] created {} {} in {}",
            spec.record_type, created.fqdn, hosted_zone_id
        );

        self.verify_record(hosted_zone_id, spec).await?;
        Ok(created)
    }

    async fn verify_record(
        &self,
        hosted_zone_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<(), DnsZoneError> {
        let record_set = self
            .find_record(hosted_zone_id, &spec.name, spec.record_type)
            .await?
            .ok_or_else(|| {
                DnsZoneError::Unavailable(format!("{} record not found: {}", spec.record_type, spec.name))
            })?;

        let matched = spec.values.iter().all(|value| {
            record_set
                .resource_records()
                .iter()
                .any(|record| normalize_record_value(record.value()) == normalize_record_value(value))
        });
        if !matched {
            return Err(DnsZoneError::Unavailable(
                "Route 53 record verification failed".to_string(),
            ));
        }
        Ok(())
    }
}

impl DnsZoneService for Route53Zone {
    fn create_record(&self, spec: &DnsRecordSpec) -> Result<DnsRecord, DnsZoneError> {
        self.runtime.block_on(self.create(spec))
    }
}

/// Accepts both `Z123` and `/hostedzone/Z123`.
fn normalize_zone_id(zone_id: &str) -> &str {
    zone_id.trim().trim_start_matches("/hostedzone/")
}
