use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::retry::{Polled, poll_until};
use super::types::{RecordType, normalize_record_value};

/// A validation record to look up on public resolvers.
#[derive(Debug, Clone)]
pub struct DnsLookup {
    pub name: String,
    pub record_type: RecordType,
    pub expected_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationState {
    Pending,
    Found,
    NxDomain,
    WrongContent,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DnsPropagationResult {
    pub state: PropagationState,
    pub reason: Option<String>,
    pub observed_values: Vec<String>,
}

fn resolver_urls(lookup: &DnsLookup) -> [(&'static str, String); 2] {
    let name = lookup.name.trim_end_matches('.');
    let record_type = lookup.record_type.as_str();
    [
        (
            "Google DNS",
            format!("https://dns.google/resolve?name={name}&type={record_type}&random_padding=x"),
        ),
        (
            "Cloudflare DNS",
            format!("https://cloudflare-dns.com/dns-query?name={name}&type={record_type}"),
        ),
    ]
}

/// Queries every resolver in parallel. Returns as soon as one of them reports
/// the expected value, otherwise every response that arrived.
fn query_resolvers(lookup: &DnsLookup, timeout: Duration) -> Result<Vec<DohResponse>> {
    info!(
        "[dns-test] Starting parallel DNS queries for {} {}",
        lookup.record_type, lookup.name
    );
    let (tx, rx) = mpsc::channel();

    for (resolver_name, url) in resolver_urls(lookup) {
        let tx = tx.clone();
        let record_name = lookup.name.clone();

        thread::spawn(move || {
            debug!("[dns-test] Querying {resolver_name} for {record_name}");
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            let result = agent
                .get(&url)
                .set("Accept", "application/dns-json")
                .call()
                .map_err(|err| anyhow!("{resolver_name} query failed: {err}"))
                .and_then(|resp| {
                    resp.into_string()
                        .map_err(|err| anyhow!("{resolver_name} body read failed: {err}"))
                })
                .and_then(|body| {
                    serde_json::from_str::<DohResponse>(&body)
                        .map_err(|err| anyhow!("{resolver_name} parse failed: {err}"))
                })
                .map(|parsed| (resolver_name, parsed));
            let _ = tx.send(result);
        });
    }

    drop(tx);

    let expected = normalize_record_value(&lookup.expected_value);
    let mut results = Vec::new();
    for received in rx {
        match received {
            Ok((resolver_name, response)) => {
                info!(
                    "[dns-test] {} responded: status={}, has_answer={}",
                    resolver_name,
                    response.status,
                    response.answer.is_some()
                );
                if response.values().iter().any(|value| *value == expected) {
                    info!("[dns-test] Found expected value via {resolver_name}, returning immediately");
                    return Ok(vec![response]);
                }
                results.push(response);
            }
            Err(err) => warn!("[dns-test] {err}"),
        }
    }

    if results.is_empty() {
        Err(anyhow!(
            "dns query failed for {} across resolvers",
            lookup.name
        ))
    } else {
        Ok(results)
    }
}

/// One-shot check of a validation record on public resolvers.
pub fn check_record(lookup: &DnsLookup, timeout: Duration) -> Result<DnsPropagationResult> {
    let responses = query_resolvers(lookup, timeout)?;
    let result = interpret_dns_results(&responses, lookup);
    info!(
        "[dns-test] DNS check result for {}: state={:?}, observed={:?}",
        lookup.name, result.state, result.observed_values
    );
    Ok(result)
}

/// Re-checks until the record is found, the resolvers disagree with the
/// expected value, or `wait` elapses.
pub fn wait_for_record(
    lookup: &DnsLookup,
    http_timeout: Duration,
    wait: Duration,
    interval: Duration,
) -> Result<DnsPropagationResult> {
    let mut last = None;
    let polled = poll_until("dns propagation", &lookup.name, wait, interval, || {
        let result = check_record(lookup, http_timeout)?;
        match result.state {
            PropagationState::Found | PropagationState::WrongContent => Ok(Some(result)),
            _ => {
                last = Some(result);
                Ok::<_, anyhow::Error>(None)
            }
        }
    })?;

    match polled {
        Polled::Ready(result) => Ok(result),
        Polled::TimedOut { .. } => last.ok_or_else(|| anyhow!("no DNS check was completed")),
    }
}

#[derive(Debug, Deserialize, Clone)]
struct DohAnswer {
    #[serde(rename = "data")]
    data: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer")]
    answer: Option<Vec<DohAnswer>>,
}

impl DohResponse {
    fn values(&self) -> Vec<String> {
        self.answer
            .iter()
            .flatten()
            .filter_map(|answer| answer.data.as_deref())
            .map(normalize_record_value)
            .collect()
    }
}

fn interpret_dns_results(responses: &[DohResponse], lookup: &DnsLookup) -> DnsPropagationResult {
    let expected = normalize_record_value(&lookup.expected_value);
    let mut observed = Vec::new();
    let mut saw_nxdomain = false;
    let mut saw_ok = false;

    for response in responses {
        observed.extend(response.values());
        match response.status {
            0 => saw_ok = true,
            3 => saw_nxdomain = true,
            other => warn!("[dns-test] unexpected status {other} for {}", lookup.name),
        }
    }

    if observed.contains(&expected) {
        return DnsPropagationResult {
            state: PropagationState::Found,
            reason: None,
            observed_values: observed,
        };
    }

    if !observed.is_empty() {
        return DnsPropagationResult {
            state: PropagationState::WrongContent,
            reason: Some(format!(
                "{} record present with different value",
                lookup.record_type
            )),
            observed_values: observed,
        };
    }

    if saw_ok {
        return DnsPropagationResult {
            state: PropagationState::Pending,
            reason: Some("record not found yet".to_string()),
            observed_values: observed,
        };
    }

    if saw_nxdomain {
        return DnsPropagationResult {
            state: PropagationState::NxDomain,
            reason: Some("record not found (NXDOMAIN)".to_string()),
            observed_values: observed,
        };
    }

    DnsPropagationResult {
        state: PropagationState::Error,
        reason: Some("no responses from DNS resolvers".to_string()),
        observed_values: observed,
    }
}
