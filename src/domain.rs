use anyhow::{Result, anyhow};

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalizes a certificate domain to lowercase ASCII without a trailing dot.
///
/// A single leading wildcard label (`*.example.com`) is allowed. Underscores are
/// rejected here; they only appear in validation record names.
pub fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(anyhow!("domain name is required"));
    }

    let (wildcard, rest) = match trimmed.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if rest.contains('*') {
        return Err(anyhow!(
            "wildcard must be the first label of the domain, eg: \"*.example.com\". {trimmed} is invalid"
        ));
    }

    let ascii =
        idna::domain_to_ascii(rest).map_err(|err| anyhow!("invalid domain name {trimmed}: {err}"))?;
    let ascii = ascii.to_lowercase();
    check_labels(&ascii).map_err(|reason| anyhow!("invalid domain name {trimmed}: {reason}"))?;

    let normalized = if wildcard {
        format!("*.{ascii}")
    } else {
        ascii
    };
    if normalized.len() > MAX_DOMAIN_LEN {
        return Err(anyhow!(
            "domain name {trimmed} exceeds {MAX_DOMAIN_LEN} characters"
        ));
    }
    Ok(normalized)
}

/// Splits a comma-separated domain list, dropping blank entries.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fully-qualified form of a DNS record name as used in validation references.
pub fn fqdn(record_name: &str) -> String {
    record_name.trim().trim_end_matches('.').to_lowercase()
}

/// Returns true when `domain` is the zone apex or lives beneath it.
pub fn matches_zone(domain: &str, zone_name: &str) -> bool {
    let domain = fqdn(domain);
    let zone_name = fqdn(zone_name);
    if domain.is_empty() || zone_name.is_empty() {
        return false;
    }
    let domain = domain.trim_start_matches("*.");
    zone_name == domain || domain.ends_with(&format!(".{zone_name}"))
}

/// Best-effort registrable zone for a hostname (last two labels).
pub fn derive_zone(hostname: &str) -> String {
    let parts: Vec<&str> = hostname.trim_end_matches('.').split('.').collect();
    if parts.len() >= 2 {
        format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1])
    } else {
        hostname.to_string()
    }
}

fn check_labels(ascii: &str) -> std::result::Result<(), String> {
    let labels: Vec<&str> = ascii.split('.').collect();
    if labels.len() < 2 {
        return Err("at least two labels are required".to_string());
    }
    for label in labels {
        if label.is_empty() {
            return Err("empty label".to_string());
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(format!("label {label} exceeds {MAX_LABEL_LEN} characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label {label} cannot start or end with '-'"));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!("label {label} contains invalid characters"));
        }
    }
    Ok(())
}
