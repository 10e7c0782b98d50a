//! Centralized validation functions for cf-ip-guard.
//!
//! This module provides unified validation for:
//! - Update intervals (`30s`, `10m`, `4h`, `1d`)
//! - ipset set names
//! - Range source URLs

use anyhow::{bail, Result};
use reqwest::Url;
use std::time::Duration;

use crate::enforcer::STAGING_SUFFIX;

/// Longest set name the kernel accepts (IPSET_MAXNAMELEN - 1)
pub const MAX_SET_NAME_LEN: usize = 31;

/// Parse an interval such as "30m" into a [`Duration`].
///
/// Accepts a positive integer followed by `s`, `m`, `h` or `d`.
/// Requires ASCII-only input to prevent Unicode-related edge cases.
///
/// # Examples
/// ```
/// use cf_ip_guard::validation::parse_interval;
/// use std::time::Duration;
/// assert_eq!(parse_interval("30m").unwrap(), Duration::from_secs(1800));
/// assert!(parse_interval("0m").is_err());
/// assert!(parse_interval("4x").is_err());
/// ```
pub fn parse_interval(interval: &str) -> Result<Duration> {
    if interval.is_empty() {
        bail!("Interval cannot be empty");
    }

    // Reject non-ASCII to prevent Unicode edge cases
    if !interval.is_ascii() {
        bail!("Invalid interval '{}'. Only ASCII characters allowed", interval);
    }

    if interval.len() < 2 {
        bail!(
            "Invalid interval '{}'. Use format like '30s', '10m', '4h', '1d'",
            interval
        );
    }

    // Safe to split on the last byte since we verified ASCII-only
    let (num_part, suffix) = interval.split_at(interval.len() - 1);

    let unit_secs: u64 = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        _ => bail!(
            "Invalid interval '{}'. Suffix must be s, m, h, or d",
            interval
        ),
    };

    let count: u32 = match num_part.parse() {
        Ok(n) if n > 0 => n,
        _ => bail!(
            "Invalid interval '{}'. Number part must be a positive integer",
            interval
        ),
    };

    Ok(Duration::from_secs(u64::from(count) * unit_secs))
}

/// Validate an ipset set name, leaving room for the staging suffix.
///
/// # Examples
/// ```
/// use cf_ip_guard::validation::validate_set_name;
/// assert!(validate_set_name("cloudflare4").is_ok());
/// assert!(validate_set_name("bad name").is_err());
/// ```
pub fn validate_set_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Set name cannot be empty");
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        bail!("Invalid set name '{}': character {:?} not allowed", name, c);
    }

    let max = MAX_SET_NAME_LEN - STAGING_SUFFIX.len();
    if name.len() > max {
        bail!(
            "Set name '{}' is too long ({} chars, max {} to fit the '{}' staging suffix)",
            name,
            name.len(),
            max,
            STAGING_SUFFIX
        );
    }

    Ok(())
}

/// Validate the range source URL (absolute http or https).
pub fn validate_api_url(url: &str) -> Result<()> {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => bail!("Invalid API URL '{}': {}", url, e),
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("API URL must use http or https: {}", url);
    }
    Ok(())
}
