//! Utility functions

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Build information for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Parse a non-negative, possibly fractional, number of seconds
pub fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid number of seconds: {raw}"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid number of seconds: {raw}"))
}

/// Parse a whole number of milliseconds
pub fn parse_millis(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| format!("invalid number of milliseconds: {raw}"))
}
