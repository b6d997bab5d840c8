//! Utility functions for termkv

use crate::common::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else {
        s.split_at(s.len() - s.chars().last().map_or(0, char::len_utf8))
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let too_large = || Error::InvalidConfig(format!("duration out of range: {}", s));
    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num.checked_mul(60).ok_or_else(too_large)?),
        "h" => Duration::from_secs(num.checked_mul(3600).ok_or_else(too_large)?),
        _ => {
            return Err(Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Parse a duration string into whole milliseconds, as stored in config.
pub fn parse_duration_ms(s: &str) -> Result<u64> {
    let duration = parse_duration(s)?;
    u64::try_from(duration.as_millis())
        .map_err(|_| Error::InvalidConfig(format!("duration out of range: {}", s)))
}

/// Run a per-node storage call under a deadline. An elapsed deadline is
/// reported as `Error::Timeout`, which callers treat like any other failure.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(format!("{} after {:?}", what, limit))),
    }
}

/// Resolves on Ctrl-C; used for graceful shutdown of the servers.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
