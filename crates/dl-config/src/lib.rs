//! Runtime configuration for the datalake ingest service.
//!
//! All knobs are resolved **once** at process start from environment
//! variables and passed into constructors. Do not scatter `std::env::var`
//! calls across the codebase.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const ENV_DATA_DIR: &str = "DL_DATA_DIR";
pub const ENV_MAX_ATTEMPTS: &str = "DL_MAX_ATTEMPTS";
pub const ENV_STALE_THRESHOLD_SECS: &str = "DL_STALE_THRESHOLD_SECS";
pub const ENV_VENDOR_TIMEOUT_SECS: &str = "DL_VENDOR_TIMEOUT_SECS";
pub const ENV_DEFAULT_WINDOW_DAYS: &str = "DL_DEFAULT_WINDOW_DAYS";
pub const ENV_MIN_ARCHIVE_KEEP_DAYS: &str = "DL_MIN_ARCHIVE_KEEP_DAYS";
pub const ENV_BIND_ADDR: &str = "DL_BIND_ADDR";
pub const ENV_EODHD_API_TOKEN: &str = "EODHD_API_TOKEN";

const DB_FILE_NAME: &str = "datalake.sqlite";

/// All runtime knobs for the ingest scheduler and its stores.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory holding the embedded DB file. Created if missing.
    pub data_dir: PathBuf,
    /// Per-item retry cap. An item that fails this many times stays failed.
    pub max_attempts: i64,
    /// Age after which a `running` queue item is presumed orphaned.
    pub stale_threshold: Duration,
    /// Per-fetch timeout for the vendor OHLCV call.
    pub vendor_timeout: Duration,
    /// Window size used when a request does not specify one.
    pub default_window_days: i64,
    /// Address the daemon binds to.
    pub bind_addr: SocketAddr,
    /// Lower bound accepted for an archive cutoff, in days kept live.
    pub min_archive_keep_days: i64,
}

impl IngestConfig {
    /// Resolve configuration from the process environment.
    ///
    /// Missing variables fall back to defaults; present-but-invalid values
    /// are startup errors, never silent fallbacks.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Testable core of [`from_env`]: `get` supplies raw variable values.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = get(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let max_attempts = parse_i64(&get, ENV_MAX_ATTEMPTS, 5)?;
        if max_attempts < 1 {
            bail!("{ENV_MAX_ATTEMPTS} must be >= 1, got {max_attempts}");
        }

        let stale_secs = parse_i64(&get, ENV_STALE_THRESHOLD_SECS, 600)?;
        if stale_secs < 1 {
            bail!("{ENV_STALE_THRESHOLD_SECS} must be >= 1, got {stale_secs}");
        }

        let vendor_secs = parse_i64(&get, ENV_VENDOR_TIMEOUT_SECS, 20)?;
        if vendor_secs < 1 {
            bail!("{ENV_VENDOR_TIMEOUT_SECS} must be >= 1, got {vendor_secs}");
        }

        let default_window_days = parse_i64(&get, ENV_DEFAULT_WINDOW_DAYS, 365)?;
        if default_window_days < 1 {
            bail!("{ENV_DEFAULT_WINDOW_DAYS} must be >= 1, got {default_window_days}");
        }

        let min_archive_keep_days = parse_i64(&get, ENV_MIN_ARCHIVE_KEEP_DAYS, 30)?;
        if min_archive_keep_days < 1 {
            bail!("{ENV_MIN_ARCHIVE_KEEP_DAYS} must be >= 1, got {min_archive_keep_days}");
        }

        let bind_addr = match get(ENV_BIND_ADDR) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{ENV_BIND_ADDR} is not a socket address: {raw}"))?,
            None => SocketAddr::from(([127, 0, 0, 1], 8787)),
        };

        Ok(Self {
            data_dir,
            max_attempts,
            stale_threshold: Duration::from_secs(stale_secs as u64),
            vendor_timeout: Duration::from_secs(vendor_secs as u64),
            default_window_days,
            bind_addr,
            min_archive_keep_days,
        })
    }

    /// Location of the embedded DB file inside `data_dir`.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

fn parse_i64(get: &impl Fn(&str) -> Option<String>, key: &str, default: i64) -> Result<i64> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("{key} is not an integer: {raw}")),
    }
}

/// Vendor API token resolved from the environment.
///
/// The value is never logged; `Debug` redacts it. Error messages reference
/// the env var **name**, never the value.
#[derive(Clone)]
pub struct VendorSecrets {
    pub eodhd_api_token: Option<String>,
}

impl std::fmt::Debug for VendorSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorSecrets")
            .field(
                "eodhd_api_token",
                &self.eodhd_api_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Read vendor secrets. Empty values are treated as absent.
pub fn resolve_vendor_secrets() -> VendorSecrets {
    let token = std::env::var(ENV_EODHD_API_TOKEN)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    VendorSecrets {
        eodhd_api_token: token,
    }
}

/// Require the vendor token, with an actionable message when absent.
pub fn require_eodhd_token(secrets: &VendorSecrets) -> Result<String> {
    match &secrets.eodhd_api_token {
        Some(t) => Ok(t.clone()),
        None => bail!("{ENV_EODHD_API_TOKEN} is not set; add it to the environment or .env.local"),
    }
}
