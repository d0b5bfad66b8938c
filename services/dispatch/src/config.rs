//! Service configuration

use anyhow::{Context, Result, bail};
use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::{models::token::DEFAULT_VALIDITY_MS, service::ServiceSettings, throttle::ThrottleConfig};

/// Ten years
const MAX_RETENTION_HOURS: i64 = 87_600;

/// Which store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// Dispatch service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Socket address the HTTP server binds to
    pub bind_address: String,
    /// Base for scan links; derived from request headers when unset
    pub public_base_url: Option<String>,
    /// Validity of a session when the request does not specify one
    pub default_validity_ms: i64,
    /// Upper bound on one store round-trip, in milliseconds
    pub store_timeout_ms: u64,
    pub store: StoreKind,
    /// Report reused codes as `expired_or_invalid` too
    pub conceal_reuse: bool,
    /// Bearer token for direct enqueue; the route is disabled when unset
    pub admin_token: Option<String>,
    /// Scan attempts allowed per client and window; 0 disables throttling
    pub scan_limit: u32,
    pub scan_window_secs: u64,
    /// Key scan throttling on `X-Forwarded-For`; only safe behind a proxy that sets it
    pub trust_forwarded: bool,
    /// Cron expression for the token retention job; disabled when unset
    pub retention_schedule: Option<String>,
    pub retention_hours: i64,
}

impl DispatchConfig {
    /// Create a new DispatchConfig from environment variables
    ///
    /// # Environment Variables
    /// - `DISPATCH_BIND_ADDRESS` (default: `0.0.0.0:5000`)
    /// - `DISPATCH_PUBLIC_BASE_URL`
    /// - `DISPATCH_DEFAULT_VALIDITY_MS` (default: 15000)
    /// - `DISPATCH_STORE_TIMEOUT_MS` (default: 3000)
    /// - `DISPATCH_STORE`: `postgres` or `memory` (default: `postgres`)
    /// - `DISPATCH_CONCEAL_REUSE` (default: false)
    /// - `DISPATCH_ADMIN_TOKEN`
    /// - `DISPATCH_SCAN_LIMIT` (default: 30)
    /// - `DISPATCH_SCAN_WINDOW_SECS` (default: 60)
    /// - `DISPATCH_TRUST_FORWARDED` (default: false)
    /// - `DISPATCH_RETENTION_SCHEDULE`: six-field cron expression
    /// - `DISPATCH_RETENTION_HOURS` (default: 24, at most 87600)
    pub fn from_env() -> Result<Self> {
        let config: DispatchConfig = Config::builder()
            .set_default("bind_address", "0.0.0.0:5000")?
            .set_default("default_validity_ms", DEFAULT_VALIDITY_MS)?
            .set_default("store_timeout_ms", 3_000i64)?
            .set_default("store", "postgres")?
            .set_default("conceal_reuse", false)?
            .set_default("scan_limit", 30i64)?
            .set_default("scan_window_secs", 60i64)?
            .set_default("trust_forwarded", false)?
            .set_default("retention_hours", 24i64)?
            .add_source(Environment::with_prefix("DISPATCH").try_parsing(true))
            .build()
            .context("Failed to read dispatch configuration")?
            .try_deserialize()
            .context("Invalid dispatch configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.store_timeout_ms == 0 {
            bail!("DISPATCH_STORE_TIMEOUT_MS must be positive");
        }
        if !(0..=MAX_RETENTION_HOURS).contains(&self.retention_hours) {
            bail!(
                "DISPATCH_RETENTION_HOURS must be between 0 and {}",
                MAX_RETENTION_HOURS
            );
        }
        if self.scan_limit > 0 && self.scan_window_secs == 0 {
            bail!("DISPATCH_SCAN_WINDOW_SECS must be positive while throttling is enabled");
        }
        self.base_url()?;
        Ok(())
    }

    /// Parsed `public_base_url`
    pub fn base_url(&self) -> Result<Option<Url>> {
        let Some(raw) = self.public_base_url.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };
        let url = Url::parse(raw.trim())
            .with_context(|| format!("DISPATCH_PUBLIC_BASE_URL is not a URL: {}", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("DISPATCH_PUBLIC_BASE_URL must use http or https");
        }
        Ok(Some(url))
    }

    /// Admin token, ignoring blank values
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            default_validity_ms: self.default_validity_ms,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig {
            max_attempts: self.scan_limit,
            window_seconds: self.scan_window_secs,
        }
    }
}
