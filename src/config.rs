use std::time::Duration;

use dotenvy::dotenv;

use crate::error::SyncError;
use crate::models::Locale;

pub const ENV_API_URL: &str = "LISTINGS_API_URL";
pub const ENV_COMPANY_ID: &str = "LISTINGS_COMPANY_ID";
pub const ENV_API_KEY: &str = "LISTINGS_API_KEY";
pub const ENV_API_KEY_PREFIX: &str = "LISTINGS_API_KEY_PREFIX";
pub const ENV_LOCALES: &str = "LISTINGS_LOCALES";
pub const ENV_DEFAULT_LOCALE: &str = "LISTINGS_DEFAULT_LOCALE";
pub const ENV_TIMEOUT_SECS: &str = "LISTINGS_TIMEOUT_SECS";
pub const ENV_SYNC_INTERVAL_SECS: &str = "LISTINGS_SYNC_INTERVAL_SECS";
pub const ENV_FRESHNESS_SECS: &str = "LISTINGS_FRESHNESS_SECS";
pub const ENV_ALLOW_EMPTY: &str = "LISTINGS_ALLOW_EMPTY";

const DEFAULT_API_KEY_PREFIX: &str = "API-KEY ";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10 * 60;
const DEFAULT_FRESHNESS_SECS: u64 = 15 * 60;

/// Everything the engine reads from the environment
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub api: ApiSettings,
    pub cache: CacheSettings,
}

/// Upstream connection settings.
///
/// Credentials stay optional here; a request without them fails with
/// [`SyncError::Configuration`] before touching the network.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Option<String>,
    pub company_id: Option<String>,
    pub api_key: Option<String>,
    /// Prepended to the key in the `authorization` header
    pub api_key_prefix: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            company_id: None,
            api_key: None,
            api_key_prefix: DEFAULT_API_KEY_PREFIX.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: concat!("listings-sync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Credentials borrowed from [`ApiSettings`] once they are known to be present
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub base_url: &'a str,
    pub company_id: &'a str,
    pub api_key: &'a str,
}

impl ApiSettings {
    pub fn credentials(&self) -> Result<Credentials<'_>, SyncError> {
        fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, SyncError> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SyncError::config(format!("{name} must be set")))
        }

        Ok(Credentials {
            base_url: required(&self.base_url, ENV_API_URL)?,
            company_id: required(&self.company_id, ENV_COMPANY_ID)?,
            api_key: required(&self.api_key, ENV_API_KEY)?,
        })
    }
}

/// Refresh and freshness behavior
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Locales fetched on every sync; always contains `default_locale`
    pub locales: Vec<Locale>,
    pub default_locale: Locale,
    /// Upper bound for one locale fetch
    pub fetch_timeout: Duration,
    pub sync_interval: Duration,
    /// Snapshots older than this are reported as needing a refresh
    pub freshness_window: Duration,
    /// Publish an empty upstream answer over a non-empty snapshot
    pub allow_empty_snapshot: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            locales: Locale::ALL.to_vec(),
            default_locale: Locale::DEFAULT,
            fetch_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            freshness_window: Duration::from_secs(DEFAULT_FRESHNESS_SECS),
            allow_empty_snapshot: false,
        }
    }
}

impl Settings {
    /// Load settings from environment variables, reading `.env` if present
    pub fn from_env() -> Result<Self, SyncError> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout = seconds(&get, ENV_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS)?;
        let default_locale = match get(ENV_DEFAULT_LOCALE) {
            Some(code) => code.parse::<Locale>().map_err(SyncError::config)?,
            None => Locale::DEFAULT,
        };

        let mut locales = match get(ENV_LOCALES) {
            Some(list) => list
                .split(',')
                .filter(|code| !code.trim().is_empty())
                .map(|code| code.parse::<Locale>().map_err(SyncError::config))
                .collect::<Result<Vec<_>, _>>()?,
            None => Locale::ALL.to_vec(),
        };
        if !locales.contains(&default_locale) {
            locales.insert(0, default_locale);
        }
        let mut seen = Vec::with_capacity(locales.len());
        locales.retain(|l| {
            let first = !seen.contains(l);
            seen.push(*l);
            first
        });

        let allow_empty_snapshot = match get(ENV_ALLOW_EMPTY).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => false,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => {
                return Err(SyncError::config(format!(
                    "{ENV_ALLOW_EMPTY} must be true or false, got '{other}'"
                )))
            }
        };

        let settings = Self {
            api: ApiSettings {
                base_url: get(ENV_API_URL),
                company_id: get(ENV_COMPANY_ID),
                api_key: get(ENV_API_KEY),
                api_key_prefix: lookup(ENV_API_KEY_PREFIX)
                    .unwrap_or_else(|| DEFAULT_API_KEY_PREFIX.to_string()),
                timeout,
                ..ApiSettings::default()
            },
            cache: CacheSettings {
                locales,
                default_locale,
                fetch_timeout: timeout,
                sync_interval: seconds(&get, ENV_SYNC_INTERVAL_SECS, DEFAULT_SYNC_INTERVAL_SECS)?,
                freshness_window: seconds(&get, ENV_FRESHNESS_SECS, DEFAULT_FRESHNESS_SECS)?,
                allow_empty_snapshot,
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Sanity checks that do not involve credentials
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.cache.locales.is_empty() {
            return Err(SyncError::config("at least one locale must be configured"));
        }
        if !self.cache.locales.contains(&self.cache.default_locale) {
            return Err(SyncError::config(format!(
                "default locale {} is not among fetched locales",
                self.cache.default_locale
            )));
        }
        if self.api.timeout.is_zero() || self.cache.fetch_timeout.is_zero() {
            return Err(SyncError::config(format!("{ENV_TIMEOUT_SECS} must be > 0")));
        }
        if self.cache.sync_interval.is_zero() {
            return Err(SyncError::config(format!("{ENV_SYNC_INTERVAL_SECS} must be > 0")));
        }
        Ok(())
    }
}

fn seconds(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, SyncError> {
    match get(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| SyncError::config(format!("{key} must be a whole number of seconds"))),
    }
}
