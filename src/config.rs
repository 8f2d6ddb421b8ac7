use std::collections::HashMap;

use crate::error::EnrichError;

/// Operator settings recognized by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    BlockThreshold,
    CacheExpirySeconds,
    CacheUrl,
    FailOpen,
    Domain,
    ClientId,
    ClientSecret,
}

impl Setting {
    pub const ALL: [Setting; 7] = [
        Setting::BlockThreshold,
        Setting::CacheExpirySeconds,
        Setting::CacheUrl,
        Setting::FailOpen,
        Setting::Domain,
        Setting::ClientId,
        Setting::ClientSecret,
    ];

    /// Name of the variable the value is read from.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BlockThreshold => "ABUSEIPDB_BLOCK_THRESHOLD",
            Self::CacheExpirySeconds => "ABUSEIPDB_CACHE_EXPIRY_SECONDS",
            Self::CacheUrl => "ABUSEIPDB_CACHE_URL",
            Self::FailOpen => "ABUSEIPDB_FAIL_OPEN",
            Self::Domain => "KINDE_DOMAIN",
            Self::ClientId => "KINDE_WF_M2M_CLIENT_ID",
            Self::ClientSecret => "KINDE_WF_M2M_CLIENT_SECRET",
        }
    }

    /// Whether the raw value must never appear in logs.
    pub const fn is_secret(self) -> bool {
        matches!(self, Self::ClientSecret)
    }
}

/// Where raw setting values come from.
///
/// Implementations return the raw string exactly as configured; an empty
/// string is a present value, not an absent one.
pub trait ConfigSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads settings from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Values given at startup take precedence over the fallback source.
#[derive(Debug, Clone)]
pub struct LayeredSource<S> {
    overrides: HashMap<String, String>,
    fallback: S,
}

impl<S: ConfigSource> LayeredSource<S> {
    pub fn new(overrides: HashMap<String, String>, fallback: S) -> Self {
        Self {
            overrides,
            fallback,
        }
    }
}

impl<S: ConfigSource> ConfigSource for LayeredSource<S> {
    fn get(&self, name: &str) -> Option<String> {
        self.overrides
            .get(name)
            .cloned()
            .or_else(|| self.fallback.get(name))
    }
}

/// Read `setting` from `source` and run it through `validator`.
///
/// Absent and invalid values both come back as [`EnrichError::Configuration`];
/// the caller decides what a failure means for its claim.
pub fn resolve<T>(
    source: &dyn ConfigSource,
    setting: Setting,
    validator: fn(&str) -> Result<T, String>,
) -> Result<T, EnrichError> {
    let name = setting.as_str();
    let raw = source.get(name).ok_or_else(|| {
        EnrichError::Configuration(format!("environment variable {name} not found"))
    })?;

    validator(&raw).map_err(|expected| {
        if setting.is_secret() {
            EnrichError::Configuration(format!("invalid {name} value. Expected {expected}"))
        } else {
            EnrichError::Configuration(format!(
                "invalid {name} value: {raw:?}. Expected {expected}"
            ))
        }
    })
}

/// Read the leading base-10 integer of `raw`, ignoring anything after it:
/// `"3600s"` is 3600, `"42.0"` is 42, `"1e2"` is 1. Leading whitespace and a
/// single sign are allowed. `None` when no digit starts the value.
pub fn leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let unsigned = trimmed
        .strip_prefix(|c: char| c == '+' || c == '-')
        .unwrap_or(trimmed);
    let digits = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .map_or(unsigned, |end| &unsigned[..end]);
    if digits.is_empty() {
        return None;
    }

    let sign_len = trimmed.len() - unsigned.len();
    trimmed[..sign_len + digits.len()].parse().ok()
}

/// An integer in `0..=100`.
pub fn percentage(raw: &str) -> Result<u8, String> {
    const EXPECTED: &str = "a number between 0-100";
    let value = leading_integer(raw).ok_or_else(|| EXPECTED.to_string())?;
    u8::try_from(value)
        .ok()
        .filter(|value| *value <= 100)
        .ok_or_else(|| EXPECTED.to_string())
}

/// An integer strictly greater than zero.
pub fn positive_seconds(raw: &str) -> Result<u64, String> {
    const EXPECTED: &str = "a positive number";
    let value = leading_integer(raw).ok_or_else(|| EXPECTED.to_string())?;
    u64::try_from(value)
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| EXPECTED.to_string())
}

/// Any non-empty string, passed through as-is.
pub fn non_empty(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("a non-empty string".to_string());
    }
    Ok(raw.to_string())
}

/// Only the exact literal `TRUE` enables fail-open. Any other present value,
/// including `true` and the empty string, is `false`.
pub fn fail_open_flag(raw: &str) -> Result<bool, String> {
    Ok(raw == "TRUE")
}

/// Present and non-blank; used for the management API credentials.
pub fn credential_value(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("a non-empty value".to_string());
    }
    Ok(trimmed.to_string())
}
