//! Cache configuration.
//!
//! A [`CacheConfig`] can be deserialized (for example from YAML) or built programmatically. The
//! raw values are only checked when the cache is built, see [`CacheConfig::resolve`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::error::ValidationError;

/// The default refresh period: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// The default bound on a single load: 30 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The default overrun factor.
///
/// A successful load that completes more than `ttl * 1.5` after the previous one is reported
/// as an overrun.
pub const DEFAULT_OVERRUN_FACTOR: f64 = 1.5;

/// A duration as given in configuration.
///
/// Numbers are read as milliseconds, strings as human readable durations like `"5m"` or
/// `"250ms"`.
#[derive(Clone, Debug, PartialEq)]
pub enum DurationSetting {
    /// An exact duration, set programmatically.
    Exact(Duration),
    /// A number of milliseconds.
    Millis(f64),
    /// A human readable duration.
    Text(String),
}

impl DurationSetting {
    /// Resolves the setting, or returns `None` if it does not describe a non-negative duration.
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            DurationSetting::Exact(duration) => Some(*duration),
            DurationSetting::Millis(millis) => {
                let nanos = (millis * 1_000_000.0).round();
                if nanos.is_finite() && nanos >= 0.0 && nanos <= u64::MAX as f64 {
                    Some(Duration::from_nanos(nanos as u64))
                } else {
                    None
                }
            }
            DurationSetting::Text(text) => humantime::parse_duration(text).ok(),
        }
    }
}

impl From<Duration> for DurationSetting {
    fn from(duration: Duration) -> Self {
        DurationSetting::Exact(duration)
    }
}

impl fmt::Display for DurationSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationSetting::Exact(duration) => write!(f, "{duration:?}"),
            DurationSetting::Millis(millis) => write!(f, "{millis}"),
            DurationSetting::Text(text) => write!(f, "{text:?}"),
        }
    }
}

impl<'de> Deserialize<'de> for DurationSetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Millis(millis) => DurationSetting::Millis(millis),
            Raw::Text(text) => DurationSetting::Text(text),
        })
    }
}

/// Configuration of a single [`RefreshCache`](crate::RefreshCache).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// The name used in logs and metrics.
    pub name: String,
    /// The refresh period. Defaults to [`DEFAULT_TTL`], which is also used for a period of zero.
    pub ttl: Option<DurationSetting>,
    /// The bound on a single load. Defaults to [`DEFAULT_TIMEOUT`]; zero disables the bound.
    pub timeout: Option<DurationSetting>,
    /// The multiple of `ttl` after which a load cycle counts as an overrun.
    pub overrun_factor: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            name: "default".into(),
            ttl: None,
            timeout: None,
            overrun_factor: DEFAULT_OVERRUN_FACTOR,
        }
    }
}

impl CacheConfig {
    /// Parses a configuration from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("failed to parse cache config")
    }

    /// Reads a YAML configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&contents)
    }

    /// Validates the raw configuration and applies defaults.
    pub fn resolve(&self) -> Result<RefreshSettings, ValidationError> {
        let ttl = match &self.ttl {
            None => DEFAULT_TTL,
            Some(setting) => setting
                .to_duration()
                .ok_or_else(|| ValidationError::InvalidTtl(setting.to_string()))?,
        };
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };

        let timeout = match &self.timeout {
            None => Some(DEFAULT_TIMEOUT),
            Some(setting) => {
                let timeout = setting
                    .to_duration()
                    .ok_or_else(|| ValidationError::InvalidTimeout(setting.to_string()))?;
                (!timeout.is_zero()).then_some(timeout)
            }
        };

        let factor = self.overrun_factor;
        if !factor.is_finite() || factor < 0.0 {
            return Err(ValidationError::InvalidOverrunFactor(factor.to_string()));
        }
        let overrun_threshold = scale_duration(ttl, factor);

        Ok(RefreshSettings {
            name: self.name.as_str().into(),
            ttl,
            timeout,
            overrun_threshold,
        })
    }
}

/// Multiplies `duration` by a finite, non-negative `factor`, saturating at [`Duration::MAX`].
fn scale_duration(duration: Duration, factor: f64) -> Duration {
    let nanos = (duration.as_nanos() as f64 * factor).round();
    if nanos < u64::MAX as f64 {
        Duration::from_nanos(nanos as u64)
    } else {
        Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

/// Validated settings that drive the refresh schedule.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshSettings {
    /// The name used in logs and metrics.
    pub name: Arc<str>,
    /// The refresh period, always non-zero.
    pub ttl: Duration,
    /// The bound on a single load, if any.
    pub timeout: Option<Duration>,
    /// Load cycles longer than this are reported as overruns.
    pub overrun_threshold: Duration,
}
