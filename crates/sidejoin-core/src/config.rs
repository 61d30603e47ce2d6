//! Lookup join configuration.
//!
//! Built either by deserializing a [`LookupJoinConfig`] or from the flat
//! `WITH (...)` property map of a table definition via
//! [`LookupJoinConfig::from_properties`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JoinError;

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod duration_millis {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ---------------------------------------------------------------------------
// Default helpers
// ---------------------------------------------------------------------------

/// Default LRU capacity: 10 000 keys.
const fn default_cache_capacity() -> usize {
    10_000
}

/// Default LRU TTL and snapshot reload period: 60 seconds.
const fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

/// Default per-lookup timeout: 10 seconds.
const fn default_async_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Default timeout limit: effectively unlimited.
const fn default_async_timeout_limit() -> u64 {
    u64::MAX
}

/// Default timeout log cadence: every 10th timeout.
const fn default_timeout_log_every() -> u64 {
    10
}

/// Default maximum concurrent backend lookups.
const fn default_max_in_flight() -> usize {
    100
}

// ---------------------------------------------------------------------------
// CacheMode
// ---------------------------------------------------------------------------

/// Which cache sits in front of the lookup source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Every record goes to the backend.
    #[default]
    None,
    /// Bounded LRU cache with TTL, filled by lookups.
    Lru,
    /// Whole side table loaded up front and reloaded periodically.
    #[serde(alias = "full", alias = "snapshot")]
    All,
}

impl FromStr for CacheMode {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "lru" => Ok(Self::Lru),
            "all" | "full" | "snapshot" => Ok(Self::All),
            other => Err(JoinError::Config(format!(
                "unsupported cache type '{other}': expected one of none, lru, all"
            ))),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Lru => write!(f, "lru"),
            Self::All => write!(f, "all"),
        }
    }
}

// ---------------------------------------------------------------------------
// LookupJoinConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for one lookup join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupJoinConfig {
    /// Cache strategy.
    #[serde(default)]
    pub cache_mode: CacheMode,

    /// Maximum keys held by the LRU cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// LRU entry lifetime; in `all` mode, the snapshot reload period.
    #[serde(default = "default_cache_ttl", with = "duration_millis")]
    pub cache_ttl: Duration,

    /// Upper bound on one backend lookup.
    #[serde(default = "default_async_timeout", with = "duration_millis")]
    pub async_timeout: Duration,

    /// Timeouts tolerated before the join fails.
    #[serde(default = "default_async_timeout_limit")]
    pub async_timeout_limit: u64,

    /// Log every N-th timeout.
    #[serde(default = "default_timeout_log_every")]
    pub timeout_log_every: u64,

    /// Maximum backend lookups in flight at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for LookupJoinConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::default(),
            cache_capacity: default_cache_capacity(),
            cache_ttl: default_cache_ttl(),
            async_timeout: default_async_timeout(),
            async_timeout_limit: default_async_timeout_limit(),
            timeout_log_every: default_timeout_log_every(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl LookupJoinConfig {
    /// Parses a flat property map.
    ///
    /// Recognized keys:
    /// - `cache` - `none`, `lru` or `all` (`full`/`snapshot` are aliases)
    /// - `cache.size` - LRU capacity
    /// - `cache.ttl.ms` - LRU TTL / reload period
    /// - `async.timeout.ms` - per-lookup timeout
    /// - `async.timeout.limit` - timeouts tolerated before failing
    /// - `async.timeout.log.every` - timeout log cadence
    /// - `async.capacity` - concurrent backend lookups
    ///
    /// Unknown keys are ignored; they belong to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Config`] on unparsable or inconsistent values.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, JoinError> {
        let mut cfg = Self::default();

        if let Some(v) = props.get("cache") {
            cfg.cache_mode = v.parse()?;
        }
        if let Some(v) = props.get("cache.size") {
            cfg.cache_capacity = parse_number("cache.size", v)?;
        }
        if let Some(v) = props.get("cache.ttl.ms") {
            cfg.cache_ttl = Duration::from_millis(parse_number("cache.ttl.ms", v)?);
        }
        if let Some(v) = props.get("async.timeout.ms") {
            cfg.async_timeout = Duration::from_millis(parse_number("async.timeout.ms", v)?);
        }
        if let Some(v) = props.get("async.timeout.limit") {
            cfg.async_timeout_limit = parse_number("async.timeout.limit", v)?;
        }
        if let Some(v) = props.get("async.timeout.log.every") {
            cfg.timeout_log_every = parse_number("async.timeout.log.every", v)?;
        }
        if let Some(v) = props.get("async.capacity") {
            cfg.max_in_flight = parse_number("async.capacity", v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Config`] on invalid combinations.
    pub fn validate(&self) -> Result<(), JoinError> {
        if self.cache_mode == CacheMode::Lru && self.cache_capacity == 0 {
            return Err(JoinError::Config(
                "cache.size must be greater than 0 for the lru cache".into(),
            ));
        }
        if self.cache_mode == CacheMode::All && self.cache_ttl.is_zero() {
            return Err(JoinError::Config(
                "cache.ttl.ms must be greater than 0 for the all cache".into(),
            ));
        }
        if self.async_timeout.is_zero() {
            return Err(JoinError::Config(
                "async.timeout.ms must be greater than 0".into(),
            ));
        }
        if self.timeout_log_every == 0 {
            return Err(JoinError::Config(
                "async.timeout.log.every must be greater than 0".into(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(JoinError::Config(
                "async.capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// LRU TTL; a zero TTL means entries never expire.
    #[must_use]
    pub fn lru_ttl(&self) -> Option<Duration> {
        (!self.cache_ttl.is_zero()).then_some(self.cache_ttl)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, JoinError> {
    value
        .trim()
        .parse()
        .map_err(|_| JoinError::Config(format!("invalid {key}: '{value}'")))
}
