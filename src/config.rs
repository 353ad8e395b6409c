//! # Runtime configuration.
//!
//! [`Config`] bundles the options of every module. It is read from a TOML
//! document whose tables map one-to-one onto the option structs:
//!
//! ```toml
//! shutdown_grace_ms = 10000
//!
//! [pool]
//! num_workers = 8
//! enable_auto_scaling = true
//!
//! [context]
//! default_timeout_sec = 10
//!
//! [events]
//! event_store_enabled = true
//! [events.overrides."user.created"]
//! timeout_ms = 500
//!
//! [queue]
//! driver = "memory"
//! retry_policy = "backoff"
//! [queue.jobs.send_email]
//! max_attempts = 5
//! ```
//!
//! Missing tables and keys take their defaults. Loading always ends with
//! [`Config::validate`].
//!
//! [`ConfigSource`] is the untyped view for ad-hoc lookups by dot path.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::ContextConfig;
use crate::error::ConfigError;
use crate::events::EventConfig;
use crate::jobs::QueueConfig;
use crate::pool::PoolConfig;

/// Options for every module plus the shutdown grace period.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use worklane::Config;
///
/// let cfg = Config::from_toml_str(r#"
///     shutdown_grace_ms = 500
///     [pool]
///     num_workers = 2
///     [queue]
///     driver = "sync"
/// "#).unwrap();
///
/// assert_eq!(cfg.pool.workers(), 2);
/// assert_eq!(cfg.shutdown_grace(), Some(Duration::from_millis(500)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub context: ContextConfig,
    pub events: EventConfig,
    pub queue: QueueConfig,
    /// Time allowed for in-flight work during shutdown (milliseconds, `0` = wait forever).
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    /// Module defaults and a 30s shutdown grace.
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            context: ContextConfig::default(),
            events: EventConfig::default(),
            queue: QueueConfig::default(),
            shutdown_grace_ms: 30_000,
        }
    }
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        Self::from_source(&TomlSource::parse(doc)?)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let doc = std::fs::read_to_string(path)?;
        Self::from_toml_str(&doc)
    }

    /// Builds a validated config from the tables of `src`.
    pub fn from_source(src: &TomlSource) -> Result<Self, ConfigError> {
        let grace = src.get_int("shutdown_grace_ms", 30_000);
        let cfg = Self {
            pool: src.section("pool")?,
            context: src.section("context")?,
            events: src.section("events")?,
            queue: src.section("queue")?,
            shutdown_grace_ms: u64::try_from(grace).map_err(|_| {
                ConfigError::invalid("shutdown_grace_ms", format!("{grace} is negative"))
            })?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks every module's options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        self.context.validate()?;
        self.events.validate()?;
        self.queue.validate()?;
        Ok(())
    }

    /// Shutdown grace, or `None` to wait without bound.
    pub fn shutdown_grace(&self) -> Option<Duration> {
        (self.shutdown_grace_ms > 0).then(|| Duration::from_millis(self.shutdown_grace_ms))
    }
}

/// Untyped configuration lookups by dot path (`"pool.num_workers"`).
///
/// Missing keys and type mismatches yield `default`.
pub trait ConfigSource: Send + Sync {
    fn get_int(&self, key: &str, default: i64) -> i64;

    fn get_bool(&self, key: &str, default: bool) -> bool;

    fn get_string(&self, key: &str, default: &str) -> String;
}

/// [`ConfigSource`] over a parsed TOML document.
///
/// # Example
/// ```
/// use worklane::config::{ConfigSource, TomlSource};
///
/// let src = TomlSource::parse("[pool]\nnum_workers = 4").unwrap();
/// assert_eq!(src.get_int("pool.num_workers", 0), 4);
/// assert_eq!(src.get_int("pool.missing", 7), 7);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TomlSource {
    root: toml::Table,
}

impl TomlSource {
    /// Parses `doc` as a TOML table.
    pub fn parse(doc: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            root: doc.parse::<toml::Table>()?,
        })
    }

    /// Value at a dot path.
    pub fn lookup(&self, key: &str) -> Option<&toml::Value> {
        let mut parts = key.split('.');
        let mut cur = self.root.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_table()?.get(part)?;
        }
        Some(cur)
    }

    /// Deserializes the table at `key`, or returns `T::default()` if absent.
    pub fn section<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.lookup(key) {
            Some(value) => Ok(value.clone().try_into()?),
            None => Ok(T::default()),
        }
    }
}

impl ConfigSource for TomlSource {
    fn get_int(&self, key: &str, default: i64) -> i64 {
        self.lookup(key)
            .and_then(toml::Value::as_integer)
            .unwrap_or(default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.lookup(key)
            .and_then(toml::Value::as_bool)
            .unwrap_or(default)
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.lookup(key)
            .and_then(toml::Value::as_str)
            .unwrap_or(default)
            .to_string()
    }
}
