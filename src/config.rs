//! Configuration of the sampling engine
//!
//! A configuration can be built in code, loaded from JSON, or picked from
//! the environment:
//!
//! - `PERFORMANCER_PROC_ROOT`: where procfs is mounted (default: /proc)
//! - `PERFORMANCER_INTERVAL_MS`: sampling interval in milliseconds
//!   (default: 1000)
//! - `PERFORMANCER_ERROR_CAPACITY`: how many per-tick errors a sampler keeps
//!   around for its owner before dropping them (default: 16)

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;


/// Environment variable overriding the procfs mount point
pub const ENV_PROC_ROOT: &str = "PERFORMANCER_PROC_ROOT";

/// Environment variable overriding the sampling interval (ms)
pub const ENV_INTERVAL_MS: &str = "PERFORMANCER_INTERVAL_MS";

/// Environment variable overriding the error channel capacity
pub const ENV_ERROR_CAPACITY: &str = "PERFORMANCER_ERROR_CAPACITY";


/// Sampling engine configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where procfs is mounted. Tests point this to a temporary directory.
    pub proc_root: PathBuf,

    /// Time between two samples of a periodic sampler
    #[serde(rename = "interval_ms", with = "interval_ms")]
    pub interval: Duration,

    /// Capacity of a sampler's error channel
    pub error_capacity: usize,
}
//
impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            interval: Duration::from_secs(1),
            error_capacity: 16,
        }
    }
}
//
impl Config {
    /// Load a configuration from JSON. Missing keys get their default value.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from the environment of the process
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from some set of variables, with the same
    /// rules as from_env()
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
        where F: Fn(&str) -> Option<String>
    {
        let mut config = Self::default();
        if let Some(root) = lookup(ENV_PROC_ROOT) {
            config.proc_root = PathBuf::from(root);
        }
        if let Some(interval) = lookup(ENV_INTERVAL_MS) {
            let millis = parse_var(ENV_INTERVAL_MS, &interval)?;
            config.interval = Duration::from_millis(millis);
        }
        if let Some(capacity) = lookup(ENV_ERROR_CAPACITY) {
            config.error_capacity = parse_var(ENV_ERROR_CAPACITY, &capacity)?;
        }
        config.validate()?;
        debug!(?config, "loaded configuration");
        Ok(config)
    }

    /// Check that this configuration makes sense
    pub fn validate(&self) -> Result<(), Error> {
        if self.interval.is_zero() {
            return Err(Error::Config("sampling interval must be nonzero"
                                         .to_owned()));
        }
        if self.error_capacity == 0 {
            return Err(Error::Config("error capacity must be nonzero"
                                         .to_owned()));
        }
        Ok(())
    }
}


/// INTERNAL: Decode a numerical variable
fn parse_var<T: std::str::FromStr>(name: &str, value: &str)
    -> Result<T, Error>
{
    value.trim().parse().map_err(|_| {
        Error::Config(format!("{} should be an unsigned integer, got {:?}",
                              name, value))
    })
}


/// INTERNAL: serde representation of the sampling interval in milliseconds
mod interval_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(interval: &Duration, serializer: S)
        -> Result<S::Ok, S::Error>
    {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D)
        -> Result<Duration, D::Error>
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::Error;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;
    use super::{Config, ENV_ERROR_CAPACITY, ENV_INTERVAL_MS, ENV_PROC_ROOT};

    /// INTERNAL: Build a configuration from a set of variables
    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> =
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    /// Check the default configuration
    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.error_capacity, 16);
        assert!(config.validate().is_ok());
        assert_eq!(from_vars(&[]).unwrap(), config);
    }

    /// Check that JSON configuration works, with defaults for missing keys
    #[test]
    fn json_config() {
        let config = Config::from_json(r#"{ "interval_ms": 250 }"#).unwrap();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.proc_root, PathBuf::from("/proc"));

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(Config::from_json(&json).unwrap(), config);

        assert!(matches!(Config::from_json(r#"{ "interval": 250 }"#),
                         Err(Error::Json(_))));
        assert!(matches!(Config::from_json(r#"{ "interval_ms": 0 }"#),
                         Err(Error::Config(_))));
    }

    /// Check that configuration from the environment works
    #[test]
    fn env_config() {
        let config = from_vars(&[(ENV_PROC_ROOT, "/tmp/fakeproc"),
                                 (ENV_INTERVAL_MS, "100"),
                                 (ENV_ERROR_CAPACITY, "4")]).unwrap();
        assert_eq!(config, Config {
            proc_root: PathBuf::from("/tmp/fakeproc"),
            interval: Duration::from_millis(100),
            error_capacity: 4,
        });

        assert!(matches!(from_vars(&[(ENV_INTERVAL_MS, "fast")]),
                         Err(Error::Config(_))));
        assert!(matches!(from_vars(&[(ENV_ERROR_CAPACITY, "0")]),
                         Err(Error::Config(_))));
    }
}
