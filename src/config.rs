use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Journal directory. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub metrics_port: Option<u16>,
    pub visit_flush_interval: Duration,
    pub id_persist_interval: Duration,
    /// Journal appends between compactions.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            metrics_port: None,
            visit_flush_interval: Duration::from_millis(2000),
            id_persist_interval: Duration::from_secs(90),
            compact_threshold: 1000,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let data_dir = lookup("SCOREKEEP_DATA_DIR")
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);
        let metrics_port = parse(&lookup, "SCOREKEEP_METRICS_PORT", "a port number")?;
        let visit_flush_interval = parse(&lookup, "SCOREKEEP_VISIT_FLUSH_MS", "milliseconds")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.visit_flush_interval);
        let id_persist_interval = parse(&lookup, "SCOREKEEP_ID_PERSIST_SECS", "seconds")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.id_persist_interval);
        let compact_threshold = parse(&lookup, "SCOREKEEP_COMPACT_THRESHOLD", "a count")?
            .unwrap_or(defaults.compact_threshold);

        for (var, interval) in [
            ("SCOREKEEP_VISIT_FLUSH_MS", visit_flush_interval),
            ("SCOREKEEP_ID_PERSIST_SECS", id_persist_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::Invalid {
                    var,
                    expected: "greater than zero",
                    value: "0".into(),
                });
            }
        }

        Ok(Self {
            data_dir,
            metrics_port,
            visit_flush_interval,
            id_persist_interval,
            compact_threshold,
        })
    }

    /// Journal file inside the data directory, if one is configured.
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join("scorekeep.wal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = config(&[]).unwrap();
        assert_eq!(c, Config::default());
        assert_eq!(c.visit_flush_interval, Duration::from_secs(2));
        assert_eq!(c.id_persist_interval, Duration::from_secs(90));
        assert!(c.journal_path().is_none());
    }

    #[test]
    fn reads_every_variable() {
        let c = config(&[
            ("SCOREKEEP_DATA_DIR", "/var/lib/scorekeep"),
            ("SCOREKEEP_METRICS_PORT", "9100"),
            ("SCOREKEEP_VISIT_FLUSH_MS", "500"),
            ("SCOREKEEP_ID_PERSIST_SECS", "30"),
            ("SCOREKEEP_COMPACT_THRESHOLD", "50"),
        ])
        .unwrap();
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.visit_flush_interval, Duration::from_millis(500));
        assert_eq!(c.id_persist_interval, Duration::from_secs(30));
        assert_eq!(c.compact_threshold, 50);
        assert_eq!(
            c.journal_path().unwrap(),
            PathBuf::from("/var/lib/scorekeep/scorekeep.wal")
        );
    }

    #[test]
    fn malformed_value_names_the_variable() {
        let err = config(&[("SCOREKEEP_METRICS_PORT", "ninety")]).unwrap_err();
        assert!(err.to_string().contains("SCOREKEEP_METRICS_PORT"));
        assert!(err.to_string().contains("ninety"));
    }

    #[test]
    fn zero_interval_rejected() {
        assert!(config(&[("SCOREKEEP_VISIT_FLUSH_MS", "0")]).is_err());
    }

    #[test]
    fn empty_data_dir_means_memory_only() {
        assert!(config(&[("SCOREKEEP_DATA_DIR", "")]).unwrap().data_dir.is_none());
    }
}
