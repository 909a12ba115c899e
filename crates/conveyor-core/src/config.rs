//! Process configuration, loaded from TOML.
//!
//! Every section has defaults, so an empty file (or no file) is valid.
//!
//! ```toml
//! [broker]
//! queue = "default"
//!
//! [worker]
//! concurrency = 4
//! ack_policy = "late"
//!
//! [results]
//! ttl_secs = 86400
//! sweep_interval_secs = 60
//!
//! [[beat.schedule]]
//! name = "run-every-30-seconds"
//! task = "scheduled_task_demo"
//! interval_secs = 30
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::scheduler::ScheduleSpec;
use crate::domain::AckPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerConfig,
    pub worker: WorkerConfig,
    pub results: ResultsConfig,
    pub idempotency: IdempotencyConfig,
    pub beat: BeatConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Mailbox consumed by workers and targeted by producers.
    pub queue: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue: crate::app::producer::DEFAULT_QUEUE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    /// Stamped on invocations of tasks without their own policy.
    pub ack_policy: AckPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            ack_policy: AckPolicy::Late,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// Retention of execution records. 0 keeps them forever.
    pub ttl_secs: u64,
    /// How often expired records and claims are purged. 0 turns the sweep off.
    pub sweep_interval_secs: u64,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub claim_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    pub enabled: bool,
    pub schedule: Vec<ScheduleEntryConfig>,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: vec![ScheduleEntryConfig {
                name: "run-every-30-seconds".to_string(),
                task: "scheduled_task_demo".to_string(),
                interval_secs: 30,
                args: Vec::new(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntryConfig {
    pub name: String,
    pub task: String,
    pub interval_secs: u64,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Timings of the bundled demo tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub long_running_secs: u64,
    pub notification_secs: u64,
    pub order_payment_ms: u64,
    pub flaky_failure_rate: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            long_running_secs: 5,
            notification_secs: 3,
            order_payment_ms: 500,
            flaky_failure_rate: 0.5,
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// `load(path)` if a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.queue.is_empty() {
            return Err(ConfigError::Invalid("broker.queue must not be empty".into()));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid("worker.concurrency must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.demo.flaky_failure_rate) {
            return Err(ConfigError::Invalid(format!(
                "demo.flaky_failure_rate must be within 0..=1, got {}",
                self.demo.flaky_failure_rate
            )));
        }

        let mut names = HashSet::new();
        for entry in &self.beat.schedule {
            if entry.interval_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "beat.schedule '{}': interval_secs must be at least 1",
                    entry.name
                )));
            }
            if !names.insert(entry.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "beat.schedule '{}' is defined twice",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    pub fn result_ttl(&self) -> Option<Duration> {
        (self.results.ttl_secs > 0).then(|| Duration::from_secs(self.results.ttl_secs))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.results.sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.results.sweep_interval_secs))
    }

    pub fn claim_ttl(&self) -> Option<Duration> {
        self.idempotency.claim_ttl_secs.map(Duration::from_secs)
    }

    pub fn schedule_specs(&self) -> Vec<ScheduleSpec> {
        self.beat
            .schedule
            .iter()
            .map(|entry| {
                ScheduleSpec::new(
                    entry.name.clone(),
                    entry.task.as_str(),
                    Duration::from_secs(entry.interval_secs),
                )
                .with_args(entry.args.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn empty_file_is_all_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.broker.queue, "default");
        assert_eq!(settings.worker.concurrency, 4);
        assert_eq!(settings.result_ttl(), Some(Duration::from_secs(86_400)));
        assert_eq!(settings.claim_ttl(), None);
        assert_eq!(settings.sweep_interval(), Some(Duration::from_secs(60)));

        let specs = settings.schedule_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].task.as_str(), "scheduled_task_demo");
        assert_eq!(specs[0].interval, Duration::from_secs(30));
    }

    #[test]
    fn full_file() {
        let settings = Settings::from_toml_str(
            r#"
            [broker]
            queue = "orders"

            [worker]
            concurrency = 2
            ack_policy = "eager"

            [results]
            ttl_secs = 0
            sweep_interval_secs = 0

            [idempotency]
            claim_ttl_secs = 3600

            [beat]
            enabled = false

            [[beat.schedule]]
            name = "nightly"
            task = "report"
            interval_secs = 86400
            args = ["daily", 7]

            [demo]
            long_running_secs = 1
            "#,
        )
        .unwrap();

        assert_eq!(settings.broker.queue, "orders");
        assert_eq!(settings.worker.concurrency, 2);
        assert_eq!(settings.worker.ack_policy, AckPolicy::Eager);
        assert_eq!(settings.result_ttl(), None);
        assert_eq!(settings.sweep_interval(), None);
        assert_eq!(settings.claim_ttl(), Some(Duration::from_secs(3600)));
        assert!(!settings.beat.enabled);
        assert_eq!(settings.schedule_specs()[0].args, vec![json!("daily"), json!(7)]);
        assert_eq!(settings.demo.long_running_secs, 1);
        assert_eq!(settings.demo.notification_secs, 3);
    }

    #[rstest]
    #[case::zero_concurrency("[worker]\nconcurrency = 0")]
    #[case::zero_interval("[[beat.schedule]]\nname = \"a\"\ntask = \"t\"\ninterval_secs = 0")]
    #[case::duplicate_names(concat!(
        "[[beat.schedule]]\nname = \"a\"\ntask = \"t\"\ninterval_secs = 1\n",
        "[[beat.schedule]]\nname = \"a\"\ntask = \"u\"\ninterval_secs = 2",
    ))]
    #[case::bad_rate("[demo]\nflaky_failure_rate = 1.5")]
    fn invalid_settings_are_rejected(#[case] content: &str) {
        assert!(matches!(
            Settings::from_toml_str(content),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(
            Settings::from_toml_str("[worker\nconcurrency = "),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("[worker]\nack_policy = \"sometimes\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Settings::load(Path::new("/nonexistent/conveyor.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
