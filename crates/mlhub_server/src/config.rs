//! Server configuration: load from YAML, fill defaults, validate.
//!
//! Every field except `evaluate.endpoint` has a default, so a minimal file is:
//!
//! ```yaml
//! evaluate:
//!   endpoint: http://evaluate-backend:8080/api/v1/evaluate
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use mlhub_core::{MlHubError, Topic};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attempts per event, the last one flagged as last chance.
    pub max_retry: u32,
    pub retry_interval_ms: u64,
    pub finetune_retry_interval_ms: u64,
    pub http: HttpConfig,
    pub evaluate: EvaluateConfig,
    pub topics: TopicsConfig,
    pub broker: BrokerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retry: 3,
            retry_interval_ms: 100,
            finetune_retry_interval_ms: 10_000,
            http: HttpConfig::default(),
            evaluate: EvaluateConfig::default(),
            topics: TopicsConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    /// Grace period for in-flight requests and consumers on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".into(),
            shutdown_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluateConfig {
    /// Seconds an instance must still have left to be handed to a new caller.
    pub min_survival_time: i64,
    /// Seconds a provisioned instance lives.
    pub survival_time: i64,
    /// Provisioning backend URL.
    pub endpoint: String,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            min_survival_time: 1_800,
            survival_time: 7_200,
            endpoint: String::new(),
        }
    }
}

/// Broker topic names per event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub like: String,
    pub download: String,
    pub fork: String,
    pub related_resource: String,
    pub finetune: String,
    pub inference: String,
    pub inference_extend: String,
    pub evaluate: String,
    pub cloud: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            like: "like".into(),
            download: "download".into(),
            fork: "fork".into(),
            related_resource: "related_resource".into(),
            finetune: "finetune".into(),
            inference: "inference".into(),
            inference_extend: "inference_extend".into(),
            evaluate: "evaluate".into(),
            cloud: "cloud".into(),
        }
    }
}

impl TopicsConfig {
    pub fn name(&self, topic: Topic) -> &str {
        match topic {
            Topic::Like => &self.like,
            Topic::Download => &self.download,
            Topic::Fork => &self.fork,
            Topic::RelatedResource => &self.related_resource,
            Topic::Finetune => &self.finetune,
            Topic::Inference => &self.inference,
            Topic::InferenceExtend => &self.inference_extend,
            Topic::Evaluate => &self.evaluate,
            Topic::Cloud => &self.cloud,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Capacity of each topic queue.
    pub buffer_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { buffer_size: 1024 }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Parsing {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> std::result::Result<(), MlHubError> {
        let invalid = |msg: String| Err(MlHubError::Configuration(msg));

        if self.max_retry == 0 {
            return invalid("max_retry must be at least 1".into());
        }
        if self.evaluate.survival_time <= 0 {
            return invalid("evaluate.survival_time must be positive".into());
        }
        if self.evaluate.min_survival_time < 0 {
            return invalid("evaluate.min_survival_time must not be negative".into());
        }
        if self.evaluate.min_survival_time > self.evaluate.survival_time {
            return invalid(format!(
                "evaluate.min_survival_time {} exceeds survival_time {}",
                self.evaluate.min_survival_time, self.evaluate.survival_time
            ));
        }
        if self.evaluate.endpoint.is_empty() {
            return invalid("evaluate.endpoint is required".into());
        }
        if self.broker.buffer_size == 0 {
            return invalid("broker.buffer_size must be positive".into());
        }

        let mut seen = HashSet::new();
        for topic in Topic::ALL {
            let name = self.topics.name(topic);
            if name.is_empty() {
                return invalid(format!("topics.{topic} is empty"));
            }
            if !seen.insert(name) {
                return invalid(format!("topic name {name} is used twice"));
            }
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn finetune_retry_interval(&self) -> Duration {
        Duration::from_millis(self.finetune_retry_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.http.shutdown_timeout_secs)
    }
}
