use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// What to do with a delivery whose scoring or publishing failed.
///
/// Malformed responses are always dropped regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Acknowledge and discard (at-most-once)
    Drop,
    /// Reject with requeue so the broker redelivers it
    Requeue,
}

/// Runtime configuration for the scoring agent.
///
/// Keys are flat so each maps to one environment variable of the same name
/// in upper case (`RABBITMQ_HOST`, `STATUS_PORT`, ...).
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,

    pub rabbitmq_host: String,
    pub rabbitmq_port: u16,
    pub rabbitmq_user: String,
    pub rabbitmq_pass: String,

    pub response_queue: String,
    pub reward_queue: String,

    pub connect_max_attempts: u32,
    pub connect_retry_delay_ms: u64,

    pub status_host: String,
    pub status_port: u16,

    pub failure_policy: FailurePolicy,
    pub exit_on_consumer_failure: bool,
    pub fixed_score: f64,
    pub log_json: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            agent_id: "scoring_agent_1".to_string(),
            rabbitmq_host: "rabbitmq".to_string(),
            rabbitmq_port: 5672,
            rabbitmq_user: "user".to_string(),
            rabbitmq_pass: "password".to_string(),
            response_queue: "response_queue".to_string(),
            reward_queue: "reward_queue".to_string(),
            connect_max_attempts: 10,
            connect_retry_delay_ms: 2000,
            status_host: "0.0.0.0".to_string(),
            status_port: 8000,
            failure_policy: FailurePolicy::Drop,
            exit_on_consumer_failure: false,
            fixed_score: 1.0,
            log_json: false,
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("agent_id", &self.agent_id)
            .field("rabbitmq_host", &self.rabbitmq_host)
            .field("rabbitmq_port", &self.rabbitmq_port)
            .field("rabbitmq_user", &self.rabbitmq_user)
            .field("rabbitmq_pass", &"***")
            .field("response_queue", &self.response_queue)
            .field("reward_queue", &self.reward_queue)
            .field("connect_max_attempts", &self.connect_max_attempts)
            .field("connect_retry_delay_ms", &self.connect_retry_delay_ms)
            .field("status_host", &self.status_host)
            .field("status_port", &self.status_port)
            .field("failure_policy", &self.failure_policy)
            .field("exit_on_consumer_failure", &self.exit_on_consumer_failure)
            .field("fixed_score", &self.fixed_score)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl AgentConfig {
    /// Load defaults, then the optional YAML file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_from(path, Environment::default())
    }

    /// Same layering as [`AgentConfig::load`] with an explicit environment source
    pub fn load_from(path: Option<&Path>, env: Environment) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AgentConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.add_source(env).build()?.try_deserialize()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn status_addr(&self) -> String {
        format!("{}:{}", self.status_host, self.status_port)
    }

    /// Consumer tag unique to this process: `<agent_id>-<hostname>-<pid>-<random>`
    pub fn consumer_tag(&self) -> String {
        use std::process;
        use uuid::Uuid;

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let random = Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}-{}", self.agent_id, hostname, pid, &random[..8])
    }
}
