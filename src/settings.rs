use crate::retry::RetryConfig;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;
use std::time::Duration;

/// Backoff while waiting for the controller
#[derive(Debug, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl PollSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Message(format!(
                "poll.backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Message(format!(
                "poll.initial_delay_ms ({}) is larger than poll.max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Namespace the buckets are created in
    pub namespace: String,
    /// Path to a kubeconfig, `KUBECONFIG` or `~/.kube/config` when unset
    pub kubeconfig: Option<String>,
    #[serde(default = "default_field_manager")]
    pub field_manager: String,
    #[serde(default)]
    pub poll: PollSettings,
}

fn default_field_manager() -> String {
    crate::store::FIELD_MANAGER.to_string()
}

impl Settings {
    /// Load settings, `namespace` overrides whatever the sources say.
    pub fn new(namespace: Option<String>) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(File::with_name("/etc/acme-provider/settings").required(false))
            .add_source(
                Environment::with_prefix("ACME")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder, namespace)
    }

    fn from_builder(
        builder: ConfigBuilder<DefaultState>,
        namespace: Option<String>,
    ) -> Result<Self, ConfigError> {
        let settings: Settings = builder
            .set_override_option("namespace", namespace)?
            .build()?
            .try_deserialize()?;
        settings.poll.validate()?;
        Ok(settings)
    }
}
