use std::{num::NonZeroU32, time::Duration};

use url::Url;

use crate::upgrade::convergence::UpgradePolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),
    #[error("Invalid Rancher host: {0}")]
    InvalidHost(#[from] url::ParseError),
}

/// Contents of the config file. Every value may also come from the
/// environment, which takes precedence.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RedeployConfigFile {
    rancher: RancherSection,
    webhook: WebhookSection,
    upgrade: UpgradeSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RancherSection {
    host: Option<String>,
    project_id: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct WebhookSection {
    key: Option<String>,
}

/// Delays are in seconds.
#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct UpgradeSection {
    settle_delay: u64,
    retry_delay: u64,
    max_attempts: NonZeroU32,
    final_delay: u64,
    bootstrap_delay: u64,
}

impl Default for UpgradeSection {
    fn default() -> Self {
        let policy = UpgradePolicy::default();
        UpgradeSection {
            settle_delay: policy.settle_delay.as_secs(),
            retry_delay: policy.retry_delay.as_secs(),
            max_attempts: NonZeroU32::new(policy.max_attempts).unwrap_or(NonZeroU32::MIN),
            final_delay: policy.final_delay.as_secs(),
            bootstrap_delay: DEFAULT_BOOTSTRAP_DELAY,
        }
    }
}

const DEFAULT_BOOTSTRAP_DELAY: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RancherConfig {
    pub host: Url,
    pub project_id: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeployConfig {
    pub rancher: RancherConfig,
    /// Secret path segment Docker Hub has to call.
    pub webhook_key: String,
    pub policy: UpgradePolicy,
    /// Wait before the first directory load.
    pub bootstrap_delay: Duration,
}

fn required(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    file_value: Option<String>,
) -> Result<String, ConfigError> {
    let non_empty = |value: &String| !value.is_empty();
    env(var)
        .filter(non_empty)
        .or(file_value.filter(non_empty))
        .ok_or(ConfigError::Missing(var))
}

impl RedeployConfig {
    fn try_init_from_string(
        config: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file: RedeployConfigFile = toml::from_str(config)?;

        let host = required(&env, "RANCHER_HOST", file.rancher.host)?;
        let rancher = RancherConfig {
            host: Url::parse(&host)?,
            project_id: required(&env, "RANCHER_PROJECT_ID", file.rancher.project_id)?,
            api_key: required(&env, "RANCHER_API_KEY", file.rancher.api_key)?,
            api_secret: required(&env, "RANCHER_API_SECRET", file.rancher.api_secret)?,
        };
        let webhook_key = required(&env, "DOCKER_HUB_KEY", file.webhook.key)?;

        let upgrade = file.upgrade;
        let policy = UpgradePolicy {
            settle_delay: Duration::from_secs(upgrade.settle_delay),
            retry_delay: Duration::from_secs(upgrade.retry_delay),
            max_attempts: upgrade.max_attempts.get(),
            final_delay: Duration::from_secs(upgrade.final_delay),
        };

        Ok(RedeployConfig {
            rancher,
            webhook_key,
            policy,
            bootstrap_delay: Duration::from_secs(upgrade.bootstrap_delay),
        })
    }

    /// Read the config file named on the command line, if it exists, and
    /// complete it from the environment.
    pub fn try_init() -> Result<Self, ConfigError> {
        let path = &crate::cli::get_cli_args().config;
        let config = match std::fs::read_to_string(path) {
            Ok(config) => config,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config file at {path:?}, using the environment only");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        Self::try_init_from_string(&config, |var| std::env::var(var).ok())
    }
}
