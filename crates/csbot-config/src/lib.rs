//! Cluster Support Bot Configuration
//!
//! TOML configuration loading with environment variable support

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

pub const DEFAULT_DEDUP_HORIZON_SECS: u64 = 60 * 60;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_METRICS_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_HYDRA_BASE_URL: &str = "https://access.redhat.com/hydra/rest";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub hydra: HydraConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub dashboards: DashboardsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_dedup_horizon_secs")]
    pub dedup_horizon_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            log_dir: None,
            max_concurrency: default_max_concurrency(),
            dedup_horizon_secs: default_dedup_horizon_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Slack user ID of the bot, used to build the `<@ID> ` mention prefix.
    #[serde(default)]
    pub bot_id: String,
    #[serde(default)]
    pub bot_token: String,
    /// App-level token (`xapp-...`) for Socket Mode.
    #[serde(default)]
    pub app_token: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_id: String::new(),
            bot_token: String::new(),
            app_token: String::new(),
            api_base: default_slack_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl SlackConfig {
    pub fn mention_prefix(&self) -> String {
        format!("<@{}> ", self.bot_id.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydraConfig {
    #[serde(default = "default_hydra_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HydraConfig {
    fn default() -> Self {
        Self {
            base_url: default_hydra_base_url(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub base_url: String,
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_metrics_listen(),
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid metrics listen address '{}': {}", self.listen, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DashboardsConfig {
    #[serde(default)]
    pub bases: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_dedup_horizon_secs() -> u64 {
    DEFAULT_DEDUP_HORIZON_SECS
}

fn default_slack_api_base() -> String {
    DEFAULT_SLACK_API_BASE.to_string()
}

fn default_hydra_base_url() -> String {
    DEFAULT_HYDRA_BASE_URL.to_string()
}

fn default_metrics_listen() -> String {
    DEFAULT_METRICS_LISTEN.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

/// Splits a space separated list the way the `DASHBOARDS` variable is written.
pub fn split_dashboard_bases(raw: &str) -> Vec<String> {
    raw.split(' ')
        .filter(|base| !base.is_empty())
        .map(|base| base.to_string())
        .collect()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration purely from the environment, for deployments
    /// that ship no config file.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|dir| dir.join("csbot").join("config.toml"))
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Environment values win over the file.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("BOT_ID") {
            self.slack.bot_id = value;
        }
        if let Some(value) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = value;
        }
        if let Some(value) = get("SLACK_APP_TOKEN") {
            self.slack.app_token = value;
        }
        if let Some(value) = get("HYDRA_USER") {
            self.hydra.username = value;
        }
        if let Some(value) = get("HYDRA_PASSWORD") {
            self.hydra.password = value;
        }
        if let Some(value) = get("TELEMETRY_URL") {
            self.telemetry.base_url = value;
        }
        if let Some(value) = get("TELEMETRY_TOKEN") {
            self.telemetry.token = Some(value);
        }
        if let Some(value) = get("DASHBOARDS") {
            self.dashboards.bases = split_dashboard_bases(&value);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.slack.bot_id.trim().is_empty() {
            anyhow::bail!("slack.bot_id is required (or set BOT_ID)");
        }
        if self.slack.bot_id.chars().any(char::is_whitespace) {
            anyhow::bail!("slack.bot_id cannot contain whitespace");
        }
        if self.slack.bot_token.trim().is_empty() {
            anyhow::bail!("slack.bot_token is required (or set SLACK_BOT_TOKEN)");
        }
        if self.slack.app_token.trim().is_empty() {
            anyhow::bail!("slack.app_token is required (or set SLACK_APP_TOKEN)");
        }
        if self.slack.api_base.trim().is_empty() {
            anyhow::bail!("slack.api_base cannot be empty");
        }
        if self.hydra.base_url.trim().is_empty() {
            anyhow::bail!("hydra.base_url cannot be empty");
        }
        if self.hydra.username.trim().is_empty() {
            anyhow::bail!("hydra.username is required (or set HYDRA_USER)");
        }
        if self.telemetry.base_url.trim().is_empty() {
            anyhow::bail!("telemetry.base_url is required (or set TELEMETRY_URL)");
        }
        if self.core.max_concurrency == 0 {
            anyhow::bail!("core.max_concurrency must be at least 1");
        }
        if self.core.dedup_horizon_secs == 0 {
            anyhow::bail!("core.dedup_horizon_secs must be at least 1");
        }
        if self.metrics.enabled {
            self.metrics.listen_addr()?;
        }
        for base in &self.dashboards.bases {
            if base.trim().is_empty() {
                anyhow::bail!("dashboards.bases cannot contain empty entries");
            }
        }
        Ok(())
    }
}
