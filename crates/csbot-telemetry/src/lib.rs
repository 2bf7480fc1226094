//! Cluster Support Bot Telemetry Client
//!
//! Resolves a cluster ID to its subscription labels (owning account, support
//! tier, managed flag) through a Prometheus-compatible query API

use anyhow::anyhow;
use csbot_config::TelemetryConfig;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const EBS_ACCOUNT_LABEL: &str = "ebs_account";
pub const MANAGED_LABEL: &str = "managed";
pub const SUPPORT_LABEL: &str = "support";

const SUBSCRIPTION_METRIC: &str = "subscription_labels";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("not found in telemetry")]
    NotFound,
    #[error("has no {0} in telemetry")]
    MissingLabel(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub type TelemetryResult<T> = std::result::Result<T, TelemetryError>;

/// Requested labels of the cluster's subscription series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    labels: BTreeMap<String, String>,
}

impl Subscription {
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }

    pub fn ebs_account(&self) -> TelemetryResult<&str> {
        self.get(EBS_ACCOUNT_LABEL)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| TelemetryError::MissingLabel(EBS_ACCOUNT_LABEL.to_string()))
    }
}

#[async_trait::async_trait]
pub trait Telemetry: Send + Sync {
    async fn subscription(&self, cluster: &str, labels: &[&str]) -> TelemetryResult<Subscription>;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QuerySeries>,
}

#[derive(Debug, Deserialize)]
struct QuerySeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
}

pub struct TelemetryClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl TelemetryClient {
    pub fn new(config: &TelemetryConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("failed to build telemetry HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            token: config
                .token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
    }

    fn subscription_query(cluster: &str) -> String {
        let escaped = cluster.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{}{{_id=\"{}\"}}", SUBSCRIPTION_METRIC, escaped)
    }

    fn select_labels(series: QuerySeries, labels: &[&str]) -> Subscription {
        Subscription {
            labels: series
                .metric
                .into_iter()
                .filter(|(name, _)| labels.contains(&name.as_str()))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl Telemetry for TelemetryClient {
    async fn subscription(&self, cluster: &str, labels: &[&str]) -> TelemetryResult<Subscription> {
        let url = format!("{}/api/v1/query", self.base_url);
        let query = Self::subscription_query(cluster);
        debug!(%cluster, %query, "telemetry subscription lookup");

        let mut request = self.client.get(&url).query(&[("query", query.as_str())]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("telemetry query request failed: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow!("telemetry query HTTP error: {}", e))?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("telemetry query decode failed: {}", e))?;

        if parsed.status != "success" {
            return Err(TelemetryError::Transport(anyhow!(
                "telemetry query returned status={}: {}",
                parsed.status,
                parsed.error.unwrap_or_default()
            )));
        }

        let series = parsed
            .data
            .and_then(|data| data.result.into_iter().next())
            .ok_or(TelemetryError::NotFound)?;

        Ok(Self::select_labels(series, labels))
    }
}
