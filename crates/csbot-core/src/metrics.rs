//! Prometheus counters and the HTTP endpoint that exposes them

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

const ID_LABEL: &str = "_id";

pub struct Metrics {
    registry: Registry,
    mentions: IntCounterVec,
    comments: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let mentions = IntCounterVec::new(
            Opts::new(
                "cluster_support_mentions",
                "Number of times a cluster is mentioned where the cluster-support bot is listening",
            ),
            &[ID_LABEL],
        )?;
        let comments = IntCounterVec::new(
            Opts::new(
                "cluster_support_comments",
                "Number of times a cluster has been commented via the cluster-support bot",
            ),
            &[ID_LABEL],
        )?;

        registry.register(Box::new(mentions.clone()))?;
        registry.register(Box::new(comments.clone()))?;

        Ok(Self {
            registry,
            mentions,
            comments,
        })
    }

    pub fn record_mention(&self, cluster: &str) {
        debug!(%cluster, "cluster mention");
        self.mentions.with_label_values(&[cluster]).inc();
    }

    pub fn record_comment(&self, cluster: &str) {
        self.comments.with_label_values(&[cluster]).inc();
    }

    pub fn mention_count(&self, cluster: &str) -> u64 {
        self.mentions.with_label_values(&[cluster]).get()
    }

    pub fn comment_count(&self, cluster: &str) -> u64 {
        self.comments.with_label_values(&[cluster]).get()
    }

    /// Text exposition format of every registered family.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics output is not utf-8")
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(|| async { "OK" }))
            .with_state(self)
    }

    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics listener on {}", addr))?;
        info!("Metrics server starting on http://{}/metrics", addr);
        axum::serve(listener, self.router())
            .await
            .context("metrics server stopped")
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                "Failed to encode metrics".to_string(),
            )
        }
    }
}
