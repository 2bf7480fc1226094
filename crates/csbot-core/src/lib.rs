//! Cluster Support Bot Core
//!
//! Event intake, deduplication, command dispatch and the runtime that wires
//! them to Slack, Hydra, telemetry and the metrics endpoint.

mod cases;
mod command;
mod dedup;
mod dispatch;
mod error;
mod identity;
mod metrics;
mod summary;
#[cfg(test)]
mod testing;

pub use cases::{case_line, relevant_cases};
pub use command::{
    help_text, parse_command, Command, HelpScope, ParseError, ParseOutcome, Subcommand,
};
pub use dedup::DedupWindow;
pub use dispatch::Dispatcher;
pub use error::BotError;
pub use identity::{find_cluster_id, observe_mention};
pub use metrics::Metrics;
pub use summary::{
    entitlements_line, scan_notes, split_subject, summary_subject_prefix, ClusterSummary,
    SummaryEngine, WrittenNote, SUMMARY_FOOTER,
};

use anyhow::Result;
use csbot_config::Config;
use csbot_hydra::HydraClient;
use csbot_ipc::{EventBus, InboundEvent, OutboundMessage};
use csbot_slack::SlackAdapter;
use csbot_telemetry::TelemetryClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Per-event pipeline: mention metrics, addressing, dedup, parse, dispatch.
pub struct SupportBot {
    mention_prefix: String,
    dedup: DedupWindow,
    metrics: Arc<Metrics>,
    dispatcher: Dispatcher,
}

impl SupportBot {
    pub fn new(
        mention_prefix: String,
        dedup: DedupWindow,
        metrics: Arc<Metrics>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            mention_prefix,
            dedup,
            metrics,
            dispatcher,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Handles one inbound message; `None` means nothing is posted.
    pub async fn handle_event(&self, event: &InboundEvent) -> Option<OutboundMessage> {
        if !event.is_plain_message() {
            debug!(
                "Ignoring message subtype {:?} (trace_id={})",
                event.subtype, event.trace_id
            );
            return None;
        }
        if event.text.is_empty() {
            return None;
        }

        observe_mention(&event.text, &self.metrics);

        if !event.text.starts_with(&self.mention_prefix) {
            return None;
        }

        if !self.dedup.admit(event.timestamp()) {
            info!(
                "Dropping duplicate delivery of ts={} (trace_id={})",
                event.ts, event.trace_id
            );
            return None;
        }

        let outcome = parse_command(&event.text);
        self.dispatcher.dispatch(event, outcome).await
    }
}

pub struct SupportRuntime {
    config: Config,
    bot: Arc<SupportBot>,
    event_bus: EventBus,
}

impl SupportRuntime {
    pub fn new(config: Config) -> Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let backend = Arc::new(HydraClient::new(&config.hydra)?);
        let telemetry = Arc::new(TelemetryClient::new(&config.telemetry)?);

        let engine = SummaryEngine::new(
            backend,
            telemetry,
            Arc::clone(&metrics),
            config.dashboards.bases.clone(),
        );
        let bot = SupportBot::new(
            config.slack.mention_prefix(),
            DedupWindow::new(Duration::from_secs(config.core.dedup_horizon_secs)),
            metrics,
            Dispatcher::new(engine),
        );

        Ok(Self {
            config,
            bot: Arc::new(bot),
            event_bus: EventBus::new(),
        })
    }

    pub async fn run(&self) -> Result<()> {
        info!("Cluster support bot starting...");

        self.start_metrics_server()?;
        self.start_slack_adapter()?;
        self.start_processor();

        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = heartbeat.tick() => debug!("Cluster support bot heartbeat"),
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown requested, stopping");
                    return Ok(());
                }
            }
        }
    }

    fn start_metrics_server(&self) -> Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics endpoint disabled");
            return Ok(());
        }

        let addr = self.config.metrics.listen_addr()?;
        let metrics = Arc::clone(self.bot.metrics());
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(addr).await {
                error!("Metrics server failed: {:#}", e);
            }
        });
        Ok(())
    }

    fn start_slack_adapter(&self) -> Result<()> {
        let adapter =
            SlackAdapter::new(&self.config.slack)?.with_event_bus(self.event_bus.clone());
        let adapter_for_outbound = SlackAdapter::new(&self.config.slack)?;
        let outbound_rx = self.event_bus.outbound_subscribe();

        tokio::spawn(async move {
            adapter_for_outbound.run_outbound_handler(outbound_rx).await;
        });
        tokio::spawn(async move {
            if let Err(e) = adapter.poll().await {
                error!("Slack adapter failed: {:#}", e);
            }
        });
        Ok(())
    }

    fn start_processor(&self) {
        let mut inbound_rx = self.event_bus.subscribe();
        let outbound = self.event_bus.outbound_sender();
        let bot = Arc::clone(&self.bot);
        let semaphore = Arc::new(Semaphore::new(self.config.core.max_concurrency));

        tokio::spawn(async move {
            loop {
                match inbound_rx.recv().await {
                    Ok(event) => {
                        let bot = Arc::clone(&bot);
                        let outbound = outbound.clone();
                        let semaphore = Arc::clone(&semaphore);

                        tokio::spawn(async move {
                            let _permit = match semaphore.acquire_owned().await {
                                Ok(permit) => permit,
                                Err(err) => {
                                    error!(
                                        "Inbound worker semaphore closed (trace_id={}): {}",
                                        event.trace_id, err
                                    );
                                    return;
                                }
                            };

                            if let Some(reply) = bot.handle_event(&event).await {
                                if outbound.send(reply).is_err() {
                                    warn!(
                                        "No outbound handler for reply (trace_id={})",
                                        event.trace_id
                                    );
                                }
                            }
                        });
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Event bus closed, stopping message processor");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event bus lagged by {} messages", n);
                    }
                }
            }
        });
    }
}
