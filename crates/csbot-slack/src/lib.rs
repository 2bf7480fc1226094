//! Cluster Support Bot Slack Adapter
//!
//! Receives channel messages over Socket Mode and posts threaded replies
//! through the Web API.

mod api;

pub use api::SlackApiClient;

use anyhow::{Context, Result};
use csbot_config::SlackConfig;
use csbot_ipc::{EventBus, InboundEvent, OutboundMessage};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Deserialize)]
struct SocketEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct EventCallback {
    #[serde(rename = "type")]
    callback_type: String,
    event: MessagePayload,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

pub struct SlackAdapter {
    api: SlackApiClient,
    reconnect_delay: Duration,
    event_bus: Option<EventBus>,
}

impl SlackAdapter {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        Ok(Self {
            api: SlackApiClient::new(config)?,
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs.max(1)),
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Socket Mode loop; reconnects after every session end or failure.
    pub async fn poll(&self) -> Result<()> {
        info!("Slack adapter starting Socket Mode");

        loop {
            match self.api.open_socket_connection().await {
                Ok(url) => {
                    info!("Slack socket connected");
                    if let Err(e) = self.run_socket_session(&url).await {
                        warn!("Slack socket session ended with error: {:#}", e);
                    } else {
                        info!("Slack socket session closed");
                    }
                }
                Err(e) => error!("Failed to open Slack socket connection: {:#}", e),
            }

            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn run_socket_session(&self, socket_url: &str) -> Result<()> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        while let Some(message) = source.next().await {
            let message = message.context("failed reading slack websocket message")?;
            let Some(envelope) = parse_socket_envelope(message)? else {
                continue;
            };

            if let Some(envelope_id) = &envelope.envelope_id {
                let ack = json!({ "envelope_id": envelope_id }).to_string();
                sink.send(WsMessage::Text(ack.into()))
                    .await
                    .context("failed to send slack socket ack")?;
            }

            if envelope.envelope_type == "disconnect" {
                info!("Slack requested socket refresh");
                return Ok(());
            }

            match event_from_envelope(&envelope) {
                Ok(Some(event)) => self.publish(event),
                Ok(None) => {}
                Err(e) => warn!("Skipping malformed Slack event: {:#}", e),
            }
        }
        Ok(())
    }

    fn publish(&self, event: InboundEvent) {
        let Some(event_bus) = &self.event_bus else {
            return;
        };
        debug!(
            "Slack message in {} ts={} (trace_id={})",
            event.channel, event.ts, event.trace_id
        );
        if let Err(e) = event_bus.publish(event) {
            warn!("Failed to publish Slack event: {}", e);
        }
    }

    pub async fn run_outbound_handler(&self, mut receiver: broadcast::Receiver<OutboundMessage>) {
        info!("Slack outbound handler started");

        loop {
            match receiver.recv().await {
                Ok(msg) => {
                    if let Err(e) = self
                        .api
                        .post_message(&msg.channel, &msg.thread_ts, &msg.content)
                        .await
                    {
                        warn!(
                            "Failed to post reply (trace_id={}): {:#}",
                            msg.trace_id, e
                        );
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Slack outbound handler stopped: channel closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Slack outbound handler lagged, skipped {} messages",
                        skipped
                    );
                }
            }
        }
    }
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SocketEnvelope>> {
    let text = match message {
        WsMessage::Text(text) => text.to_string(),
        WsMessage::Binary(bytes) => {
            String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            return Ok(None)
        }
    };
    let envelope = serde_json::from_str::<SocketEnvelope>(&text)
        .context("failed to parse slack socket envelope")?;
    Ok(Some(envelope))
}

/// Channel message carried by an `events_api` envelope, if any.
///
/// Subtyped messages are still forwarded; the bot decides to ignore them.
fn event_from_envelope(envelope: &SocketEnvelope) -> Result<Option<InboundEvent>> {
    if envelope.envelope_type != "events_api" {
        return Ok(None);
    }

    let callback = serde_json::from_value::<EventCallback>(envelope.payload.clone())
        .context("failed to decode slack event callback payload")?;
    if callback.callback_type != "event_callback" || callback.event.event_type != "message" {
        return Ok(None);
    }

    let payload = callback.event;
    let (Some(channel), Some(ts)) = (payload.channel, payload.ts) else {
        return Ok(None);
    };

    let mut event = InboundEvent::new(&channel, &ts, payload.text.as_deref().unwrap_or_default())
        .with_raw(envelope.payload.clone());
    if let Some(thread_ts) = payload.thread_ts.as_deref() {
        event = event.with_thread_ts(thread_ts);
    }
    if let Some(subtype) = payload.subtype.as_deref() {
        event = event.with_subtype(subtype);
    }
    Ok(Some(event))
}
