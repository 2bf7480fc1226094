//! Cluster Support Bot IPC
//!
//! Event bus between the chat adapter and the command core

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

static NEXT_TRACE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn generate_trace_id() -> String {
    let ts = now_unix_secs();
    let n = NEXT_TRACE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("trace-{}-{}", ts, n)
}

fn default_schema_version() -> u16 {
    1
}

fn default_trace_id() -> String {
    generate_trace_id()
}

fn default_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One chat message as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    #[serde(default = "default_trace_id")]
    pub trace_id: String,
    #[serde(default = "default_event_id")]
    pub id: String,
    pub channel: String,
    /// Slack message timestamp, e.g. `1712345678.123456`.
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl InboundEvent {
    pub fn new(channel: &str, ts: &str, text: &str) -> Self {
        Self {
            schema_version: default_schema_version(),
            trace_id: generate_trace_id(),
            id: default_event_id(),
            channel: channel.to_string(),
            ts: ts.to_string(),
            thread_ts: None,
            text: text.to_string(),
            subtype: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_thread_ts(mut self, thread_ts: &str) -> Self {
        self.thread_ts = Some(thread_ts.to_string());
        self
    }

    pub fn with_subtype(mut self, subtype: &str) -> Self {
        self.subtype = Some(subtype.to_string());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    /// Sub-second timestamp in seconds; an unparsable `ts` reads as zero.
    pub fn timestamp(&self) -> f64 {
        self.ts.trim().parse::<f64>().unwrap_or(0.0)
    }

    /// Thread the reply belongs in: the parent thread, or the message itself.
    pub fn reply_thread(&self) -> &str {
        self.thread_ts
            .as_deref()
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.ts)
    }

    /// Messages carrying any subtype (edits, joins, bot posts...) are not user messages.
    pub fn is_plain_message(&self) -> bool {
        self.subtype.is_none()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ReplyContent {
    Text(String),
    /// Ordered plain-text sections, one block each.
    Blocks(Vec<String>),
}

impl ReplyContent {
    /// Flattened text, used as the notification fallback for block posts.
    pub fn plain_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks.join("\n"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub trace_id: String,
    pub channel: String,
    pub thread_ts: String,
    pub content: ReplyContent,
}

impl OutboundMessage {
    pub fn reply_to(event: &InboundEvent, content: ReplyContent) -> Self {
        Self {
            trace_id: event.trace_id.clone(),
            channel: event.channel.clone(),
            thread_ts: event.reply_thread().to_string(),
            content,
        }
    }
}

pub const EVENT_BUS_CAPACITY: usize = 256;
pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    inbound: broadcast::Sender<InboundEvent>,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (inbound_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);

        Self {
            inbound: inbound_tx,
            outbound: outbound_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.inbound.subscribe()
    }

    pub fn publish(&self, event: InboundEvent) -> anyhow::Result<()> {
        self.inbound.send(event)?;
        Ok(())
    }

    pub fn outbound_sender(&self) -> broadcast::Sender<OutboundMessage> {
        self.outbound.clone()
    }

    pub fn outbound_subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
