//! Slack Web API calls used by the adapter.

use anyhow::{anyhow, bail, Context, Result};
use csbot_config::SlackConfig;
use csbot_ipc::ReplyContent;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 800;
/// Slack rejects section blocks with longer text.
const MAX_SECTION_CHARS: usize = 3000;

#[derive(Debug, Deserialize)]
struct OpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
}

impl SlackApiClient {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("cluster-support-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            app_token: config.app_token.trim().to_string(),
            bot_token: config.bot_token.trim().to_string(),
        })
    }

    /// Socket Mode websocket URL, valid for a single connection.
    pub async fn open_socket_connection(&self) -> Result<String> {
        let response: OpenSocketResponse = self
            .request_json(
                "apps.connections.open",
                self.http
                    .post(format!("{}/apps.connections.open", self.api_base))
                    .bearer_auth(&self.app_token),
            )
            .await?;
        if !response.ok {
            bail!(
                "slack apps.connections.open failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open did not return url"))
    }

    /// Posts `content` into the thread rooted at `thread_ts`; returns the new ts.
    pub async fn post_message(
        &self,
        channel: &str,
        thread_ts: &str,
        content: &ReplyContent,
    ) -> Result<String> {
        let payload = message_payload(channel, thread_ts, content);
        let response: PostMessageResponse = self
            .request_json(
                "chat.postMessage",
                self.http
                    .post(format!("{}/chat.postMessage", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload),
            )
            .await?;

        if !response.ok {
            bail!(
                "slack chat.postMessage failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        response
            .ts
            .ok_or_else(|| anyhow!("slack chat.postMessage response missing ts"))
    }

    async fn request_json<T>(&self, operation: &str, request: reqwest::RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .with_context(|| format!("slack api {operation} request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "slack api {operation} failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(&body, MAX_ERROR_BODY_CHARS)
            );
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode slack {operation}"))
    }
}

fn section_block(text: &str) -> Value {
    json!({
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": text,
        }
    })
}

/// Splits `text` into non-blank pieces of at most `max_chars` characters,
/// breaking between lines where possible.
fn section_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let joined_len = if current.is_empty() {
            line_len
        } else {
            current_len + 1 + line_len
        };
        if joined_len <= max_chars {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len = joined_len;
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        for piece in chars.chunks(max_chars) {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current = piece.iter().collect();
            current_len = piece.len();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks.retain(|chunk| !chunk.trim().is_empty());
    chunks
}

fn message_payload(channel: &str, thread_ts: &str, content: &ReplyContent) -> Value {
    let mut payload = json!({
        "channel": channel,
        "thread_ts": thread_ts,
        "text": content.plain_text(),
        "unfurl_links": false,
        "unfurl_media": false,
    });
    if let ReplyContent::Blocks(blocks) = content {
        let sections: Vec<Value> = blocks
            .iter()
            .flat_map(|block| section_chunks(block, MAX_SECTION_CHARS))
            .map(|chunk| section_block(&chunk))
            .collect();
        if !sections.is_empty() {
            payload["blocks"] = Value::Array(sections);
        }
    }
    payload
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let truncated: String = body.chars().take(max_chars).collect();
    format!("{}...", truncated)
}
