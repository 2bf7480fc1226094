//! Cluster Support Bot Hydra Client
//!
//! Customer-account backend: account notes, open cases, case comments and
//! entitlements, behind the [`Backend`] trait

use anyhow::anyhow;
use csbot_config::HydraConfig;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum HydraError {
    /// The backend understood the request and refused it.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub type HydraResult<T> = std::result::Result<T, HydraError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "isRetired", default)]
    pub retired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseOwner {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    #[serde(rename = "caseNumber")]
    pub number: String,
    #[serde(rename = "createdDate", default)]
    pub created_date: String,
    #[serde(rename = "caseOwner", default = "unknown_owner")]
    pub owner: CaseOwner,
    #[serde(default)]
    pub subject: String,
}

fn unknown_owner() -> CaseOwner {
    CaseOwner {
        name: "unknown".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseComment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "createdBy", default)]
    pub created_by: Option<String>,
    #[serde(rename = "commentBody", alias = "body", default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "supportLevel", default)]
    pub support_level: String,
}

#[derive(Debug, Serialize)]
struct NewNote<'a> {
    subject: &'a str,
    body: &'a str,
}

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn account_notes(&self, account: &str) -> HydraResult<Vec<Note>>;
    async fn create_note(&self, account: &str, subject: &str, body: &str) -> HydraResult<()>;
    async fn delete_note(&self, account: &str, note_id: &str) -> HydraResult<()>;
    async fn open_cases(&self, account: &str) -> HydraResult<Vec<Case>>;
    async fn case_comments(&self, case_number: &str) -> HydraResult<Vec<CaseComment>>;
    async fn entitlements(&self, account: &str) -> HydraResult<Vec<Entitlement>>;
}

pub struct HydraClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HydraClient {
    pub fn new(config: &HydraConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("failed to build hydra HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn truncate_for_error(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            let truncated: String = text.chars().take(max_chars).collect();
            format!("{}...", truncated)
        }
    }

    /// Pulls a human readable reason out of an error body, if it is JSON.
    fn rejection_detail(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| Self::truncate_for_error(body.trim(), 300))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        json_body: Option<serde_json::Value>,
    ) -> HydraResult<String> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%method, %url, "hydra request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json");
        if let Some(body) = json_body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("hydra {} {} request failed: {}", method, path, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("hydra {} {} body read failed: {}", method, path, e))?;

        if status.is_success() {
            return Ok(body);
        }

        if status.is_client_error() {
            let detail = Self::rejection_detail(&body);
            return Err(HydraError::Rejected(if status == StatusCode::NOT_FOUND {
                format!("not found in Hydra ({}): {}", path, detail)
            } else {
                format!("rejected by Hydra ({}): {}", status, detail)
            }));
        }

        Err(HydraError::Transport(anyhow!(
            "hydra {} {} HTTP {}: {}",
            method,
            path,
            status,
            Self::truncate_for_error(&body, 600)
        )))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> HydraResult<T> {
        let body = self.send(Method::GET, path, None).await?;
        serde_json::from_str(&body).map_err(|e| {
            HydraError::Transport(anyhow!(
                "hydra GET {} decode failed: {} | body={}",
                path,
                e,
                Self::truncate_for_error(&body, 600)
            ))
        })
    }
}

#[async_trait::async_trait]
impl Backend for HydraClient {
    async fn account_notes(&self, account: &str) -> HydraResult<Vec<Note>> {
        self.get_json(&format!("accounts/{}/notes", account)).await
    }

    async fn create_note(&self, account: &str, subject: &str, body: &str) -> HydraResult<()> {
        let payload = serde_json::to_value(NewNote { subject, body })
            .map_err(|e| anyhow!("hydra note encode failed: {}", e))?;
        self.send(
            Method::POST,
            &format!("accounts/{}/notes", account),
            Some(payload),
        )
        .await?;
        Ok(())
    }

    async fn delete_note(&self, account: &str, note_id: &str) -> HydraResult<()> {
        self.send(
            Method::DELETE,
            &format!("accounts/{}/notes/{}", account, note_id),
            None,
        )
        .await?;
        Ok(())
    }

    async fn open_cases(&self, account: &str) -> HydraResult<Vec<Case>> {
        self.get_json(&format!("accounts/{}/cases?status=open", account))
            .await
    }

    async fn case_comments(&self, case_number: &str) -> HydraResult<Vec<CaseComment>> {
        self.get_json(&format!("cases/{}/comments", case_number))
            .await
    }

    async fn entitlements(&self, account: &str) -> HydraResult<Vec<Entitlement>> {
        self.get_json(&format!("accounts/{}/entitlements", account))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> HydraClient {
        let config = HydraConfig {
            base_url: format!("{}/", server.base_url()),
            username: "svc".to_string(),
            password: "secret".to_string(),
            request_timeout_secs: 5,
        };
        HydraClient::new(&config).expect("client")
    }

    #[test]
    fn note_decodes_retired_flag() {
        let note: Note = serde_json::from_value(json!({
            "id": "n1",
            "subject": "Summary (cluster abc): hi",
            "body": "b",
            "isRetired": true
        }))
        .expect("decode");
        assert!(note.retired);

        let note: Note = serde_json::from_value(json!({"id": "n2"})).expect("decode");
        assert!(!note.retired);
        assert!(note.subject.is_empty());
    }

    #[test]
    fn case_decodes_owner_name() {
        let case: Case = serde_json::from_value(json!({
            "caseNumber": "0123",
            "createdDate": "2020-01-02",
            "caseOwner": {"name": "Jordan"},
            "subject": "cluster down"
        }))
        .expect("decode");
        assert_eq!(case.owner.name, "Jordan");
        assert_eq!(case.number, "0123");
    }

    #[test]
    fn rejection_detail_prefers_json_message() {
        assert_eq!(
            HydraClient::rejection_detail(r#"{"message":"no such account"}"#),
            "no such account"
        );
        assert_eq!(HydraClient::rejection_detail("plain text\n"), "plain text");
    }

    #[tokio::test]
    async fn account_notes_uses_basic_auth_and_decodes() {
        let server = MockServer::start_async().await;
        let notes = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/accounts/42/notes")
                    .header("authorization", "Basic c3ZjOnNlY3JldA==");
                then.status(200).json_body(json!([
                    {"id": "n1", "subject": "s", "body": "b", "isRetired": false}
                ]));
            })
            .await;

        let client = client_for(&server);
        let result = client.account_notes("42").await.expect("notes");
        notes.assert_async().await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "n1");
    }

    #[tokio::test]
    async fn create_note_posts_subject_and_body() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/accounts/42/notes")
                    .json_body(json!({"subject": "S", "body": "B"}));
                then.status(201).body("");
            })
            .await;

        let client = client_for(&server);
        client.create_note("42", "S", "B").await.expect("create");
        create.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_become_rejections() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/accounts/42/notes/n1");
                then.status(403).json_body(json!({"message": "not allowed"}));
            })
            .await;

        let client = client_for(&server);
        let err = client.delete_note("42", "n1").await.expect_err("rejected");
        match err {
            HydraError::Rejected(message) => assert!(message.contains("not allowed")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_transport_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/cases/0123/comments");
                then.status(502).body("bad gateway");
            })
            .await;

        let client = client_for(&server);
        let err = client.case_comments("0123").await.expect_err("failed");
        assert!(matches!(err, HydraError::Transport(_)));
    }

    #[tokio::test]
    async fn undecodable_body_is_transport_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts/42/entitlements");
                then.status(200).body("<html>");
            })
            .await;

        let client = client_for(&server);
        let err = client.entitlements("42").await.expect_err("failed");
        assert!(matches!(err, HydraError::Transport(_)));
    }
}
