//! In-memory collaborators for unit tests

use anyhow::anyhow;
use csbot_hydra::{Backend, Case, CaseComment, Entitlement, HydraError, HydraResult, Note};
use csbot_telemetry::{Subscription, Telemetry, TelemetryError, TelemetryResult};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct BackendState {
    notes: HashMap<String, Vec<Note>>,
    next_note_id: u64,
    cases: HashMap<String, Vec<Case>>,
    comments: HashMap<String, Vec<CaseComment>>,
    failing_comments: HashSet<String>,
    entitlements: HashMap<String, Vec<Entitlement>>,
    fail_create: bool,
    fail_delete: bool,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

impl FakeBackend {
    fn state(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().expect("fake backend lock")
    }

    pub fn add_note(&self, account: &str, id: &str, subject: &str, body: &str, retired: bool) {
        self.state()
            .notes
            .entry(account.to_string())
            .or_default()
            .push(Note {
                id: id.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
                retired,
            });
    }

    pub fn notes(&self, account: &str) -> Vec<Note> {
        self.state().notes.get(account).cloned().unwrap_or_default()
    }

    pub fn add_case(&self, account: &str, case: Case, comments: &[&str]) {
        let comments = comments
            .iter()
            .map(|body| CaseComment {
                id: None,
                created_by: None,
                body: body.to_string(),
            })
            .collect();
        self.add_case_comments(account, case, comments);
    }

    pub fn add_case_comments(&self, account: &str, case: Case, comments: Vec<CaseComment>) {
        let mut state = self.state();
        state.comments.insert(case.number.clone(), comments);
        state.cases.entry(account.to_string()).or_default().push(case);
    }

    pub fn fail_case_comments(&self, case_number: &str) {
        self.state().failing_comments.insert(case_number.to_string());
    }

    pub fn set_entitlements(&self, account: &str, entitlements: &[(&str, &str)]) {
        self.state().entitlements.insert(
            account.to_string(),
            entitlements
                .iter()
                .map(|(name, level)| Entitlement {
                    name: name.to_string(),
                    support_level: level.to_string(),
                })
                .collect(),
        );
    }

    pub fn fail_creates(&self) {
        self.state().fail_create = true;
    }

    pub fn fail_deletes(&self) {
        self.state().fail_delete = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

#[async_trait::async_trait]
impl Backend for FakeBackend {
    async fn account_notes(&self, account: &str) -> HydraResult<Vec<Note>> {
        let mut state = self.state();
        state.calls.push(format!("notes {}", account));
        Ok(state.notes.get(account).cloned().unwrap_or_default())
    }

    async fn create_note(&self, account: &str, subject: &str, body: &str) -> HydraResult<()> {
        let mut state = self.state();
        state.calls.push(format!("create {}", account));
        if state.fail_create {
            return Err(HydraError::Transport(anyhow!("create refused by fake")));
        }
        state.next_note_id += 1;
        let id = format!("note-{}", state.next_note_id);
        state
            .notes
            .entry(account.to_string())
            .or_default()
            .push(Note {
                id,
                subject: subject.to_string(),
                body: body.to_string(),
                retired: false,
            });
        Ok(())
    }

    async fn delete_note(&self, account: &str, note_id: &str) -> HydraResult<()> {
        let mut state = self.state();
        state.calls.push(format!("delete {} {}", account, note_id));
        if state.fail_delete {
            return Err(HydraError::Rejected("delete refused".to_string()));
        }
        if let Some(notes) = state.notes.get_mut(account) {
            notes.retain(|note| note.id != note_id);
        }
        Ok(())
    }

    async fn open_cases(&self, account: &str) -> HydraResult<Vec<Case>> {
        let mut state = self.state();
        state.calls.push(format!("cases {}", account));
        Ok(state.cases.get(account).cloned().unwrap_or_default())
    }

    async fn case_comments(&self, case_number: &str) -> HydraResult<Vec<CaseComment>> {
        let mut state = self.state();
        state.calls.push(format!("comments {}", case_number));
        if state.failing_comments.contains(case_number) {
            return Err(HydraError::Transport(anyhow!("comments unavailable")));
        }
        Ok(state.comments.get(case_number).cloned().unwrap_or_default())
    }

    async fn entitlements(&self, account: &str) -> HydraResult<Vec<Entitlement>> {
        let mut state = self.state();
        state.calls.push(format!("entitlements {}", account));
        Ok(state.entitlements.get(account).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeTelemetry {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTelemetry {
    pub fn add_cluster(&self, cluster: &str, labels: &[(&str, &str)]) {
        self.subscriptions
            .lock()
            .expect("fake telemetry lock")
            .insert(
                cluster.to_string(),
                Subscription::from_labels(labels.iter().copied()),
            );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("fake telemetry lock").clone()
    }
}

#[async_trait::async_trait]
impl Telemetry for FakeTelemetry {
    async fn subscription(&self, cluster: &str, labels: &[&str]) -> TelemetryResult<Subscription> {
        self.calls
            .lock()
            .expect("fake telemetry lock")
            .push(cluster.to_string());
        let subscriptions = self.subscriptions.lock().expect("fake telemetry lock");
        let full = subscriptions
            .get(cluster)
            .ok_or(TelemetryError::NotFound)?;
        Ok(Subscription::from_labels(labels.iter().filter_map(|label| {
            full.get(label).map(|value| (label.to_string(), value.to_string()))
        })))
    }
}
