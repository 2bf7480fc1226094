//! Per-cluster summary notes
//!
//! The backend has no notion of "the" summary of a cluster; it stores plain
//! account notes. A note is the summary for cluster `E` when its subject
//! starts with `Summary (cluster E): ` and it is not retired. Replacing a
//! summary creates the new note first and only then deletes the old one: a
//! failure in between leaves two summaries (the first one listed wins on
//! read), never zero.

use crate::cases::{case_line, relevant_cases};
use crate::error::BotError;
use crate::metrics::Metrics;
use csbot_hydra::{Backend, Entitlement, Note};
use csbot_telemetry::{Telemetry, EBS_ACCOUNT_LABEL, MANAGED_LABEL, SUPPORT_LABEL};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

pub const SUMMARY_FOOTER: &str = "This summary was created by the cluster-support bot.  Workflow docs in https://github.com/openshift/cluster-support-bot/";

const NO_ENTITLEMENTS: &str =
    "None.  Customer Experience and Engagement (CEE) will not be able to open support cases.";

pub fn summary_subject_prefix(cluster: &str) -> String {
    format!("Summary (cluster {}): ", cluster)
}

pub fn comment_subject_prefix(cluster: &str) -> String {
    format!("cluster {}: ", cluster)
}

/// First line is the subject, the rest is the body (possibly empty).
pub fn split_subject(text: &str) -> (&str, &str) {
    text.split_once('\n').unwrap_or((text, ""))
}

fn summary_body(body: &str) -> String {
    format!("{}\n\n{}", body.trim(), SUMMARY_FOOTER)
        .trim()
        .to_string()
}

/// Single pass over the notes in backend order.
///
/// Retired notes are ignored. The first reserved-prefix note is the summary
/// and ends the scan; notes seen before it whose subject mentions the cluster
/// are related notes.
pub fn scan_notes(notes: Vec<Note>, cluster: &str) -> (Option<Note>, Vec<Note>) {
    let prefix = summary_subject_prefix(cluster);
    let mut related = Vec::new();
    for note in notes {
        if note.retired {
            continue;
        }
        if note.subject.starts_with(&prefix) {
            return (Some(note), related);
        }
        if note.subject.contains(cluster) {
            related.push(note);
        }
    }
    (None, related)
}

pub fn entitlements_line(entitlements: &[Entitlement]) -> String {
    if entitlements.is_empty() {
        return NO_ENTITLEMENTS.to_string();
    }

    let levels = |openshift: bool| {
        let set: BTreeSet<&str> = entitlements
            .iter()
            .filter(|e| e.name.contains("OpenShift") == openshift)
            .map(|e| e.support_level.as_str())
            .collect();
        if set.is_empty() {
            "None".to_string()
        } else {
            set.into_iter().collect::<Vec<_>>().join(", ")
        }
    };

    format!("OpenShift: {}.  Other: {}", levels(true), levels(false))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSummary {
    pub info: Vec<String>,
    pub summary: Option<Note>,
    pub related: Vec<Note>,
}

impl ClusterSummary {
    /// Subject and body of the current summary note, if any.
    pub fn summary_lines(&self) -> Vec<String> {
        self.summary
            .iter()
            .flat_map(|note| [note.subject.clone(), note.body.clone()])
            .collect()
    }

    /// Related notes flattened to one text block.
    pub fn related_text(&self) -> Option<String> {
        if self.related.is_empty() {
            return None;
        }
        let lines: Vec<&str> = self
            .related
            .iter()
            .flat_map(|note| [note.subject.as_str(), note.body.as_str()])
            .collect();
        Some(lines.join("\n"))
    }
}

/// Subject (without the reserved prefix) and body of a freshly written note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenNote {
    pub subject: String,
    pub body: String,
}

pub struct SummaryEngine {
    backend: Arc<dyn Backend>,
    telemetry: Arc<dyn Telemetry>,
    metrics: Arc<Metrics>,
    dashboards: Vec<String>,
}

impl SummaryEngine {
    pub fn new(
        backend: Arc<dyn Backend>,
        telemetry: Arc<dyn Telemetry>,
        metrics: Arc<Metrics>,
        dashboards: Vec<String>,
    ) -> Self {
        Self {
            backend,
            telemetry,
            metrics,
            dashboards,
        }
    }

    async fn resolve_account(&self, cluster: &str) -> Result<String, BotError> {
        let subscription = self
            .telemetry
            .subscription(cluster, &[EBS_ACCOUNT_LABEL])
            .await?;
        Ok(subscription.ebs_account()?.to_string())
    }

    async fn current_notes(
        &self,
        account: &str,
        cluster: &str,
    ) -> Result<(Option<Note>, Vec<Note>), BotError> {
        let notes = self.backend.account_notes(account).await?;
        Ok(scan_notes(notes, cluster))
    }

    /// Facts, current summary and related notes for `cluster`, read fresh.
    pub async fn resolve_summary(&self, cluster: &str) -> Result<ClusterSummary, BotError> {
        let subscription = self
            .telemetry
            .subscription(cluster, &[EBS_ACCOUNT_LABEL, MANAGED_LABEL, SUPPORT_LABEL])
            .await?;
        let account = subscription.ebs_account()?.to_string();
        let (summary, related) = self.current_notes(&account, cluster).await?;

        let support = subscription.get(SUPPORT_LABEL);
        let mut info = vec![
            format!("Cluster {}", cluster),
            format!(
                "Created by Red Hat Customer Portal Account ID {}",
                account
            ),
            format!(
                "Managed: {}",
                subscription.get(MANAGED_LABEL).unwrap_or("Unknown")
            ),
            format!("Support: {}", support.unwrap_or("None")),
        ];

        if support.is_none_or(|value| value.is_empty()) {
            let entitlements = self.backend.entitlements(&account).await?;
            info.push(format!("Entitlements: {}", entitlements_line(&entitlements)));
        }

        info.extend(
            self.dashboards
                .iter()
                .map(|base| format!("Dashboard: {}{}", base, cluster)),
        );

        let cases = relevant_cases(self.backend.as_ref(), &account, cluster).await?;
        info.extend(cases.iter().map(case_line));

        Ok(ClusterSummary {
            info,
            summary,
            related,
        })
    }

    /// Replaces the cluster summary: create the new note, then delete the old.
    pub async fn set_summary(
        &self,
        cluster: &str,
        subject: &str,
        body: &str,
    ) -> Result<WrittenNote, BotError> {
        let account = self.resolve_account(cluster).await?;
        let (previous, _) = self.current_notes(&account, cluster).await?;

        let body = summary_body(body);
        let full_subject = format!("{}{}", summary_subject_prefix(cluster), subject);
        self.backend
            .create_note(&account, &full_subject, &body)
            .await?;
        info!(%cluster, %account, "summary note created");

        if let Some(previous) = previous {
            if let Err(e) = self.backend.delete_note(&account, &previous.id).await {
                warn!(
                    %cluster,
                    note_id = %previous.id,
                    "new summary created but previous one was not deleted: {}",
                    e
                );
                return Err(e.into());
            }
        }

        self.metrics.record_comment(cluster);
        Ok(WrittenNote {
            subject: subject.to_string(),
            body,
        })
    }

    /// Adds a plain note about the cluster; the summary is left alone.
    pub async fn add_comment(
        &self,
        cluster: &str,
        subject: &str,
        body: &str,
    ) -> Result<WrittenNote, BotError> {
        let account = self.resolve_account(cluster).await?;
        let full_subject = format!("{}{}", comment_subject_prefix(cluster), subject);
        self.backend.create_note(&account, &full_subject, body).await?;
        info!(%cluster, %account, "comment note created");

        self.metrics.record_comment(cluster);
        Ok(WrittenNote {
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }
}
