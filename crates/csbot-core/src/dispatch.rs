//! Command dispatch
//!
//! Every parse outcome becomes at most one reply. Handler failures never
//! escape: lookup failures are answered in-thread, collaborator failures are
//! logged and answered with silence.

use crate::command::{help_text, Command, HelpScope, ParseOutcome};
use crate::error::BotError;
use crate::summary::{split_subject, SummaryEngine};
use csbot_ipc::{InboundEvent, OutboundMessage, ReplyContent};
use tracing::{debug, error, info};

type HandlerResult = Result<Option<ReplyContent>, BotError>;

pub struct Dispatcher {
    engine: SummaryEngine,
}

impl Dispatcher {
    pub fn new(engine: SummaryEngine) -> Self {
        Self { engine }
    }

    pub async fn dispatch(
        &self,
        event: &InboundEvent,
        outcome: ParseOutcome,
    ) -> Option<OutboundMessage> {
        let content = match outcome {
            ParseOutcome::Error(err) => {
                debug!("Rejected command (trace_id={}): {}", event.trace_id, err);
                Some(ReplyContent::Text(err.message().to_string()))
            }
            ParseOutcome::Help(scope) => Some(ReplyContent::Text(help_text(scope))),
            ParseOutcome::Parsed(command) => self.run(event, &command).await,
        };

        content.map(|content| OutboundMessage::reply_to(event, content))
    }

    async fn run(&self, event: &InboundEvent, command: &Command) -> Option<ReplyContent> {
        let name = command.subcommand().name();
        let result = match command {
            Command::Help => Ok(Some(ReplyContent::Text(help_text(HelpScope::Global)))),
            Command::Summary { cluster } => self.summary(cluster, "", event).await,
            Command::Detail { cluster } => self.detail(cluster, "", event).await,
            Command::SetSummary { cluster, body } => {
                self.set_summary(cluster, body, event).await
            }
            Command::Comment { cluster, body } => self.comment(cluster, body, event).await,
        };

        let cluster = command.cluster().unwrap_or("-");
        match result {
            Ok(reply) => {
                debug!(
                    command = name,
                    %cluster,
                    replied = reply.is_some(),
                    "Handled command (trace_id={})",
                    event.trace_id
                );
                reply
            }
            Err(BotError::Lookup(reason)) => {
                info!(
                    command = name,
                    %cluster,
                    "Lookup failed (trace_id={}): {}",
                    event.trace_id,
                    reason
                );
                Some(ReplyContent::Text(format!("{} {}", cluster, reason)))
            }
            Err(BotError::Collaborator(e)) => {
                error!(
                    command = name,
                    %cluster,
                    "Collaborator failure (trace_id={}): {:#}",
                    event.trace_id,
                    e
                );
                None
            }
        }
    }

    async fn summary(&self, cluster: &str, _body: &str, _ctx: &InboundEvent) -> HandlerResult {
        let resolved = self.engine.resolve_summary(cluster).await?;
        Ok(Some(ReplyContent::Blocks(resolved.info)))
    }

    async fn detail(&self, cluster: &str, _body: &str, _ctx: &InboundEvent) -> HandlerResult {
        let resolved = self.engine.resolve_summary(cluster).await?;
        let mut blocks = resolved.info.clone();
        blocks.extend(resolved.summary_lines());
        blocks.extend(resolved.related_text());
        Ok(Some(ReplyContent::Blocks(blocks)))
    }

    async fn set_summary(&self, cluster: &str, body: &str, _ctx: &InboundEvent) -> HandlerResult {
        let (subject, rest) = split_subject(body);
        let written = self.engine.set_summary(cluster, subject, rest).await?;
        Ok(Some(ReplyContent::Text(format!(
            "set {} summary to:\n{}\n{}",
            cluster, written.subject, written.body
        ))))
    }

    async fn comment(&self, cluster: &str, body: &str, _ctx: &InboundEvent) -> HandlerResult {
        let (subject, rest) = split_subject(body);
        let written = self.engine.add_comment(cluster, subject, rest).await?;
        Ok(Some(ReplyContent::Text(format!(
            "added comment on {}:\n{}\n{}",
            cluster, written.subject, written.body
        ))))
    }
}
