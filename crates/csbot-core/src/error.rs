use csbot_hydra::HydraError;
use csbot_telemetry::TelemetryError;

/// Failure of a command handler.
///
/// `Lookup` reasons are shown to the user, prefixed with the cluster ID.
/// `Collaborator` failures only reach the logs.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("{0}")]
    Lookup(String),
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl From<HydraError> for BotError {
    fn from(err: HydraError) -> Self {
        match err {
            HydraError::Rejected(reason) => Self::Lookup(reason),
            HydraError::Transport(source) => Self::Collaborator(source),
        }
    }
}

impl From<TelemetryError> for BotError {
    fn from(err: TelemetryError) -> Self {
        match err {
            TelemetryError::Transport(source) => Self::Collaborator(source),
            lookup => Self::Lookup(lookup.to_string()),
        }
    }
}
