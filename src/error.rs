use thiserror::Error;

/// Failures the assistant can run into, grouped by the stage that raised them.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("invalid value for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("failed to read chat history: {0:#}")]
    History(anyhow::Error),

    #[error("query agent failed: {0:#}")]
    Delegation(anyhow::Error),

    #[error("response cleanup failed: {0:#}")]
    Cleanup(anyhow::Error),

    #[error("failed to persist chat turn: {0:#}")]
    Persistence(anyhow::Error),
}

impl AssistantError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AssistantError::MissingConfig(_) | AssistantError::InvalidConfig { .. }
        )
    }
}

/// Pipeline stage an external call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    History,
    Delegation,
    Cleanup,
    Persistence,
}

impl Stage {
    pub fn wrap(self, err: anyhow::Error) -> AssistantError {
        match self {
            Stage::History => AssistantError::History(err),
            Stage::Delegation => AssistantError::Delegation(err),
            Stage::Cleanup => AssistantError::Cleanup(err),
            Stage::Persistence => AssistantError::Persistence(err),
        }
    }
}
