use thiserror::Error;

/// Errors raised by the interception layer.
///
/// None of these ever reach the host's own call path: a hook that cannot be
/// installed is skipped, and an observer that fails is logged and ignored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    /// Symbol, module or instance not found. Non-fatal; retried by the
    /// lifecycle watchers when new modules or instances appear.
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    /// No executable memory for a trampoline within addressing range.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// Page protection could not be relaxed or restored around a patch.
    #[error("protection change failed: {0}")]
    ProtectionFailed(String),

    /// An observer reported a failure while handling an intercepted call.
    #[error("observer failed: {0}")]
    Observer(String),
}

/// Errors raised by the streaming session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TalkError {
    #[error("voice engine rejected {0}")]
    EngineRejected(&'static str),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to spawn task: {0}")]
    TaskSpawn(String),

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("configuration failed: {0}")]
    Configuration(String),
}

impl From<std::io::Error> for TalkError {
    fn from(e: std::io::Error) -> Self {
        TalkError::Transport(e.to_string())
    }
}
