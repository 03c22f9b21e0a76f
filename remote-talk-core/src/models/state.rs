/// Streaming session state machine.
///
/// State transitions:
/// ```text
/// idle → synthesizing → draining → idle
/// ```
/// `synthesizing` ends when the engine signals completion (or an
/// acknowledged stop forces the end-of-speech sentinel); `draining` ends when
/// the drain task has written the sentinel to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Synthesizing,
    Draining,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Status value reported to the caller of a session operation.
///
/// Session-layer failures are reported this way instead of as errors so that
/// nothing crosses the session/transport boundary as a panic or exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkStatus {
    Succeeded,
    Failed,
}

impl TalkStatus {
    pub fn from_ack(acknowledged: bool) -> Self {
        if acknowledged {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Result of a single install attempt. Neither variant is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}
