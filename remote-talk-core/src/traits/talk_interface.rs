use crate::models::stats::{CastInfo, TalkParams};

/// Control surface of the host's voice engine.
///
/// Implemented by each host integration. All methods may be called from the
/// session's background threads, so implementations must marshal to the
/// engine's own thread if it requires one.
pub trait TalkInterface: Send + Sync {
    /// Current engine parameters.
    fn params(&self) -> TalkParams;

    /// Apply every field that is set in `params`.
    fn set_params(&self, params: &TalkParams) -> bool;

    fn set_text(&self, text: &str) -> bool;

    /// Start synthesis of the current text. `false` if the engine refused.
    fn talk(&self) -> bool;

    /// Request the current synthesis to stop. `true` if acknowledged.
    fn stop(&self) -> bool;

    /// Block until the current synthesis completes.
    fn wait(&self);

    fn is_playing(&self) -> bool;

    fn casts(&self) -> Vec<CastInfo>;

    /// Host application name.
    fn client_name(&self) -> String;

    fn plugin_version(&self) -> String;

    fn protocol_version(&self) -> String;
}
