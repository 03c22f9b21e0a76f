/// The host's own audible output.
///
/// The session mutes it while a request asks for silent synthesis and
/// restores it once the engine has finished.
pub trait HostOutput: Send + Sync {
    fn set_muted(&self, muted: bool);
}

/// Output that ignores mute requests, for hosts without a controllable
/// playback path.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnmanagedOutput;

impl HostOutput for UnmanagedOutput {
    fn set_muted(&self, muted: bool) {
        log::debug!("host output not managed; ignoring mute={}", muted);
    }
}
