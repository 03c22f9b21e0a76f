//! Host output mute through the process's audio session.
//!
//! Mutes the session volume of this process on the default render endpoint.
//! Only what reaches the speakers is silenced; buffer commits, and with them
//! captured audio, are unaffected.

use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use remote_talk_core::traits::host_output::HostOutput;

/// [`HostOutput`] backed by `ISimpleAudioVolume`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionVolumeOutput;

impl SessionVolumeOutput {
    pub fn new() -> Self {
        Self
    }
}

impl HostOutput for SessionVolumeOutput {
    fn set_muted(&self, muted: bool) {
        match set_session_mute(muted) {
            Ok(()) => log::debug!("host session {}", if muted { "muted" } else { "unmuted" }),
            Err(e) => log::warn!("could not set host mute={}: {}", muted, e),
        }
    }
}

fn set_session_mute(muted: bool) -> windows::core::Result<()> {
    unsafe {
        // a thread already in an STA keeps its apartment; only balance our own init
        let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
        let _com_guard = if hr == RPC_E_CHANGED_MODE {
            None
        } else {
            hr.ok()?;
            Some(CoUninitializeGuard)
        };

        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;
        let device = enumerator.GetDefaultAudioEndpoint(eRender, eConsole)?;
        let sessions: IAudioSessionManager = device.Activate(CLSCTX_ALL, None)?;
        let volume = sessions.GetSimpleAudioVolume(None, 0)?;
        volume.SetMute(muted.into(), std::ptr::null())
    }
}

/// RAII guard that calls `CoUninitialize` on drop.
struct CoUninitializeGuard;

impl Drop for CoUninitializeGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
