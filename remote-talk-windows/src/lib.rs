//! # remote-talk-windows
//!
//! Windows backend for remote-talk.
//!
//! Provides:
//! - `VirtualMemory`: patch primitive over `VirtualProtect` / `VirtualAlloc`
//! - `ProcessModules`: import/export tables of the loaded modules (via `PeImage`)
//! - `watchers`: process-wide installer plus `LoadLibrary*` / `CoCreateInstance` watchers
//! - `dsound`: DirectSound device, buffer and unlock hooks feeding buffer observers
//! - `SessionVolumeOutput`: host mute through the process's audio session
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use remote_talk_core::{TalkServer, TalkServerConfig};
//! use remote_talk_windows::SessionVolumeOutput;
//!
//! let server = TalkServer::new(engine, Arc::new(SessionVolumeOutput::new()), TalkServerConfig::default())?;
//! remote_talk_windows::attach(&server);
//! ```

pub mod pe_image;
pub mod wave_format;

#[cfg(target_os = "windows")]
pub mod dsound;
#[cfg(target_os = "windows")]
pub mod memory;
#[cfg(target_os = "windows")]
pub mod process_modules;
#[cfg(target_os = "windows")]
pub mod session_volume;
#[cfg(target_os = "windows")]
pub mod watchers;

pub use pe_image::PeImage;

#[cfg(target_os = "windows")]
pub use dsound::{add_buffer_observer, install_dsound_hooks};
#[cfg(target_os = "windows")]
pub use memory::VirtualMemory;
#[cfg(target_os = "windows")]
pub use process_modules::ProcessModules;
#[cfg(target_os = "windows")]
pub use session_volume::SessionVolumeOutput;
#[cfg(target_os = "windows")]
pub use watchers::{install_standing_watchers, installer};

/// Feed `server` with every DirectSound buffer commit in this process.
///
/// Returns the number of hook targets newly installed.
#[cfg(target_os = "windows")]
pub fn attach(server: &remote_talk_core::TalkServer) -> usize {
    add_buffer_observer(server.capture_observer());
    install_dsound_hooks()
}
