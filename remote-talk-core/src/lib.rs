//! # remote-talk-core
//!
//! Platform-agnostic core of remote-talk: redirect a host application's calls
//! into its own audio subsystem, observe the audio it plays, and stream that
//! audio live to a remote requester while the host's voice engine speaks.
//!
//! Platform backends (Windows: PE import/export tables, COM dispatch tables,
//! DirectSound buffers) implement `MemoryPatcher` and `ModuleTables` and
//! route intercepted calls through `dispatch`.
//!
//! ## Architecture
//!
//! ```text
//! remote-talk-core (this crate)
//! ├── hook/         ← HookInstaller, InterceptionRegistry, ObserverList, TrampolineTable, lifecycle watchers
//! ├── capture/      ← BufferCommitObserver, AudioCaptureObserver
//! ├── models/       ← AudioChunk, HookError, TalkError, TalkParams, TalkStats, TalkServerConfig
//! ├── processing/   ← PendingQueue, mono downmix, WAV export
//! ├── session/      ← TalkServer (streaming session), TaskHandle
//! └── traits/       ← TalkInterface, HostOutput
//! ```

pub mod capture;
pub mod hook;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use capture::buffer_commit::{BufferCommit, BufferCommitObserver, BufferFormat};
pub use capture::observer::{AudioCaptureObserver, CaptureSettings};
pub use hook::installer::HookInstaller;
pub use hook::lifecycle::{InstanceCreationHandler, LifecycleHandler, ModuleLoadHandler};
pub use hook::memory::{MemoryPatcher, WritableMemory};
pub use hook::module_tables::{ExportSlot, ModuleTables};
pub use hook::registry::{dispatch, InterceptionRegistry, ObserverList};
pub use hook::target::{HookRequest, HookTarget, ModuleHandle, OriginalKey};
pub use hook::trampoline::{Arch, TrampolineSlot, TrampolineTable};
pub use models::audio_chunk::{AudioChunk, AudioFormat};
pub use models::config::TalkServerConfig;
pub use models::error::{HookError, TalkError};
pub use models::state::{InstallOutcome, SessionState, TalkStatus};
pub use models::stats::{CastInfo, TalkParams, TalkStats};
pub use processing::pending_queue::PendingQueue;
pub use session::talk_server::{DrainSummary, TalkOutcome, TalkRequest, TalkServer};
pub use session::task::TaskHandle;
pub use traits::host_output::{HostOutput, UnmanagedOutput};
pub use traits::talk_interface::TalkInterface;
