//! DirectSound interception: observe every buffer commit the host makes.
//!
//! Creation paths covered:
//! - `dsound!DirectSoundCreate8` and `DirectSoundCreate` (export and import),
//! - `CoCreateInstance(CLSID_DirectSound8 / CLSID_DirectSound)`
//!   (instantiation watcher).
//!
//! Each device gets `CreateSoundBuffer` redirected; each buffer created
//! through it gets `Unlock` redirected, which feeds the buffer observers.

use std::ffi::c_void;
use std::sync::Arc;

use uuid::Uuid;
use windows::core::GUID;

use remote_talk_core::capture::buffer_commit::{BufferCommit, BufferCommitObserver, BufferFormat};
use remote_talk_core::hook::registry::{dispatch, ObserverList};
use remote_talk_core::hook::target::HookRequest;
use remote_talk_core::models::audio_chunk::AudioFormat;

use crate::wave_format::{parse_wave_format, FORMAT_BUFFER_SIZE};
use crate::watchers::{everywhere, install_standing_watchers, installer, original_method, original_symbol};

pub const DSOUND: &str = "dsound.dll";

pub const CLSID_DIRECT_SOUND: Uuid = Uuid::from_u128(0x47d4d946_62e8_11cf_93bc_444553540000);
pub const CLSID_DIRECT_SOUND8: Uuid = Uuid::from_u128(0x3901cc3f_84b5_4fa4_ba35_aa8172b8a09b);

/// `IDirectSound(8)::CreateSoundBuffer`.
pub const CREATE_SOUND_BUFFER_SLOT: usize = 3;
/// `IDirectSoundBuffer::GetFormat`.
pub const GET_FORMAT_SLOT: usize = 5;
/// `IDirectSoundBuffer::Unlock`.
pub const UNLOCK_SLOT: usize = 19;

const DSERR_GENERIC: i32 = 0x8000_4005_u32 as i32;

type DirectSoundCreateFn = unsafe extern "system" fn(*const GUID, *mut *mut c_void, *mut c_void) -> i32;
type CreateSoundBufferFn = unsafe extern "system" fn(*mut c_void, *const c_void, *mut *mut c_void, *mut c_void) -> i32;
type GetFormatFn = unsafe extern "system" fn(*mut c_void, *mut u8, u32, *mut u32) -> i32;
type UnlockFn = unsafe extern "system" fn(*mut c_void, *mut c_void, u32, *mut c_void, u32) -> i32;

static BUFFER_OBSERVERS: ObserverList<dyn BufferCommitObserver> = ObserverList::new();

/// Register an observer of every DirectSound buffer commit in the process.
pub fn add_buffer_observer(observer: Arc<dyn BufferCommitObserver>) {
    BUFFER_OBSERVERS.add(observer);
}

/// Register the DirectSound hooks and make sure the standing watchers are
/// in place so that late-loaded modules and new devices get hooked too.
///
/// Returns the number of targets newly installed.
pub fn install_dsound_hooks() -> usize {
    install_standing_watchers();

    let installer = installer();
    let mut requests: Vec<HookRequest> = Vec::new();
    requests.extend(everywhere(DSOUND, "DirectSoundCreate8", direct_sound_create8_hook as *const () as usize));
    requests.extend(everywhere(DSOUND, "DirectSoundCreate", direct_sound_create_hook as *const () as usize));
    for clsid in [CLSID_DIRECT_SOUND8, CLSID_DIRECT_SOUND] {
        let hook = create_sound_buffer_hook as *const () as usize;
        requests.push(HookRequest::instance(clsid, CREATE_SOUND_BUFFER_SLOT, hook));
    }

    let installed = requests.into_iter().map(|r| installer.register(r)).sum();
    if installer.modules().find_module(DSOUND).is_none() {
        log::debug!("{} not loaded yet; hooks deferred until it is", DSOUND);
    }
    installed
}

unsafe fn vtable_entry<F: Copy>(object: *mut c_void, slot: usize) -> F {
    let table = *(object as *const *const usize);
    let entry = *table.add(slot);
    std::mem::transmute_copy::<usize, F>(&entry)
}

unsafe fn buffer_format(buffer: *mut c_void) -> BufferFormat {
    let get_format = vtable_entry::<GetFormatFn>(buffer, GET_FORMAT_SLOT);
    let mut bytes = [0u8; FORMAT_BUFFER_SIZE];
    let mut written = 0u32;
    let hr = get_format(buffer, bytes.as_mut_ptr(), bytes.len() as u32, &mut written);
    let parsed = if hr >= 0 {
        parse_wave_format(&bytes[..(written as usize).min(bytes.len())])
    } else {
        None
    };
    parsed.unwrap_or_else(|| {
        log::trace!("buffer {:p}: unknown format (hr={:#x})", buffer, hr);
        BufferFormat {
            format: AudioFormat::Unknown,
            frequency: 0,
            channels: 0,
        }
    })
}

unsafe fn region<'a>(ptr: *mut c_void, len: u32) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr as *const u8, len as usize)
    }
}

unsafe fn hook_device(device: *mut c_void) {
    if device.is_null() {
        return;
    }
    let hook = create_sound_buffer_hook as *const () as usize;
    if let Err(e) = installer().install_instance(device as usize, CREATE_SOUND_BUFFER_SLOT, hook) {
        log::warn!("could not hook DirectSound device {:p}: {}", device, e);
    }
}

unsafe fn hook_buffer(buffer: *mut c_void) {
    if buffer.is_null() {
        return;
    }
    if let Err(e) = installer().install_instance(buffer as usize, UNLOCK_SLOT, unlock_hook as *const () as usize) {
        log::warn!("could not hook DirectSound buffer {:p}: {}", buffer, e);
    }
}

unsafe extern "system" fn direct_sound_create8_hook(device: *const GUID, out: *mut *mut c_void, outer: *mut c_void) -> i32 {
    let Some(original) = original_symbol::<DirectSoundCreateFn>(DSOUND, "DirectSoundCreate8") else {
        return DSERR_GENERIC;
    };
    let hr = original(device, out, outer);
    if hr >= 0 && !out.is_null() {
        hook_device(*out);
    }
    hr
}

unsafe extern "system" fn direct_sound_create_hook(device: *const GUID, out: *mut *mut c_void, outer: *mut c_void) -> i32 {
    let Some(original) = original_symbol::<DirectSoundCreateFn>(DSOUND, "DirectSoundCreate") else {
        return DSERR_GENERIC;
    };
    let hr = original(device, out, outer);
    if hr >= 0 && !out.is_null() {
        hook_device(*out);
    }
    hr
}

unsafe extern "system" fn create_sound_buffer_hook(
    this: *mut c_void,
    desc: *const c_void,
    out: *mut *mut c_void,
    outer: *mut c_void,
) -> i32 {
    let Some(original) = original_method::<CreateSoundBufferFn>(this, CREATE_SOUND_BUFFER_SLOT) else {
        return DSERR_GENERIC;
    };
    let hr = original(this, desc, out, outer);
    if hr >= 0 && !out.is_null() {
        hook_buffer(*out);
    }
    hr
}

unsafe extern "system" fn unlock_hook(this: *mut c_void, ptr1: *mut c_void, len1: u32, ptr2: *mut c_void, len2: u32) -> i32 {
    let Some(original) = original_method::<UnlockFn>(this, UNLOCK_SLOT) else {
        return DSERR_GENERIC;
    };
    if BUFFER_OBSERVERS.is_empty() {
        return original(this, ptr1, len1, ptr2, len2);
    }

    let commit = BufferCommit {
        buffer: this as usize,
        format: buffer_format(this),
        regions: [region(ptr1, len1), region(ptr2, len2)],
    };

    dispatch(
        &BUFFER_OBSERVERS,
        "IDirectSoundBuffer::Unlock",
        |o| o.before_unlock(&commit),
        || unsafe { original(this, ptr1, len1, ptr2, len2) },
        |o, hr| o.after_unlock(&commit, *hr),
    )
}
