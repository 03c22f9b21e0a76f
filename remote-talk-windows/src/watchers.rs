//! Process-wide installer and the standing lifecycle watchers.
//!
//! The module-load watcher wraps `kernel32!LoadLibrary*`; the instantiation
//! watcher wraps `ole32!CoCreateInstance`. Both are installed through the
//! export table (for callers resolving them at run time) and through every
//! importing module's import table.

use std::ffi::c_void;
use std::sync::{Arc, OnceLock};

use uuid::Uuid;
use windows::core::GUID;

use remote_talk_core::hook::installer::HookInstaller;
use remote_talk_core::hook::target::HookRequest;

use crate::memory::VirtualMemory;
use crate::process_modules::ProcessModules;

pub const KERNEL32: &str = "kernel32.dll";
pub const OLE32: &str = "ole32.dll";

const E_FAIL: i32 = 0x8000_4005_u32 as i32;

// LoadLibraryEx flags whose result is not an executable image
const LOAD_LIBRARY_AS_DATAFILE: u32 = 0x0000_0002;
const LOAD_LIBRARY_AS_IMAGE_RESOURCE: u32 = 0x0000_0020;
const LOAD_LIBRARY_AS_DATAFILE_EXCLUSIVE: u32 = 0x0000_0040;
const NOT_AN_IMAGE: u32 = LOAD_LIBRARY_AS_DATAFILE | LOAD_LIBRARY_AS_IMAGE_RESOURCE | LOAD_LIBRARY_AS_DATAFILE_EXCLUSIVE;

type LoadLibraryAFn = unsafe extern "system" fn(*const u8) -> usize;
type LoadLibraryWFn = unsafe extern "system" fn(*const u16) -> usize;
type LoadLibraryExAFn = unsafe extern "system" fn(*const u8, *mut c_void, u32) -> usize;
type LoadLibraryExWFn = unsafe extern "system" fn(*const u16, *mut c_void, u32) -> usize;
type CoCreateInstanceFn =
    unsafe extern "system" fn(*const GUID, *mut c_void, u32, *const GUID, *mut *mut c_void) -> i32;

static INSTALLER: OnceLock<HookInstaller> = OnceLock::new();

/// The installer shared by every hook in this process.
pub fn installer() -> &'static HookInstaller {
    INSTALLER.get_or_init(|| HookInstaller::new(Arc::new(ProcessModules), Arc::new(VirtualMemory::new())))
}

/// Original entry of a hooked symbol, typed as `F`.
///
/// # Safety
/// `F` must be the function-pointer type of `module!symbol`.
pub(crate) unsafe fn original_symbol<F: Copy>(module: &str, symbol: &str) -> Option<F> {
    let address = installer().registry().original_symbol(module, symbol)?;
    Some(std::mem::transmute_copy::<usize, F>(&address))
}

/// Original entry of dispatch slot `slot` of `object`, typed as `F`.
///
/// # Safety
/// `object` must be a live COM object and `F` the slot's function-pointer type.
pub(crate) unsafe fn original_method<F: Copy>(object: *mut c_void, slot: usize) -> Option<F> {
    let address = installer().registry().original_method(object as usize, slot)?;
    Some(std::mem::transmute_copy::<usize, F>(&address))
}

/// Export and import requests for the same function.
pub(crate) fn everywhere(module: &str, symbol: &str, hook_fn: usize) -> [HookRequest; 2] {
    [
        HookRequest::export(module, symbol, hook_fn),
        HookRequest::import(module, symbol, hook_fn),
    ]
}

pub(crate) fn uuid_from_guid(guid: &GUID) -> Uuid {
    Uuid::from_fields(guid.data1, guid.data2, guid.data3, &guid.data4)
}

/// Install the module-load and instantiation watchers, then apply every
/// registered request to the modules already loaded.
pub fn install_standing_watchers() {
    let requests = [
        everywhere(KERNEL32, "LoadLibraryA", load_library_a_hook as *const () as usize),
        everywhere(KERNEL32, "LoadLibraryW", load_library_w_hook as *const () as usize),
        everywhere(KERNEL32, "LoadLibraryExA", load_library_ex_a_hook as *const () as usize),
        everywhere(KERNEL32, "LoadLibraryExW", load_library_ex_w_hook as *const () as usize),
        everywhere(OLE32, "CoCreateInstance", co_create_instance_hook as *const () as usize),
    ];
    installer().install_standing_watchers(requests.into_iter().flatten());
    log::info!("standing watchers installed ({} hooks active)", installer().registry().installed_count());
}

fn after_load(module: usize, flags: u32) {
    // data-file mappings carry tag bits and have no usable tables
    if module == 0 || module & 0x3 != 0 || flags & NOT_AN_IMAGE != 0 {
        return;
    }
    installer().on_module_loaded(module);
}

unsafe extern "system" fn load_library_a_hook(name: *const u8) -> usize {
    let Some(original) = original_symbol::<LoadLibraryAFn>(KERNEL32, "LoadLibraryA") else {
        return 0;
    };
    let module = original(name);
    after_load(module, 0);
    module
}

unsafe extern "system" fn load_library_w_hook(name: *const u16) -> usize {
    let Some(original) = original_symbol::<LoadLibraryWFn>(KERNEL32, "LoadLibraryW") else {
        return 0;
    };
    let module = original(name);
    after_load(module, 0);
    module
}

unsafe extern "system" fn load_library_ex_a_hook(name: *const u8, file: *mut c_void, flags: u32) -> usize {
    let Some(original) = original_symbol::<LoadLibraryExAFn>(KERNEL32, "LoadLibraryExA") else {
        return 0;
    };
    let module = original(name, file, flags);
    after_load(module, flags);
    module
}

unsafe extern "system" fn load_library_ex_w_hook(name: *const u16, file: *mut c_void, flags: u32) -> usize {
    let Some(original) = original_symbol::<LoadLibraryExWFn>(KERNEL32, "LoadLibraryExW") else {
        return 0;
    };
    let module = original(name, file, flags);
    after_load(module, flags);
    module
}

unsafe extern "system" fn co_create_instance_hook(
    clsid: *const GUID,
    outer: *mut c_void,
    context: u32,
    iid: *const GUID,
    out: *mut *mut c_void,
) -> i32 {
    let Some(original) = original_symbol::<CoCreateInstanceFn>(OLE32, "CoCreateInstance") else {
        return E_FAIL;
    };
    let hr = original(clsid, outer, context, iid, out);
    if hr >= 0 && !clsid.is_null() && !out.is_null() && !(*out).is_null() {
        installer().on_instance_created(&uuid_from_guid(&*clsid), *out as usize);
    }
    hr
}
