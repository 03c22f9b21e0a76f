//! Patch primitive backed by the Win32 virtual memory API.

use std::ffi::c_void;
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
use windows::Win32::System::Memory::{
    VirtualAlloc, VirtualProtect, VirtualQuery, MEMORY_BASIC_INFORMATION, MEM_COMMIT, MEM_FREE, MEM_RESERVE,
    PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS,
};
use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows::Win32::System::Threading::GetCurrentProcess;

use remote_talk_core::hook::memory::MemoryPatcher;
use remote_talk_core::models::error::HookError;

/// Furthest a trampoline may sit above the module base: export RVAs are
/// unsigned 32-bit, and rel32 jumps reach ±2 GiB.
const MAX_DISTANCE: usize = 0x7FFF_0000;

/// Patches live process memory, relaxing page protection around each write.
#[derive(Debug, Clone, Copy)]
pub struct VirtualMemory {
    granularity: usize,
}

impl VirtualMemory {
    pub fn new() -> Self {
        let mut info = SYSTEM_INFO::default();
        unsafe { GetSystemInfo(&mut info) };
        Self {
            granularity: (info.dwAllocationGranularity as usize).max(0x1_0000),
        }
    }

    /// Run `write` with `[address, address + len)` writable, then restore
    /// the previous protection.
    unsafe fn with_writable<R>(&self, address: usize, len: usize, write: impl FnOnce() -> R) -> Result<R, HookError> {
        let mut previous = PAGE_PROTECTION_FLAGS::default();
        VirtualProtect(address as *const c_void, len, PAGE_EXECUTE_READWRITE, &mut previous)
            .map_err(|e| HookError::ProtectionFailed(format!("VirtualProtect({:#x}) failed: {}", address, e)))?;

        let result = write();

        let mut ignored = PAGE_PROTECTION_FLAGS::default();
        if let Err(e) = VirtualProtect(address as *const c_void, len, previous, &mut ignored) {
            log::warn!("could not restore protection at {:#x}: {}", address, e);
        }
        Ok(result)
    }

    fn align_up(&self, address: usize) -> usize {
        (address + self.granularity - 1) & !(self.granularity - 1)
    }
}

impl Default for VirtualMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPatcher for VirtualMemory {
    unsafe fn patch_slot(&self, slot: usize, new: usize) -> Result<usize, HookError> {
        self.with_writable(slot, mem::size_of::<usize>(), || {
            (*(slot as *const AtomicUsize)).swap(new, Ordering::SeqCst)
        })
    }

    unsafe fn patch_rva(&self, slot: usize, new_rva: u32) -> Result<u32, HookError> {
        self.with_writable(slot, mem::size_of::<u32>(), || {
            (*(slot as *const AtomicU32)).swap(new_rva, Ordering::SeqCst)
        })
    }

    /// Walk free regions upward from `near` and commit the first one that
    /// fits, so the region's offset from `near` stays a valid export RVA.
    fn allocate_executable(&self, size: usize, near: usize) -> Result<usize, HookError> {
        let limit = near.saturating_add(MAX_DISTANCE);
        let mut address = self.align_up(near + 1);

        while address < limit {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            let queried = unsafe {
                VirtualQuery(
                    Some(address as *const c_void),
                    &mut info,
                    mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if queried == 0 {
                break;
            }

            let region_end = info.BaseAddress as usize + info.RegionSize;
            if info.State == MEM_FREE && region_end.saturating_sub(address) >= size {
                let allocated = unsafe {
                    VirtualAlloc(
                        Some(address as *const c_void),
                        size,
                        MEM_COMMIT | MEM_RESERVE,
                        PAGE_EXECUTE_READWRITE,
                    )
                };
                if !allocated.is_null() {
                    log::debug!("trampoline region at {:#x} ({} bytes) near {:#x}", allocated as usize, size, near);
                    return Ok(allocated as usize);
                }
            }
            address = self.align_up(region_end.max(address + 1));
        }

        Err(HookError::AllocationFailed(format!(
            "no free region of {} bytes within range of {:#x}",
            size, near
        )))
    }

    unsafe fn write_code(&self, address: usize, code: &[u8]) -> Result<(), HookError> {
        self.with_writable(address, code.len(), || {
            std::ptr::copy_nonoverlapping(code.as_ptr(), address as *mut u8, code.len());
        })?;
        FlushInstructionCache(GetCurrentProcess(), Some(address as *const c_void), code.len())
            .map_err(|e| HookError::ProtectionFailed(format!("FlushInstructionCache failed: {}", e)))
    }
}
