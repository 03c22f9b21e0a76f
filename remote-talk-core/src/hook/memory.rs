use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::models::error::HookError;

/// The patch primitive: the only place that writes to code or table memory.
///
/// Implementations relax page protection as needed and restore it after the
/// write. Repeated patches of the same slot are serialized by the
/// interception registry, not here.
pub trait MemoryPatcher: Send + Sync {
    /// Swap the pointer-sized value at `slot`, returning the previous value.
    ///
    /// # Safety
    /// `slot` must be a valid, aligned, pointer-sized location that no one
    /// else writes concurrently.
    unsafe fn patch_slot(&self, slot: usize, new_value: usize) -> Result<usize, HookError>;

    /// Swap the 32-bit value at `slot` (an export-table RVA).
    ///
    /// # Safety
    /// Same contract as [`patch_slot`](Self::patch_slot) for a `u32` location.
    unsafe fn patch_rva(&self, slot: usize, new_rva: u32) -> Result<u32, HookError>;

    /// Allocate `size` bytes of executable memory as close to `near` as
    /// possible, within 32-bit relative reach.
    fn allocate_executable(&self, size: usize, near: usize) -> Result<usize, HookError>;

    /// Copy generated code to `address` and make it visible to execution.
    ///
    /// # Safety
    /// `address..address + code.len()` must lie in a region returned by
    /// [`allocate_executable`](Self::allocate_executable).
    unsafe fn write_code(&self, address: usize, code: &[u8]) -> Result<(), HookError>;
}

/// Patch primitive for memory that is already writable, such as heap-built
/// dispatch tables. Cannot allocate executable memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct WritableMemory;

impl MemoryPatcher for WritableMemory {
    unsafe fn patch_slot(&self, slot: usize, new_value: usize) -> Result<usize, HookError> {
        if slot == 0 || slot % std::mem::align_of::<usize>() != 0 {
            return Err(HookError::ProtectionFailed(format!("bad slot address {:#x}", slot)));
        }
        let cell = &*(slot as *const AtomicUsize);
        Ok(cell.swap(new_value, Ordering::SeqCst))
    }

    unsafe fn patch_rva(&self, slot: usize, new_rva: u32) -> Result<u32, HookError> {
        if slot == 0 || slot % std::mem::align_of::<u32>() != 0 {
            return Err(HookError::ProtectionFailed(format!("bad slot address {:#x}", slot)));
        }
        let cell = &*(slot as *const AtomicU32);
        Ok(cell.swap(new_rva, Ordering::SeqCst))
    }

    fn allocate_executable(&self, size: usize, near: usize) -> Result<usize, HookError> {
        Err(HookError::AllocationFailed(format!(
            "no executable memory for {} bytes near {:#x}",
            size, near
        )))
    }

    unsafe fn write_code(&self, address: usize, code: &[u8]) -> Result<(), HookError> {
        std::ptr::copy_nonoverlapping(code.as_ptr(), address as *mut u8, code.len());
        Ok(())
    }
}
