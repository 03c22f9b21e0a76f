//! Forwarding stubs for export-table redirection.
//!
//! An export entry is a 32-bit RVA, so it cannot point at an arbitrary hook
//! function. Instead it points at a small stub placed near the module that
//! jumps to the hook. This is the only architecture-specific code in the
//! core.

use super::memory::MemoryPatcher;
use crate::models::error::HookError;

/// Default size of the executable region reserved per module.
pub const DEFAULT_REGION_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn current() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Self::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(Self::X86)
        } else if cfg!(target_arch = "aarch64") {
            Some(Self::Aarch64)
        } else {
            None
        }
    }

    /// Bytes occupied by one stub, padded to keep stubs aligned.
    pub fn stub_size(self) -> usize {
        match self {
            Self::X86 => 8,
            Self::X86_64 | Self::Aarch64 => 16,
        }
    }
}

/// Encode an unconditional jump from `at` to `target`.
///
/// - x86: `jmp rel32`
/// - x86_64: `jmp qword ptr [rip+0]` followed by the absolute target
/// - aarch64: `ldr x16, #8; br x16` followed by the absolute target
pub fn encode_jump(arch: Arch, at: usize, target: usize) -> Result<Vec<u8>, HookError> {
    let mut code = Vec::with_capacity(arch.stub_size());
    match arch {
        Arch::X86 => {
            let rel = (target as i64) - (at as i64 + 5);
            let rel = i32::try_from(rel)
                .map_err(|_| HookError::AllocationFailed(format!("jump from {:#x} to {:#x} out of range", at, target)))?;
            code.push(0xE9);
            code.extend_from_slice(&rel.to_le_bytes());
        }
        Arch::X86_64 => {
            code.extend_from_slice(&[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
            code.extend_from_slice(&(target as u64).to_le_bytes());
        }
        Arch::Aarch64 => {
            code.extend_from_slice(&0x5800_0050u32.to_le_bytes());
            code.extend_from_slice(&0xD61F_0200u32.to_le_bytes());
            code.extend_from_slice(&(target as u64).to_le_bytes());
        }
    }
    code.resize(arch.stub_size(), 0xCC);
    Ok(code)
}

/// One generated stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrampolineSlot {
    pub stub: usize,
    pub hook_fn: usize,
    pub original: usize,
}

/// A per-module executable region holding trampoline stubs.
///
/// Stubs are never freed: the hooks they serve live as long as the process.
#[derive(Debug)]
pub struct TrampolineTable {
    arch: Arch,
    region: usize,
    capacity: usize,
    used: usize,
    slots: Vec<TrampolineSlot>,
}

impl TrampolineTable {
    /// Allocate a region of `capacity` bytes near `near`.
    pub fn allocate(memory: &dyn MemoryPatcher, capacity: usize, near: usize) -> Result<Self, HookError> {
        let arch = Arch::current()
            .ok_or_else(|| HookError::AllocationFailed("trampolines unsupported on this architecture".into()))?;
        let region = memory.allocate_executable(capacity, near)?;
        Ok(Self::with_region(arch, region, capacity))
    }

    pub fn with_region(arch: Arch, region: usize, capacity: usize) -> Self {
        Self {
            arch,
            region,
            capacity,
            used: 0,
            slots: Vec::new(),
        }
    }

    pub fn region(&self) -> usize {
        self.region
    }

    pub fn slots(&self) -> &[TrampolineSlot] {
        &self.slots
    }

    /// Emit a stub jumping to `hook_fn`, remembering `original`.
    pub fn emit(&mut self, memory: &dyn MemoryPatcher, hook_fn: usize, original: usize) -> Result<TrampolineSlot, HookError> {
        let size = self.arch.stub_size();
        if self.used + size > self.capacity {
            return Err(HookError::AllocationFailed(format!(
                "trampoline region at {:#x} is full ({} bytes)",
                self.region, self.capacity
            )));
        }
        let stub = self.region + self.used;
        let code = encode_jump(self.arch, stub, hook_fn)?;
        unsafe { memory.write_code(stub, &code)? };
        self.used += size;

        let slot = TrampolineSlot { stub, hook_fn, original };
        self.slots.push(slot);
        Ok(slot)
    }
}
