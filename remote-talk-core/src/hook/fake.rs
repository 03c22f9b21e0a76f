//! In-memory modules and a counting patch primitive for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::memory::{MemoryPatcher, WritableMemory};
use super::module_tables::{ExportSlot, ModuleTables};
use super::target::{normalize_module_name, ModuleHandle};
use crate::models::error::HookError;

pub const IMAGE_SIZE: usize = 8192;
pub const TRAMPOLINE_OFFSET: usize = 4096;

struct FakeModule {
    name: String,
    base: usize,
    imports: HashMap<(String, String), &'static AtomicUsize>,
    exports: HashMap<String, &'static AtomicU32>,
}

/// A module "loader" whose images live on the heap.
#[derive(Default)]
pub struct FakeModules {
    modules: Mutex<Vec<FakeModule>>,
}

impl FakeModules {
    /// Load a module. `imports` are `(module, symbol, initial entry)`;
    /// `exports` are `(symbol, rva)`.
    pub fn load(&self, name: &str, imports: &[(&str, &str, usize)], exports: &[(&str, u32)]) -> ModuleHandle {
        let image: &'static mut [u8] = Box::leak(vec![0u8; IMAGE_SIZE].into_boxed_slice());
        let base = image.as_mut_ptr() as usize;
        let module = FakeModule {
            name: normalize_module_name(name),
            base,
            imports: imports
                .iter()
                .map(|(m, s, v)| {
                    let slot: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(*v)));
                    ((normalize_module_name(m), s.to_string()), slot)
                })
                .collect(),
            exports: exports
                .iter()
                .map(|(s, rva)| {
                    let slot: &'static AtomicU32 = Box::leak(Box::new(AtomicU32::new(*rva)));
                    (s.to_string(), slot)
                })
                .collect(),
        };
        self.modules.lock().push(module);
        base
    }

    pub fn import_value(&self, importer: ModuleHandle, module: &str, symbol: &str) -> usize {
        let modules = self.modules.lock();
        let m = modules.iter().find(|m| m.base == importer).expect("module");
        m.imports[&(normalize_module_name(module), symbol.to_string())].load(Ordering::SeqCst)
    }

    pub fn export_rva(&self, module: ModuleHandle, symbol: &str) -> u32 {
        let modules = self.modules.lock();
        let m = modules.iter().find(|m| m.base == module).expect("module");
        m.exports[symbol].load(Ordering::SeqCst)
    }
}

impl ModuleTables for FakeModules {
    fn loaded_modules(&self) -> Vec<ModuleHandle> {
        self.modules.lock().iter().map(|m| m.base).collect()
    }

    fn find_module(&self, name: &str) -> Option<ModuleHandle> {
        let name = normalize_module_name(name);
        self.modules.lock().iter().find(|m| m.name == name).map(|m| m.base)
    }

    fn module_name(&self, module: ModuleHandle) -> Option<String> {
        self.modules.lock().iter().find(|m| m.base == module).map(|m| m.name.clone())
    }

    fn import_slot(&self, importer: ModuleHandle, module: &str, symbol: &str) -> Option<usize> {
        let modules = self.modules.lock();
        let m = modules.iter().find(|m| m.base == importer)?;
        m.imports
            .get(&(normalize_module_name(module), symbol.to_string()))
            .map(|slot| *slot as *const AtomicUsize as usize)
    }

    fn export_slot(&self, module: ModuleHandle, symbol: &str) -> Option<ExportSlot> {
        let modules = self.modules.lock();
        let m = modules.iter().find(|m| m.base == module)?;
        m.exports.get(symbol).map(|slot| ExportSlot {
            rva_slot: *slot as *const AtomicU32 as usize,
            base: m.base,
        })
    }
}

/// Writable-memory primitive that counts patches and hands out the upper
/// half of a fake image as the trampoline region.
#[derive(Default)]
pub struct CountingMemory {
    pub slot_patches: AtomicUsize,
    pub allocations: AtomicUsize,
}

impl CountingMemory {
    pub fn slot_patches(&self) -> usize {
        self.slot_patches.load(Ordering::SeqCst)
    }
}

impl MemoryPatcher for CountingMemory {
    unsafe fn patch_slot(&self, slot: usize, new_value: usize) -> Result<usize, HookError> {
        self.slot_patches.fetch_add(1, Ordering::SeqCst);
        WritableMemory.patch_slot(slot, new_value)
    }

    unsafe fn patch_rva(&self, slot: usize, new_rva: u32) -> Result<u32, HookError> {
        WritableMemory.patch_rva(slot, new_rva)
    }

    fn allocate_executable(&self, size: usize, near: usize) -> Result<usize, HookError> {
        if size > IMAGE_SIZE - TRAMPOLINE_OFFSET {
            return Err(HookError::AllocationFailed(format!("{} bytes too large", size)));
        }
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(near + TRAMPOLINE_OFFSET)
    }

    unsafe fn write_code(&self, address: usize, code: &[u8]) -> Result<(), HookError> {
        WritableMemory.write_code(address, code)
    }
}
