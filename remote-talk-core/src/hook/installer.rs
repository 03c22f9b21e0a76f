use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::lifecycle::{LifecycleHandler, LifecycleWatchers};
use super::memory::MemoryPatcher;
use super::module_tables::ModuleTables;
use super::registry::InterceptionRegistry;
use super::target::{normalize_module_name, HookRequest, HookTarget, ModuleHandle};
use super::trampoline::{TrampolineTable, DEFAULT_REGION_SIZE};
use crate::models::error::HookError;
use crate::models::state::InstallOutcome;

/// Applies hook requests to loaded modules and live instances.
///
/// Three strategies, chosen by request kind:
/// - **import**: patch an importing module's import slot directly;
/// - **export**: point the export entry at a trampoline near the module;
/// - **instance**: patch one slot of an object's dispatch table, once per
///   table, which redirects every instance sharing that table.
///
/// Requests are remembered. Targets that cannot be resolved yet are skipped
/// and picked up later by [`on_module_loaded`](Self::on_module_loaded) and
/// [`on_instance_created`](Self::on_instance_created), which the standing
/// watchers call.
pub struct HookInstaller {
    registry: InterceptionRegistry,
    modules: Arc<dyn ModuleTables>,
    memory: Arc<dyn MemoryPatcher>,
    requests: RwLock<Vec<HookRequest>>,
    trampolines: Mutex<HashMap<ModuleHandle, TrampolineTable>>,
    watchers: LifecycleWatchers,
}

impl HookInstaller {
    pub fn new(modules: Arc<dyn ModuleTables>, memory: Arc<dyn MemoryPatcher>) -> Self {
        Self {
            registry: InterceptionRegistry::new(),
            modules,
            memory,
            requests: RwLock::new(Vec::new()),
            trampolines: Mutex::new(HashMap::new()),
            watchers: LifecycleWatchers::default(),
        }
    }

    pub fn registry(&self) -> &InterceptionRegistry {
        &self.registry
    }

    pub fn modules(&self) -> &dyn ModuleTables {
        &*self.modules
    }

    pub fn requests(&self) -> Vec<HookRequest> {
        self.requests.read().clone()
    }

    /// Remember `request` and apply it to everything already loaded.
    ///
    /// Returns how many targets were newly installed. Unresolvable targets
    /// are not an error; they are retried as modules and instances appear.
    pub fn register(&self, request: HookRequest) -> usize {
        {
            let mut requests = self.requests.write();
            if requests.contains(&request) {
                return 0;
            }
            requests.push(request.clone());
        }

        match &request {
            HookRequest::Import { .. } => self
                .modules
                .loaded_modules()
                .into_iter()
                .filter(|&m| self.apply_import(m, &request))
                .count(),
            HookRequest::Export { module, symbol, hook_fn } => {
                usize::from(self.report(&request, self.install_export(module, symbol, *hook_fn)))
            }
            HookRequest::Instance { .. } => 0,
        }
    }

    pub fn add_lifecycle_handler(&self, handler: LifecycleHandler) {
        self.watchers.add(handler);
    }

    /// Register the watcher hooks themselves, then catch up on every module
    /// loaded before the watchers existed.
    pub fn install_standing_watchers<I>(&self, watchers: I)
    where
        I: IntoIterator<Item = HookRequest>,
    {
        for request in watchers {
            self.register(request);
        }
        self.rescan_loaded_modules();
    }

    /// Re-apply all module requests to every loaded module.
    pub fn rescan_loaded_modules(&self) {
        for module in self.modules.loaded_modules() {
            self.apply_module_requests(module);
        }
    }

    /// Module-load watcher entry: apply matching requests, then notify
    /// lifecycle handlers.
    pub fn on_module_loaded(&self, module: ModuleHandle) {
        if module == 0 {
            return;
        }
        let name = self.apply_module_requests(module);
        self.watchers.module_loaded(module, &name);
    }

    /// Instantiation watcher entry: patch the new object's dispatch table if
    /// its type is of interest, then notify lifecycle handlers.
    ///
    /// # Safety
    /// `object` must be null or point to a live object whose first word is
    /// its dispatch-table pointer.
    pub unsafe fn on_instance_created(&self, type_id: &Uuid, object: usize) {
        if object == 0 {
            return;
        }
        let requests = self.requests.read().clone();
        for request in &requests {
            if let HookRequest::Instance { type_id: t, slot, hook_fn } = request {
                if t == type_id {
                    self.report(request, self.install_instance(object, *slot, *hook_fn));
                }
            }
        }
        self.watchers.instance_created(type_id, object);
    }

    /// Patch `importer`'s import slot for `module!symbol`.
    pub fn install_import(
        &self,
        importer: ModuleHandle,
        module: &str,
        symbol: &str,
        hook_fn: usize,
    ) -> Result<InstallOutcome, HookError> {
        let slot = self.modules.import_slot(importer, module, symbol).ok_or_else(|| {
            HookError::ResolutionFailed(format!("{:#x} does not import {}!{}", importer, module, symbol))
        })?;
        self.registry
            .install(HookTarget::import(importer, module, symbol), hook_fn, || unsafe {
                self.memory.patch_slot(slot, hook_fn)
            })
    }

    /// Point the export entry of `module!symbol` at a trampoline to `hook_fn`.
    pub fn install_export(&self, module: &str, symbol: &str, hook_fn: usize) -> Result<InstallOutcome, HookError> {
        let handle = self
            .modules
            .find_module(module)
            .ok_or_else(|| HookError::ResolutionFailed(format!("{} not loaded", module)))?;
        let export = self
            .modules
            .export_slot(handle, symbol)
            .ok_or_else(|| HookError::ResolutionFailed(format!("{} does not export {}", module, symbol)))?;

        self.registry.install(HookTarget::export(module, symbol), hook_fn, || {
            let current = unsafe { std::ptr::read_volatile(export.rva_slot as *const u32) };
            let original = export.base + current as usize;

            let mut tables = self.trampolines.lock();
            let table = match tables.entry(handle) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v) => v.insert(TrampolineTable::allocate(&*self.memory, DEFAULT_REGION_SIZE, export.base)?),
            };
            let stub = table.emit(&*self.memory, hook_fn, original)?;
            let rva = stub
                .stub
                .checked_sub(export.base)
                .and_then(|d| u32::try_from(d).ok())
                .ok_or_else(|| {
                    HookError::AllocationFailed(format!(
                        "trampoline {:#x} out of RVA range of {:#x}",
                        stub.stub, export.base
                    ))
                })?;

            let old = unsafe { self.memory.patch_rva(export.rva_slot, rva)? };
            Ok(export.base + old as usize)
        })
    }

    /// Patch slot `slot` of `object`'s dispatch table, once per table.
    ///
    /// # Safety
    /// `object` must be null or point to a live object whose first word is
    /// its dispatch-table pointer, and the table must have at least
    /// `slot + 1` entries.
    pub unsafe fn install_instance(&self, object: usize, slot: usize, hook_fn: usize) -> Result<InstallOutcome, HookError> {
        if object == 0 {
            return Err(HookError::ResolutionFailed("null instance".into()));
        }
        let table = *(object as *const usize);
        if table == 0 {
            return Err(HookError::ResolutionFailed(format!("instance {:#x} has no dispatch table", object)));
        }
        let entry = table + slot * std::mem::size_of::<usize>();
        self.registry
            .install(HookTarget::Instance { table, slot }, hook_fn, || self.memory.patch_slot(entry, hook_fn))
    }

    fn apply_module_requests(&self, module: ModuleHandle) -> String {
        let name = self
            .modules
            .module_name(module)
            .map(|n| normalize_module_name(&n))
            .unwrap_or_default();
        let requests = self.requests.read().clone();
        for request in &requests {
            match request {
                HookRequest::Import { .. } => {
                    self.apply_import(module, request);
                }
                HookRequest::Export { module: m, symbol, hook_fn } if *m == name => {
                    self.report(request, self.install_export(m, symbol, *hook_fn));
                }
                _ => {}
            }
        }
        name
    }

    fn apply_import(&self, importer: ModuleHandle, request: &HookRequest) -> bool {
        match request {
            HookRequest::Import { module, symbol, hook_fn } => {
                // a module never imports from itself
                if self.modules.find_module(module) == Some(importer) {
                    return false;
                }
                self.report(request, self.install_import(importer, module, symbol, *hook_fn))
            }
            _ => false,
        }
    }

    /// Log the outcome of one install; `true` if something was installed.
    fn report(&self, request: &HookRequest, result: Result<InstallOutcome, HookError>) -> bool {
        match result {
            Ok(InstallOutcome::Installed) => true,
            Ok(InstallOutcome::AlreadyInstalled) => false,
            Err(HookError::ResolutionFailed(reason)) => {
                log::trace!("deferring {:?}: {}", request, reason);
                false
            }
            Err(e) => {
                log::error!("failed to install {:?}: {}", request, e);
                false
            }
        }
    }
}
