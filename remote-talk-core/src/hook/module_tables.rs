use super::target::ModuleHandle;

/// Location of one export-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSlot {
    /// Address of the 32-bit RVA in the export address table.
    pub rva_slot: usize,
    /// Base address the RVA is relative to.
    pub base: usize,
}

/// Read access to the symbol tables of the modules loaded in this process.
///
/// Windows implements this by walking PE headers; tests use in-memory
/// modules.
pub trait ModuleTables: Send + Sync {
    /// Every module currently loaded.
    fn loaded_modules(&self) -> Vec<ModuleHandle>;

    /// Handle of a loaded module by file name, if loaded.
    fn find_module(&self, name: &str) -> Option<ModuleHandle>;

    /// File name of a loaded module (e.g. `dsound.dll`).
    fn module_name(&self, module: ModuleHandle) -> Option<String>;

    /// Address of the pointer-sized import slot through which `importer`
    /// calls `module!symbol`.
    fn import_slot(&self, importer: ModuleHandle, module: &str, symbol: &str) -> Option<usize>;

    /// Export-table entry of `symbol` in `module`.
    fn export_slot(&self, module: ModuleHandle, symbol: &str) -> Option<ExportSlot>;
}
