use uuid::Uuid;

/// Opaque handle of a loaded module (its base address on Windows).
pub type ModuleHandle = usize;

/// Module names compare case-insensitively, the way the Windows loader does.
pub fn normalize_module_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// One concrete redirectable slot.
///
/// At most one redirection is ever active per target; installing an
/// installed target is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookTarget {
    /// The import-table slot through which `importer` calls `module!symbol`.
    Import {
        importer: ModuleHandle,
        module: String,
        symbol: String,
    },
    /// The export-table entry of `module!symbol`.
    Export { module: String, symbol: String },
    /// Slot `slot` of the dispatch table at address `table`.
    Instance { table: usize, slot: usize },
}

/// Identity of the function whose original entry a hook must forward to.
///
/// Every import slot and the export entry for the same symbol share one
/// original; dispatch slots have one original per table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OriginalKey {
    Symbol { module: String, symbol: String },
    Method { table: usize, slot: usize },
}

impl HookTarget {
    pub fn import(importer: ModuleHandle, module: &str, symbol: &str) -> Self {
        Self::Import {
            importer,
            module: normalize_module_name(module),
            symbol: symbol.to_string(),
        }
    }

    pub fn export(module: &str, symbol: &str) -> Self {
        Self::Export {
            module: normalize_module_name(module),
            symbol: symbol.to_string(),
        }
    }

    pub fn original_key(&self) -> OriginalKey {
        match self {
            Self::Import { module, symbol, .. } | Self::Export { module, symbol } => OriginalKey::Symbol {
                module: module.clone(),
                symbol: symbol.clone(),
            },
            Self::Instance { table, slot } => OriginalKey::Method {
                table: *table,
                slot: *slot,
            },
        }
    }
}

impl OriginalKey {
    pub fn symbol(module: &str, symbol: &str) -> Self {
        Self::Symbol {
            module: normalize_module_name(module),
            symbol: symbol.to_string(),
        }
    }
}

/// A registration kept by the installer and re-applied by the lifecycle
/// watchers whenever a matching module or instance appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookRequest {
    /// Redirect calls every loaded (and later loaded) module makes to
    /// `module!symbol` through its own import table.
    Import {
        module: String,
        symbol: String,
        hook_fn: usize,
    },
    /// Redirect `module!symbol` in the module's export table through a
    /// trampoline, catching callers that resolve the export directly.
    Export {
        module: String,
        symbol: String,
        hook_fn: usize,
    },
    /// Redirect dispatch slot `slot` for every instance of class `type_id`.
    Instance { type_id: Uuid, slot: usize, hook_fn: usize },
}

impl HookRequest {
    pub fn import(module: &str, symbol: &str, hook_fn: usize) -> Self {
        Self::Import {
            module: normalize_module_name(module),
            symbol: symbol.to_string(),
            hook_fn,
        }
    }

    pub fn export(module: &str, symbol: &str, hook_fn: usize) -> Self {
        Self::Export {
            module: normalize_module_name(module),
            symbol: symbol.to_string(),
            hook_fn,
        }
    }

    pub fn instance(type_id: Uuid, slot: usize, hook_fn: usize) -> Self {
        Self::Instance { type_id, slot, hook_fn }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_and_export_share_original() {
        let import = HookTarget::import(0x1000, "DSOUND.dll", "DirectSoundCreate8");
        let export = HookTarget::export("dsound.DLL", "DirectSoundCreate8");
        assert_ne!(import, export);
        assert_eq!(import.original_key(), export.original_key());
        assert_eq!(import.original_key(), OriginalKey::symbol("dsound.dll", "DirectSoundCreate8"));
    }

    #[test]
    fn instance_original_is_per_table() {
        let a = HookTarget::Instance { table: 0x10, slot: 19 };
        let b = HookTarget::Instance { table: 0x20, slot: 19 };
        assert_ne!(a.original_key(), b.original_key());
    }
}
