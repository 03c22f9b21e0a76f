use std::path::Path;

use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::GetModuleFileNameW;
use windows::Win32::System::ProcessStatus::K32EnumProcessModules;
use windows::Win32::System::Threading::GetCurrentProcess;

use remote_talk_core::hook::module_tables::{ExportSlot, ModuleTables};
use remote_talk_core::hook::target::{normalize_module_name, ModuleHandle};

use crate::pe_image::PeImage;

/// The modules loaded in the current process, read through their PE tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessModules;

impl ProcessModules {
    fn image<'a>(module: ModuleHandle) -> Option<PeImage<'a>> {
        // module handles are image bases
        unsafe { PeImage::from_base(module) }
    }
}

impl ModuleTables for ProcessModules {
    fn loaded_modules(&self) -> Vec<ModuleHandle> {
        let mut handles = vec![HMODULE::default(); 256];
        loop {
            let capacity = (handles.len() * std::mem::size_of::<HMODULE>()) as u32;
            let mut needed = 0u32;
            let listed = unsafe { K32EnumProcessModules(GetCurrentProcess(), handles.as_mut_ptr(), capacity, &mut needed) };
            if let Err(e) = listed {
                log::warn!("EnumProcessModules failed: {}", e);
                return Vec::new();
            }
            let count = needed as usize / std::mem::size_of::<HMODULE>();
            if needed <= capacity {
                handles.truncate(count);
                return handles.into_iter().map(|h| h.0 as usize).collect();
            }
            // more modules loaded than fit; retry with room to spare
            handles.resize(count + 32, HMODULE::default());
        }
    }

    fn find_module(&self, name: &str) -> Option<ModuleHandle> {
        let name = normalize_module_name(name);
        self.loaded_modules()
            .into_iter()
            .find(|&module| self.module_name(module).as_deref() == Some(name.as_str()))
    }

    fn module_name(&self, module: ModuleHandle) -> Option<String> {
        let mut path = [0u16; 1024];
        let len = unsafe { GetModuleFileNameW(Some(HMODULE(module as *mut _)), &mut path) } as usize;
        if len == 0 {
            return None;
        }
        let path = String::from_utf16_lossy(&path[..len]);
        Path::new(&path)
            .file_name()
            .map(|file| normalize_module_name(&file.to_string_lossy()))
    }

    fn import_slot(&self, importer: ModuleHandle, module: &str, symbol: &str) -> Option<usize> {
        Self::image(importer)?.import_slot(module, symbol)
    }

    fn export_slot(&self, module: ModuleHandle, symbol: &str) -> Option<ExportSlot> {
        Self::image(module)?.export_slot(symbol)
    }
}
