//! Import and export table lookup on a PE image mapped in memory.
//!
//! Tables are parsed by goblin with RVA resolution off: a mapped image is
//! laid out by RVA, not by file offset. Works on raw addresses only, so it
//! can be exercised against synthetic images.

use std::ffi::CStr;
use std::slice;

use goblin::pe::export::ExportAddressTableEntry;
use goblin::pe::header::Header;
use goblin::pe::options::ParseOptions;
use goblin::pe::PE;

use remote_talk_core::hook::module_tables::ExportSlot;

/// The first page of a mapped image holds its headers.
const HEADER_PAGE: usize = 0x1000;

/// A PE image loaded at `base`.
pub struct PeImage<'a> {
    base: usize,
    bytes: &'a [u8],
    pe: PE<'a>,
}

impl<'a> PeImage<'a> {
    /// Parse the headers and tables of the image at `base`.
    ///
    /// # Safety
    /// `base` must be the start of an image that stays mapped for `'a`,
    /// readable for its first page and for the whole `SizeOfImage` it claims.
    pub unsafe fn from_base(base: usize) -> Option<Self> {
        if base == 0 {
            return None;
        }
        let page = slice::from_raw_parts(base as *const u8, HEADER_PAGE);
        let size_of_image = Header::parse(page).ok()?.optional_header?.windows_fields.size_of_image as usize;
        let bytes = slice::from_raw_parts(base as *const u8, size_of_image.max(HEADER_PAGE));

        let mut opts = ParseOptions::default();
        opts.resolve_rva = false;
        opts.parse_attribute_certificates = false;
        match PE::parse_with_opts(bytes, &opts) {
            Ok(pe) => Some(Self { base, bytes, pe }),
            Err(e) => {
                log::debug!("image at {:#x} not parsed: {}", base, e);
                None
            }
        }
    }

    /// Address of the import-address-table slot through which this image
    /// calls `module!symbol`. Imports by ordinal are not matched.
    pub fn import_slot(&self, module: &str, symbol: &str) -> Option<usize> {
        self.pe
            .imports
            .iter()
            // ordinal imports have no hint/name entry
            .find(|import| import.rva != 0 && import.dll.eq_ignore_ascii_case(module) && import.name == symbol)
            .map(|import| self.base + import.offset)
    }

    /// Export-address-table entry of `symbol`.
    ///
    /// Forwarded exports have no code in this image, so they have no slot;
    /// the import strategy reaches them through their callers.
    pub fn export_slot(&self, symbol: &str) -> Option<ExportSlot> {
        let exports = self.pe.export_data.as_ref()?;
        let index = exports
            .export_name_pointer_table
            .iter()
            .position(|&name| self.c_str(name) == Some(symbol))?;
        let ordinal = usize::from(*exports.export_ordinal_table.get(index)?);
        match exports.export_address_table.get(ordinal)? {
            ExportAddressTableEntry::ExportRVA(_) => Some(ExportSlot {
                rva_slot: self.base + exports.export_directory_table.export_address_table_rva as usize + ordinal * 4,
                base: self.base,
            }),
            ExportAddressTableEntry::ForwarderRVA(_) => {
                log::debug!("{} is forwarded, not hooking its export", symbol);
                None
            }
        }
    }

    fn c_str(&self, rva: u32) -> Option<&'a str> {
        let tail = self.bytes.get(rva as usize..)?;
        CStr::from_bytes_until_nul(tail).ok()?.to_str().ok()
    }
}
