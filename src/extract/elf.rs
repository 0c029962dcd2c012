//! ELF symbol extraction via goblin.

use crate::error::{Result, SnifferError};
use crate::extract::push_symbol;
use crate::features::FeatureSet;
use goblin::elf::Elf;
use std::path::Path;

/// Enumerate dynamic symbols, regular symbols, and section names. Raw
/// string scanning of the whole file is the caller's job; this pass covers
/// the structured tables only.
pub fn extract_elf(path: &Path, data: &[u8], source: Option<&str>, sink: &mut FeatureSet) -> Result<()> {
    let elf = Elf::parse(data)
        .map_err(|e| SnifferError::format("elf", path, e.to_string()))?;

    for sym in &elf.dynsyms {
        if let Some(name) = elf.dynstrtab.get_at(sym.st_name) {
            push_symbol(name, source, sink);
        }
        if sink.is_full() {
            return Ok(());
        }
    }

    for sym in &elf.syms {
        if let Some(name) = elf.strtab.get_at(sym.st_name) {
            push_symbol(name, source, sink);
        }
        if sink.is_full() {
            return Ok(());
        }
    }

    // Library dependencies are strong component hints on their own.
    for lib in &elf.libraries {
        push_symbol(lib, source, sink);
    }

    for header in &elf.section_headers {
        if let Some(name) = elf.shdr_strtab.get_at(header.sh_name) {
            if !name.is_empty() {
                push_symbol(name, source, sink);
            }
        }
    }

    Ok(())
}
