//! PE import/export extraction via goblin.

use crate::error::{Result, SnifferError};
use crate::extract::push_symbol;
use crate::features::FeatureSet;
use goblin::pe::PE;
use std::path::Path;

pub fn extract_pe(path: &Path, data: &[u8], source: Option<&str>, sink: &mut FeatureSet) -> Result<()> {
    let pe = PE::parse(data).map_err(|e| SnifferError::format("pe", path, e.to_string()))?;

    for import in &pe.imports {
        push_symbol(&import.name, source, sink);
        push_symbol(&import.dll, source, sink);
        if sink.is_full() {
            return Ok(());
        }
    }

    for export in &pe.exports {
        if let Some(name) = export.name {
            push_symbol(name, source, sink);
        }
        if sink.is_full() {
            return Ok(());
        }
    }

    for section in &pe.sections {
        if let Ok(name) = section.name() {
            if !name.is_empty() {
                push_symbol(name, source, sink);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn mz_without_pe_header_is_format_error() {
        let mut sink = FeatureSet::new(100);
        let err = extract_pe(&PathBuf::from("bad.exe"), b"MZ\x90\x00only-a-stub", None, &mut sink)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatError);
    }
}
