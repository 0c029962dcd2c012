//! Mach-O symbol extraction via goblin, fat binaries included.

use crate::error::{Result, SnifferError};
use crate::extract::push_symbol;
use crate::features::FeatureSet;
use goblin::mach::{Mach, MachO, SingleArch};
use std::path::Path;

pub fn extract_macho(
    path: &Path,
    data: &[u8],
    source: Option<&str>,
    sink: &mut FeatureSet,
) -> Result<()> {
    match Mach::parse(data).map_err(|e| SnifferError::format("macho", path, e.to_string()))? {
        Mach::Binary(macho) => extract_thin(path, &macho, source, sink),
        Mach::Fat(fat) => {
            // Every slice contributes; symbols are deduplicated downstream.
            for i in 0..fat.narches {
                match fat.get(i) {
                    Ok(SingleArch::MachO(macho)) => {
                        extract_thin(path, &macho, source, sink)?;
                    }
                    Ok(SingleArch::Archive(archive)) => {
                        crate::extract::ar::extract_ar_members(path, &archive, data, source, sink)?;
                    }
                    Err(e) => {
                        return Err(SnifferError::format(
                            "macho-fat",
                            path,
                            format!("slice {i}: {e}"),
                        ));
                    }
                }
                if sink.is_full() {
                    break;
                }
            }
            Ok(())
        }
    }
}

fn extract_thin(
    path: &Path,
    macho: &MachO,
    source: Option<&str>,
    sink: &mut FeatureSet,
) -> Result<()> {
    for sym in macho.symbols() {
        match sym {
            Ok((name, _nlist)) => {
                push_symbol(name, source, sink);
                if sink.is_full() {
                    return Ok(());
                }
            }
            Err(_) => continue, // tolerate damaged nlist entries
        }
    }

    if let Ok(imports) = macho.imports() {
        for import in imports {
            push_symbol(import.name, source, sink);
        }
    }
    if let Ok(exports) = macho.exports() {
        for export in exports {
            push_symbol(&export.name, source, sink);
        }
    }

    for lib in &macho.libs {
        // First entry is the binary's own install name marker "self".
        if *lib != "self" {
            push_symbol(lib, source, sink);
        }
    }

    for segment in &macho.segments {
        if let Ok(sections) = segment.sections() {
            for (section, _data) in sections {
                if let Ok(name) = section.name() {
                    push_symbol(name, source, sink);
                }
            }
        }
    }

    let _ = path;
    Ok(())
}
