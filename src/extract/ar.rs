//! Static-library (`ar`) extraction.
//!
//! Each member object is parsed individually; everything emitted from a
//! member is annotated `member:<object-name>` so match evidence can point
//! at the object that produced it.

use crate::error::{Result, SnifferError};
use crate::extract::strings::extract_strings;
use crate::features::FeatureSet;
use goblin::archive::Archive;
use std::path::Path;
use tracing::debug;

pub fn extract_ar(path: &Path, data: &[u8], sink: &mut FeatureSet) -> Result<()> {
    let archive =
        Archive::parse(data).map_err(|e| SnifferError::format("ar", path, e.to_string()))?;
    extract_ar_members(path, &archive, data, None, sink)
}

pub fn extract_ar_members(
    path: &Path,
    archive: &Archive,
    data: &[u8],
    outer_source: Option<&str>,
    sink: &mut FeatureSet,
) -> Result<()> {
    let mut members = archive.members();
    members.sort_unstable();

    for member in members {
        if sink.is_full() {
            break;
        }
        let bytes = match archive.extract(member, data) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(member, error = %e, "skipping unreadable archive member");
                continue;
            }
        };

        let annotation = match outer_source {
            Some(outer) => format!("{outer}!member:{member}"),
            None => format!("member:{member}"),
        };

        // Member objects are usually relocatable ELF or Mach-O; fall back to
        // a raw string scan for anything goblin cannot parse.
        let parsed = if bytes.starts_with(b"\x7fELF") {
            crate::extract::elf::extract_elf(path, bytes, Some(&annotation), sink).is_ok()
        } else if bytes.len() >= 4
            && matches!(
                [bytes[0], bytes[1], bytes[2], bytes[3]],
                [0xfe, 0xed, 0xfa, 0xce]
                    | [0xfe, 0xed, 0xfa, 0xcf]
                    | [0xce, 0xfa, 0xed, 0xfe]
                    | [0xcf, 0xfa, 0xed, 0xfe]
            )
        {
            crate::extract::macho::extract_macho(path, bytes, Some(&annotation), sink).is_ok()
        } else {
            false
        };

        if !parsed {
            extract_strings(bytes, Some(&annotation), sink);
        }
    }
    Ok(())
}
