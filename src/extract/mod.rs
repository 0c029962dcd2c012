//! Feature extractors.
//!
//! One extractor per container class; [`extract_leaf`] routes classified
//! content to the right one. Archives go through [`archive::extract_archive`]
//! instead, which expands members and dispatches each leaf back here.

pub mod ar;
pub mod archive;
pub mod dex;
pub mod elf;
pub mod macho;
pub mod manifests;
pub mod pe;
pub mod source;
pub mod strings;

use crate::error::Result;
use crate::features::{Feature, FeatureSet};
use crate::filetype::FileKind;
use std::path::Path;
use strings::extract_strings;

/// Emit a symbol name verbatim, plus a shallow demangling when one applies.
pub(crate) fn push_symbol(name: &str, source: Option<&str>, sink: &mut FeatureSet) {
    if name.is_empty() {
        return;
    }
    let feature = match source {
        Some(s) => Feature::with_source(name, s),
        None => Feature::new(name),
    };
    sink.insert(feature);

    if let Some(demangled) = shallow_demangle(name) {
        let feature = match source {
            Some(s) => Feature::with_source(demangled, s),
            None => Feature::new(demangled),
        };
        sink.insert(feature);
    }
}

/// Shallow Itanium demangle: strip the `_Z`/`__Z` prefix and pull the
/// identifier segments out of a nested-name encoding. Full demangling
/// (templates, substitutions, operators) is deliberately not attempted;
/// anything unexpected returns None and only the mangled form is emitted.
pub(crate) fn shallow_demangle(name: &str) -> Option<String> {
    let rest = name
        .strip_prefix("__Z")
        .or_else(|| name.strip_prefix("_Z"))?;

    let bytes = rest.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0usize;

    if bytes.first() == Some(&b'N') {
        pos += 1;
        // Skip CV qualifiers on member functions.
        while matches!(bytes.get(pos), Some(b'K') | Some(b'V') | Some(b'r')) {
            pos += 1;
        }
        loop {
            match bytes.get(pos) {
                Some(b'E') | None => break,
                Some(c) if c.is_ascii_digit() => {
                    let (segment, next) = read_length_prefixed(rest, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                _ => return None,
            }
        }
    } else if bytes.first().is_some_and(|c| c.is_ascii_digit()) {
        let (segment, _next) = read_length_prefixed(rest, pos)?;
        segments.push(segment);
    } else {
        return None;
    }

    if segments.is_empty() {
        return None;
    }
    Some(segments.join("::"))
}

fn read_length_prefixed(text: &str, pos: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let mut len = 0usize;
    let mut cursor = pos;
    while let Some(c) = bytes.get(cursor) {
        if c.is_ascii_digit() {
            len = len * 10 + (c - b'0') as usize;
            cursor += 1;
        } else {
            break;
        }
    }
    if len == 0 || cursor == pos {
        return None;
    }
    let segment = text.get(cursor..cursor + len)?;
    Some((segment.to_string(), cursor + len))
}

/// Extract features from classified non-archive content.
pub fn extract_leaf(
    path: &Path,
    data: &[u8],
    kind: FileKind,
    source: Option<&str>,
    sink: &mut FeatureSet,
) -> Result<()> {
    match kind {
        FileKind::Elf => {
            elf::extract_elf(path, data, source, sink)?;
            extract_strings(data, source, sink);
        }
        FileKind::Pe => {
            pe::extract_pe(path, data, source, sink)?;
            extract_strings(data, source, sink);
        }
        FileKind::MachO | FileKind::MachOFat => {
            macho::extract_macho(path, data, source, sink)?;
            extract_strings(data, source, sink);
        }
        FileKind::Ar => {
            ar::extract_ar(path, data, sink)?;
        }
        FileKind::Dex => {
            dex::extract_dex(path, data, source, sink)?;
        }
        FileKind::Source(lang) => {
            let content = String::from_utf8_lossy(data);
            source::extract_source(lang, &content, source, sink);
        }
        // No RAR expander in the stack: scan the container bytes raw.
        FileKind::Rar | FileKind::Binary => {
            extract_strings(data, source, sink);
        }
        FileKind::Empty => {}
        // Archives are the walker's job, not a leaf.
        _ => {
            extract_strings(data, source, sink);
        }
    }
    Ok(())
}
