//! Android DEX extraction.
//!
//! Reads the header and the string / type / method id tables directly.
//! Bytecode is never decoded. Offsets are bounds-checked everywhere; a
//! truncated or hostile table yields a FormatError, not a panic.

use crate::error::{Result, SnifferError};
use crate::features::{Feature, FeatureSet};
use std::path::Path;

const HEADER_SIZE: usize = 0x70;
/// Caps keep a hostile header from turning into an allocation bomb.
const MAX_TABLE_ENTRIES: u32 = 1_000_000;

struct DexTables {
    string_ids_size: u32,
    string_ids_off: u32,
    type_ids_size: u32,
    type_ids_off: u32,
    method_ids_size: u32,
    method_ids_off: u32,
}

pub fn extract_dex(path: &Path, data: &[u8], source: Option<&str>, sink: &mut FeatureSet) -> Result<()> {
    let tables = parse_header(path, data)?;

    // String table first: everything else indexes into it.
    let strings = read_string_table(data, &tables);
    for s in &strings {
        push(s, source, sink);
        if sink.is_full() {
            return Ok(());
        }
    }

    // Type descriptors, both raw (`Lcom/foo/Bar;`) and dotted.
    for i in 0..tables.type_ids_size {
        let off = tables.type_ids_off as usize + i as usize * 4;
        let Some(descriptor_idx) = read_u32(data, off) else { break };
        if let Some(descriptor) = strings.get(descriptor_idx as usize) {
            push(descriptor, source, sink);
            if let Some(dotted) = descriptor_to_class_name(descriptor) {
                push(&dotted, source, sink);
            }
        }
        if sink.is_full() {
            return Ok(());
        }
    }

    // Method names via method_id_item.name_idx.
    for i in 0..tables.method_ids_size {
        let off = tables.method_ids_off as usize + i as usize * 8;
        let Some(name_idx) = read_u32(data, off + 4) else { break };
        if let Some(name) = strings.get(name_idx as usize) {
            push(name, source, sink);
        }
        if sink.is_full() {
            return Ok(());
        }
    }

    Ok(())
}

fn parse_header(path: &Path, data: &[u8]) -> Result<DexTables> {
    if data.len() < HEADER_SIZE || !data.starts_with(b"dex\n") {
        return Err(SnifferError::format("dex", path, "missing or short DEX header"));
    }
    let tables = DexTables {
        string_ids_size: read_u32(data, 0x38).unwrap_or(0),
        string_ids_off: read_u32(data, 0x3c).unwrap_or(0),
        type_ids_size: read_u32(data, 0x40).unwrap_or(0),
        type_ids_off: read_u32(data, 0x44).unwrap_or(0),
        method_ids_size: read_u32(data, 0x58).unwrap_or(0),
        method_ids_off: read_u32(data, 0x5c).unwrap_or(0),
    };
    if tables.string_ids_size > MAX_TABLE_ENTRIES
        || tables.type_ids_size > MAX_TABLE_ENTRIES
        || tables.method_ids_size > MAX_TABLE_ENTRIES
    {
        return Err(SnifferError::format("dex", path, "implausible table sizes"));
    }
    Ok(tables)
}

fn read_string_table(data: &[u8], tables: &DexTables) -> Vec<String> {
    let mut strings = Vec::with_capacity(tables.string_ids_size as usize);
    for i in 0..tables.string_ids_size {
        let id_off = tables.string_ids_off as usize + i as usize * 4;
        let Some(data_off) = read_u32(data, id_off) else { break };
        strings.push(read_string_data(data, data_off as usize).unwrap_or_default());
    }
    strings
}

/// string_data_item: uleb128 utf16 length, then MUTF-8 bytes, NUL-terminated.
fn read_string_data(data: &[u8], offset: usize) -> Option<String> {
    let (_utf16_len, consumed) = read_uleb128(data, offset)?;
    let start = offset + consumed;
    let end = data[start..].iter().position(|&b| b == 0).map(|p| start + p)?;
    // MUTF-8 differs from UTF-8 only in NUL and surrogate encoding; lossy
    // decoding is fine for feature extraction.
    Some(String::from_utf8_lossy(&data[start..end]).into_owned())
}

fn read_uleb128(data: &[u8], offset: usize) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.get(offset..)?.iter().take(5).enumerate() {
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
        shift += 7;
    }
    None
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// `Lcom/example/Codec;` → `com.example.Codec`.
fn descriptor_to_class_name(descriptor: &str) -> Option<String> {
    let inner = descriptor.strip_prefix('L')?.strip_suffix(';')?;
    if inner.is_empty() {
        return None;
    }
    Some(inner.replace('/', "."))
}

fn push(text: &str, source: Option<&str>, sink: &mut FeatureSet) {
    let feature = match source {
        Some(s) => Feature::with_source(text, s),
        None => Feature::new(text),
    };
    sink.insert(feature);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Build a minimal DEX with a two-entry string table, one type, one
    /// method referencing string 1.
    fn build_dex(strings: &[&str]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        out[..8].copy_from_slice(b"dex\n035\0");

        let string_ids_off = out.len() as u32;
        let mut id_slots = Vec::new();
        let mut string_data = Vec::new();
        let data_base = string_ids_off as usize + strings.len() * 4;
        for s in strings {
            id_slots.push((data_base + string_data.len()) as u32);
            string_data.push(s.len() as u8); // uleb128, short strings only
            string_data.extend_from_slice(s.as_bytes());
            string_data.push(0);
        }
        for slot in &id_slots {
            out.extend_from_slice(&slot.to_le_bytes());
        }
        out.extend_from_slice(&string_data);

        // type_ids: one entry pointing at string 0
        let type_ids_off = out.len() as u32;
        out.extend_from_slice(&0u32.to_le_bytes());

        // method_ids: one entry, name_idx = 1
        let method_ids_off = out.len() as u32;
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());

        out[0x38..0x3c].copy_from_slice(&(strings.len() as u32).to_le_bytes());
        out[0x3c..0x40].copy_from_slice(&string_ids_off.to_le_bytes());
        out[0x40..0x44].copy_from_slice(&1u32.to_le_bytes());
        out[0x44..0x48].copy_from_slice(&type_ids_off.to_le_bytes());
        out[0x58..0x5c].copy_from_slice(&1u32.to_le_bytes());
        out[0x5c..0x60].copy_from_slice(&method_ids_off.to_le_bytes());
        out
    }

    #[test]
    fn reads_string_type_and_method_tables() {
        let dex = build_dex(&["Lcom/example/video/Encoder;", "nativeEncodeFrame"]);
        let mut sink = FeatureSet::new(1000);
        extract_dex(&PathBuf::from("classes.dex"), &dex, None, &mut sink).unwrap();

        let texts: Vec<&str> = sink.iter().map(|f| f.text.as_str()).collect();
        assert!(texts.contains(&"Lcom/example/video/Encoder;"));
        assert!(texts.contains(&"com.example.video.Encoder"));
        assert!(texts.contains(&"nativeEncodeFrame"));
    }

    #[test]
    fn short_header_is_format_error() {
        let mut sink = FeatureSet::new(10);
        let err =
            extract_dex(&PathBuf::from("x.dex"), b"dex\n035\0short", None, &mut sink).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatError);
    }

    #[test]
    fn hostile_table_sizes_rejected() {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..8].copy_from_slice(b"dex\n035\0");
        data[0x38..0x3c].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut sink = FeatureSet::new(10);
        assert!(extract_dex(&PathBuf::from("x.dex"), &data, None, &mut sink).is_err());
    }
}
