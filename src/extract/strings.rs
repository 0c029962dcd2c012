//! Printable-string extraction from raw bytes.
//!
//! Scans for runs of printable ASCII and UTF-16LE, preserving the original
//! content verbatim. Also emits a small set of synthetic features for
//! byte-aligned tokens the signature corpus is known to key on (codec
//! fourcc identifiers, MIME type substrings).

use crate::config::{MAX_STRINGS_PER_FILE, MAX_STRING_LENGTH, MIN_STRING_LENGTH};
use crate::features::{Feature, FeatureSet};

/// Extract printable strings from `data` into `sink`. `source` annotates
/// archive members. Stops early once the per-file cap or the sink cap is
/// reached.
pub fn extract_strings(data: &[u8], source: Option<&str>, sink: &mut FeatureSet) {
    let mut emitted = 0usize;
    scan_ascii(data, source, sink, &mut emitted);
    if emitted < MAX_STRINGS_PER_FILE && !sink.is_full() {
        scan_utf16le(data, source, sink, &mut emitted);
    }
    if emitted < MAX_STRINGS_PER_FILE && !sink.is_full() {
        emit_synthetic(data, source, sink, &mut emitted);
    }
}

fn push(
    text: &str,
    source: Option<&str>,
    sink: &mut FeatureSet,
    emitted: &mut usize,
) -> bool {
    if *emitted >= MAX_STRINGS_PER_FILE || sink.is_full() {
        return false;
    }
    let feature = match source {
        Some(s) => Feature::with_source(text, s),
        None => Feature::new(text),
    };
    if sink.insert(feature) {
        *emitted += 1;
    }
    true
}

fn is_printable(byte: u8) -> bool {
    (0x20..0x7f).contains(&byte) || byte == b'\t'
}

fn scan_ascii(data: &[u8], source: Option<&str>, sink: &mut FeatureSet, emitted: &mut usize) {
    let mut run_start = 0usize;
    let mut run_len = 0usize;
    for (i, &byte) in data.iter().enumerate() {
        if is_printable(byte) {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            // Overlong runs are split at the cap rather than discarded.
            if run_len == MAX_STRING_LENGTH {
                let text = std::str::from_utf8(&data[run_start..i + 1]).unwrap_or_default();
                if !push(text, source, sink, emitted) {
                    return;
                }
                run_len = 0;
            }
        } else {
            if run_len >= MIN_STRING_LENGTH {
                let text = std::str::from_utf8(&data[run_start..run_start + run_len])
                    .unwrap_or_default();
                if !push(text, source, sink, emitted) {
                    return;
                }
            }
            run_len = 0;
        }
    }
    if run_len >= MIN_STRING_LENGTH {
        let text =
            std::str::from_utf8(&data[run_start..run_start + run_len]).unwrap_or_default();
        push(text, source, sink, emitted);
    }
}

/// UTF-16LE: printable ASCII low bytes interleaved with NULs, as produced by
/// Windows binaries and Android resource tables.
fn scan_utf16le(data: &[u8], source: Option<&str>, sink: &mut FeatureSet, emitted: &mut usize) {
    let mut run = String::new();
    let mut i = 0usize;
    while i + 1 < data.len() {
        let lo = data[i];
        let hi = data[i + 1];
        if hi == 0 && is_printable(lo) {
            run.push(lo as char);
            if run.len() == MAX_STRING_LENGTH {
                if !push(&run, source, sink, emitted) {
                    return;
                }
                run.clear();
            }
            i += 2;
        } else {
            if run.len() >= MIN_STRING_LENGTH && !push(&run, source, sink, emitted) {
                return;
            }
            run.clear();
            // Resynchronize one byte at a time so unaligned runs are found.
            i += 1;
        }
    }
    if run.len() >= MIN_STRING_LENGTH {
        push(&run, source, sink, emitted);
    }
}

/// Codec fourcc identifiers commonly present as bare four-byte tokens.
const FOURCC_TOKENS: &[&[u8]] = &[
    b"avc1", b"avc3", b"hvc1", b"hev1", b"mp4a", b"mp4v", b"av01", b"vp08", b"vp09",
    b"opus", b"alac", b"flac", b"dvh1", b"encv",
];

const MIME_PREFIXES: &[&str] = &["video/", "audio/", "application/", "image/", "text/"];

/// Emit dotted fourcc identifiers found at 4-byte alignment, and MIME-type
/// substrings wherever they occur. Both classes match signature corpora even
/// when the surrounding bytes are not printable.
fn emit_synthetic(data: &[u8], source: Option<&str>, sink: &mut FeatureSet, emitted: &mut usize) {
    for offset in (0..data.len().saturating_sub(4)).step_by(4) {
        let window = &data[offset..offset + 4];
        for token in FOURCC_TOKENS {
            if window == *token {
                let tag = format!(".{}", String::from_utf8_lossy(token));
                if !push(&tag, source, sink, emitted) {
                    return;
                }
            }
        }
    }

    // MIME substrings inside otherwise-unprintable regions were already
    // collected by the ASCII pass; this catches types packed tightly against
    // binary data by re-scanning printable tails after each prefix.
    for prefix in MIME_PREFIXES {
        let needle = prefix.as_bytes();
        let mut start = 0usize;
        while let Some(pos) = find(&data[start..], needle) {
            let abs = start + pos;
            let end = data[abs..]
                .iter()
                .take(MAX_STRING_LENGTH)
                .position(|&b| !is_printable(b) || b == b' ')
                .map(|off| abs + off)
                .unwrap_or_else(|| data.len().min(abs + MAX_STRING_LENGTH));
            if end - abs > needle.len() {
                let text = String::from_utf8_lossy(&data[abs..end]).into_owned();
                if !push(&text, source, sink, emitted) {
                    return;
                }
            }
            start = abs + needle.len();
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(data: &[u8]) -> Vec<String> {
        let mut sink = FeatureSet::new(10_000);
        extract_strings(data, None, &mut sink);
        sink.iter().map(|f| f.text.clone()).collect()
    }

    #[test]
    fn finds_ascii_runs() {
        let data = b"\x00\x01png_create_read_struct\x00\xfflibpng version 1.6.37\x00";
        let found = extract(data);
        assert!(found.contains(&"png_create_read_struct".to_string()));
        assert!(found.contains(&"libpng version 1.6.37".to_string()));
    }

    #[test]
    fn short_runs_dropped() {
        let found = extract(b"\x00ab\x00xy\x01");
        assert!(found.is_empty());
    }

    #[test]
    fn finds_utf16le_runs() {
        let mut data = vec![0xde, 0xad];
        for ch in "x264_encoder_open".bytes() {
            data.push(ch);
            data.push(0);
        }
        data.push(0xbe);
        let found = extract(&data);
        assert!(found.contains(&"x264_encoder_open".to_string()));
    }

    #[test]
    fn emits_aligned_fourcc() {
        let mut data = vec![0u8; 16];
        data[8..12].copy_from_slice(b"avc1");
        let found = extract(&data);
        assert!(found.contains(&".avc1".to_string()));
    }

    #[test]
    fn emits_mime_substring() {
        let data = b"\x00\x01video/x-h265\x00\x02";
        let found = extract(data);
        assert!(found.iter().any(|s| s == "video/x-h265"));
    }

    #[test]
    fn preserves_punctuation() {
        let found = extract(b"\x00/usr/lib/libavcodec.so.58\x00");
        assert!(found.contains(&"/usr/lib/libavcodec.so.58".to_string()));
    }
}
