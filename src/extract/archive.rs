//! Archive expansion and member walking.
//!
//! Archives are expanded into a per-analysis scratch directory, then walked
//! in lexicographic member order. Each non-archive leaf is dispatched back
//! through the leaf extractors; nested archives recurse under the depth cap.
//! Expansion is guarded against bombs: member count, per-member size, and
//! total decompressed size are all bounded, and entry paths are sanitized.

use crate::config::{MAX_ARCHIVE_MEMBERS, MAX_ARCHIVE_TOTAL_SIZE, MAX_MEMBER_SIZE};
use crate::engine::Deadline;
use crate::error::{Result, SnifferError};
use crate::features::FeatureSet;
use crate::filetype::{detect_file_kind, Compression, FileKind};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Aggregated facts about the walk, consumed by the context filter and the
/// result annotations.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// Leaves that were native executables/libraries.
    pub native_members: usize,
    /// All leaves visited.
    pub members_seen: usize,
    /// Human-readable notes (cap hits, unreadable members).
    pub notes: Vec<String>,
}

struct ExpansionGuard {
    files: usize,
    bytes: u64,
}

impl ExpansionGuard {
    fn new() -> Self {
        Self { files: 0, bytes: 0 }
    }

    fn admit_file(&mut self) -> bool {
        self.files += 1;
        self.files <= MAX_ARCHIVE_MEMBERS
    }

    fn admit_bytes(&mut self, len: u64) -> bool {
        if len > MAX_MEMBER_SIZE {
            return false;
        }
        self.bytes += len;
        self.bytes <= MAX_ARCHIVE_TOTAL_SIZE
    }
}

/// Expand `path` (classified as `kind`) and extract features from every
/// member. `prefix` carries the outer archive path for nested annotations.
#[allow(clippy::too_many_arguments)]
pub fn extract_archive(
    path: &Path,
    kind: FileKind,
    prefix: Option<&str>,
    depth: usize,
    recursion_cap: usize,
    deadline: &Deadline,
    sink: &mut FeatureSet,
    outcome: &mut WalkOutcome,
) -> Result<()> {
    deadline.check()?;

    let scratch = tempfile::TempDir::new()
        .map_err(|e| SnifferError::io(path, e))?;
    let mut guard = ExpansionGuard::new();

    let expanded = match kind {
        FileKind::Zip => expand_zip(path, scratch.path(), &mut guard),
        FileKind::Tar(compression) => expand_tar(path, scratch.path(), compression, &mut guard),
        FileKind::SevenZ => expand_sevenz(path, scratch.path()),
        FileKind::Deb => expand_ar_members(path, scratch.path(), &mut guard),
        FileKind::Rpm => expand_rpm(path, scratch.path(), &mut guard),
        FileKind::Cpio => {
            let data = fs::read(path).map_err(|e| SnifferError::io(path, e))?;
            expand_cpio(path, &data, scratch.path(), &mut guard)
        }
        FileKind::Zstd => expand_zstd(path, scratch.path(), &mut guard),
        other => {
            return Err(SnifferError::format(
                other.tag(),
                path,
                "not an expandable archive",
            ))
        }
    };
    if let Err(e) = expanded {
        // A truncated archive still yields whatever was expanded before the
        // failure; record the problem and walk what we have.
        outcome.notes.push(format!("partial expansion: {e}"));
    }
    if guard.files > MAX_ARCHIVE_MEMBERS {
        outcome
            .notes
            .push(format!("member cap reached ({MAX_ARCHIVE_MEMBERS}), tail ignored"));
    }

    walk_extracted(
        scratch.path(),
        prefix,
        depth,
        recursion_cap,
        deadline,
        sink,
        outcome,
    )
    // scratch dropped here; release is deterministic on every exit path.
}

/// Visit extracted files in lexicographic relative order.
fn walk_extracted(
    root: &Path,
    prefix: Option<&str>,
    depth: usize,
    recursion_cap: usize,
    deadline: &Deadline,
    sink: &mut FeatureSet,
    outcome: &mut WalkOutcome,
) -> Result<()> {
    let mut members: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .collect();
    members.sort_by_key(|p| relative_name(root, p));

    for member in members {
        deadline.check()?;
        if sink.is_full() {
            break;
        }

        let relative = relative_name(root, &member);
        let annotation = match prefix {
            Some(outer) => format!("{outer}!{relative}"),
            None => relative.clone(),
        };

        let data = match fs::read(&member) {
            Ok(data) => data,
            Err(e) => {
                outcome.notes.push(format!("{annotation}: unreadable ({e})"));
                continue;
            }
        };

        outcome.members_seen += 1;
        let kind = detect_file_kind(&member, &data);
        if kind.is_native_binary() {
            outcome.native_members += 1;
        }

        if crate::extract::manifests::is_recognized_manifest(&relative) {
            crate::extract::manifests::extract_manifest(&annotation, &data, sink);
        }

        if kind.is_archive() {
            if depth + 1 >= recursion_cap {
                debug!(member = %annotation, depth, "recursion cap reached, not descending");
                outcome
                    .notes
                    .push(format!("{annotation}: nested archive beyond depth cap"));
                continue;
            }
            let nested = extract_archive(
                &member,
                kind,
                Some(&annotation),
                depth + 1,
                recursion_cap,
                deadline,
                sink,
                outcome,
            );
            if let Err(e) = nested {
                if !e.is_recoverable() {
                    return Err(e);
                }
                if matches!(e, SnifferError::Timeout { .. }) {
                    return Err(e);
                }
                outcome.notes.push(format!("{annotation}: {e}"));
            }
            continue;
        }

        if let Err(e) = crate::extract::extract_leaf(&member, &data, kind, Some(&annotation), sink)
        {
            // Malformed members degrade to a raw string scan.
            debug!(member = %annotation, error = %e, "leaf parse failed, falling back to strings");
            outcome.notes.push(format!("{annotation}: {e}"));
            crate::extract::strings::extract_strings(&data, Some(&annotation), sink);
        }
    }
    Ok(())
}

fn relative_name(root: &Path, member: &Path) -> String {
    member
        .strip_prefix(root)
        .unwrap_or(member)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Reject absolute paths and traversal components (zip slip).
fn sanitize_entry_path(entry_name: &str, dest: &Path) -> Option<PathBuf> {
    let path = Path::new(entry_name);
    if path.is_absolute() {
        return None;
    }
    let mut result = dest.to_path_buf();
    for component in path.components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => return None,
        }
    }
    result.starts_with(dest).then_some(result)
}

fn write_member(dest: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, data)
}

fn expand_zip(path: &Path, dest: &Path, guard: &mut ExpansionGuard) -> Result<()> {
    let file = File::open(path).map_err(|e| SnifferError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| SnifferError::format("zip", path, e.to_string()))?;

    for i in 0..archive.len() {
        if !guard.admit_file() {
            break;
        }
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(index = i, error = %e, "unreadable zip entry");
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(out) = sanitize_entry_path(&name, dest) else {
            warn!(entry = %name, "zip entry path rejected");
            continue;
        };
        if !guard.admit_bytes(entry.size()) {
            warn!(entry = %name, size = entry.size(), "zip entry exceeds limits");
            continue;
        }
        let mut data = Vec::with_capacity(entry.size().min(MAX_MEMBER_SIZE) as usize);
        let mut limited = (&mut entry).take(MAX_MEMBER_SIZE);
        if limited.read_to_end(&mut data).is_err() {
            continue;
        }
        write_member(&out, &data).map_err(|e| SnifferError::io(&out, e))?;
    }
    Ok(())
}

fn expand_tar(
    path: &Path,
    dest: &Path,
    compression: Compression,
    guard: &mut ExpansionGuard,
) -> Result<()> {
    let file = File::open(path).map_err(|e| SnifferError::io(path, e))?;
    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
        Compression::Zstd => Box::new(
            zstd::stream::read::Decoder::new(file)
                .map_err(|e| SnifferError::format("tar.zst", path, e.to_string()))?,
        ),
    };

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| SnifferError::format("tar", path, e.to_string()))?;
    for entry in entries {
        if !guard.admit_file() {
            break;
        }
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => return Err(SnifferError::format("tar", path, e.to_string())),
        };
        let entry_type = entry.header().entry_type();
        // Symlinks and hardlinks are never followed; a cyclic link farm
        // degrades to nothing instead of an infinite walk.
        if !entry_type.is_file() {
            continue;
        }
        let name = match entry.path() {
            Ok(p) => p.to_string_lossy().into_owned(),
            Err(_) => continue,
        };
        let Some(out) = sanitize_entry_path(&name, dest) else {
            warn!(entry = %name, "tar entry path rejected");
            continue;
        };
        let size = entry.header().size().unwrap_or(0);
        if !guard.admit_bytes(size) {
            warn!(entry = %name, size, "tar entry exceeds limits");
            continue;
        }
        let mut data = Vec::new();
        let mut limited = (&mut entry).take(MAX_MEMBER_SIZE);
        if limited.read_to_end(&mut data).is_err() {
            continue;
        }
        write_member(&out, &data).map_err(|e| SnifferError::io(&out, e))?;
    }
    Ok(())
}

fn expand_sevenz(path: &Path, dest: &Path) -> Result<()> {
    sevenz_rust::decompress_file(path, dest)
        .map_err(|e| SnifferError::format("7z", path, e.to_string()))
}

/// `ar`-wrapped formats (.deb): write each member out and let recursion
/// handle the inner data.tar.* archives.
fn expand_ar_members(path: &Path, dest: &Path, guard: &mut ExpansionGuard) -> Result<()> {
    let data = fs::read(path).map_err(|e| SnifferError::io(path, e))?;
    let archive = goblin::archive::Archive::parse(&data)
        .map_err(|e| SnifferError::format("ar", path, e.to_string()))?;
    let mut members = archive.members();
    members.sort_unstable();
    for member in members {
        if !guard.admit_file() {
            break;
        }
        let Ok(bytes) = archive.extract(member, &data) else { continue };
        if !guard.admit_bytes(bytes.len() as u64) {
            continue;
        }
        let Some(out) = sanitize_entry_path(member, dest) else { continue };
        write_member(&out, bytes).map_err(|e| SnifferError::io(&out, e))?;
    }
    Ok(())
}

/// RPM: skip the lead and header sections by scanning for the payload's
/// compression magic, then decompress the cpio payload for recursion.
fn expand_rpm(path: &Path, dest: &Path, guard: &mut ExpansionGuard) -> Result<()> {
    const LEAD_SIZE: usize = 96;
    let data = fs::read(path).map_err(|e| SnifferError::io(path, e))?;
    if data.len() <= LEAD_SIZE {
        return Err(SnifferError::format("rpm", path, "truncated lead"));
    }

    let payload_start = (LEAD_SIZE..data.len().saturating_sub(4)).find(|&i| {
        data[i..].starts_with(&[0x1f, 0x8b])
            || data[i..].starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
            || data[i..].starts_with(&[0x28, 0xb5, 0x2f, 0xfd])
    });
    let Some(start) = payload_start else {
        return Err(SnifferError::format("rpm", path, "no recognizable payload"));
    };

    let compressed = &data[start..];
    let mut payload = Vec::new();
    let result: std::io::Result<u64> = if compressed.starts_with(&[0x1f, 0x8b]) {
        flate2::read::GzDecoder::new(compressed)
            .take(MAX_ARCHIVE_TOTAL_SIZE)
            .read_to_end(&mut payload)
            .map(|n| n as u64)
    } else if compressed.starts_with(&[0xfd, 0x37]) {
        xz2::read::XzDecoder::new(compressed)
            .take(MAX_ARCHIVE_TOTAL_SIZE)
            .read_to_end(&mut payload)
            .map(|n| n as u64)
    } else {
        zstd::stream::read::Decoder::new(compressed)
            .and_then(|mut d| {
                let mut n = 0usize;
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let read = d.read(&mut buf)?;
                    if read == 0 || n as u64 > MAX_ARCHIVE_TOTAL_SIZE {
                        break;
                    }
                    payload.extend_from_slice(&buf[..read]);
                    n += read;
                }
                Ok(n as u64)
            })
    };
    result.map_err(|e| SnifferError::format("rpm", path, e.to_string()))?;

    expand_cpio(path, &payload, dest, guard)
}

/// Minimal cpio `newc`/`crc` reader: enough to lay member files out on disk.
fn expand_cpio(path: &Path, data: &[u8], dest: &Path, guard: &mut ExpansionGuard) -> Result<()> {
    const HEADER: usize = 110;
    let mut pos = 0usize;
    loop {
        if pos + HEADER > data.len() {
            break;
        }
        let header = &data[pos..pos + HEADER];
        if !header.starts_with(b"070701") && !header.starts_with(b"070702") {
            // Octal-format ("070707") and damaged archives stop the walk.
            break;
        }
        let field = |index: usize| -> Option<u64> {
            let start = 6 + index * 8;
            let text = std::str::from_utf8(&header[start..start + 8]).ok()?;
            u64::from_str_radix(text, 16).ok()
        };
        let Some(file_size) = field(6) else { break };
        let Some(name_size) = field(11) else { break };

        let name_start = pos + HEADER;
        let name_end = name_start + name_size as usize;
        if name_end > data.len() {
            break;
        }
        let name = String::from_utf8_lossy(&data[name_start..name_end])
            .trim_end_matches('\0')
            .to_string();
        if name == "TRAILER!!!" {
            break;
        }

        let data_start = align4(name_end);
        let data_end = data_start + file_size as usize;
        if data_end > data.len() {
            break;
        }

        if file_size > 0 {
            if !guard.admit_file() {
                break;
            }
            if guard.admit_bytes(file_size) {
                // cpio names often carry a leading "./".
                let clean = name.trim_start_matches("./");
                if let Some(out) = sanitize_entry_path(clean, dest) {
                    write_member(&out, &data[data_start..data_end])
                        .map_err(|e| SnifferError::io(&out, e))?;
                }
            }
        }
        pos = align4(data_end);
    }
    let _ = path;
    Ok(())
}

fn align4(value: usize) -> usize {
    (value + 3) & !3
}

/// Bare zstd stream: decode and let recursion classify the payload.
fn expand_zstd(path: &Path, dest: &Path, guard: &mut ExpansionGuard) -> Result<()> {
    let file = File::open(path).map_err(|e| SnifferError::io(path, e))?;
    let mut decoder = zstd::stream::read::Decoder::new(file)
        .map_err(|e| SnifferError::format("zstd", path, e.to_string()))?;
    let mut payload = Vec::new();
    decoder
        .by_ref()
        .take(MAX_MEMBER_SIZE)
        .read_to_end(&mut payload)
        .map_err(|e| SnifferError::format("zstd", path, e.to_string()))?;
    guard.admit_file();
    guard.admit_bytes(payload.len() as u64);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stream".to_string());
    let out = dest.join(stem);
    write_member(&out, &payload).map_err(|e| SnifferError::io(&out, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RECURSION_CAP;
    use std::io::Write;

    fn walk(path: &Path, kind: FileKind, cap: usize) -> (FeatureSet, WalkOutcome) {
        let mut sink = FeatureSet::new(100_000);
        let mut outcome = WalkOutcome::default();
        let deadline = Deadline::unbounded(path);
        extract_archive(path, kind, None, 0, cap, &deadline, &mut sink, &mut outcome).unwrap();
        (sink, outcome)
    }

    fn build_zip(members: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn zip_members_walked_in_sorted_order_with_annotations() {
        let zip = build_zip(&[
            ("lib/zeta.bin", b"\x00zeta_marker_string\x00"),
            ("lib/alpha.bin", b"\x00alpha_marker_string\x00"),
        ]);
        let (sink, outcome) = walk(zip.path(), FileKind::Zip, DEFAULT_RECURSION_CAP);

        let features: Vec<(&str, Option<&str>)> = sink
            .iter()
            .map(|f| (f.text.as_str(), f.source.as_deref()))
            .collect();
        let alpha = features.iter().position(|(t, _)| *t == "alpha_marker_string");
        let zeta = features.iter().position(|(t, _)| *t == "zeta_marker_string");
        assert!(alpha.unwrap() < zeta.unwrap(), "lexicographic member order");
        assert_eq!(
            features[alpha.unwrap()].1,
            Some("lib/alpha.bin"),
            "member path annotation"
        );
        assert_eq!(outcome.members_seen, 2);
    }

    #[test]
    fn nested_zip_recurses_until_cap() {
        let inner = build_zip(&[("deep.bin", b"\x00deep_nested_marker\x00")]);
        let inner_bytes = fs::read(inner.path()).unwrap();
        let middle = build_zip(&[("inner.zip", &inner_bytes)]);
        let middle_bytes = fs::read(middle.path()).unwrap();
        let outer = build_zip(&[("middle.zip", &middle_bytes)]);

        let (sink, _) = walk(outer.path(), FileKind::Zip, DEFAULT_RECURSION_CAP);
        let deep = sink.iter().find(|f| f.text == "deep_nested_marker").unwrap();
        assert_eq!(deep.source.as_deref(), Some("middle.zip!inner.zip!deep.bin"));

        // Cap 1 refuses to descend into middle.zip.
        let (sink, outcome) = walk(outer.path(), FileKind::Zip, 1);
        assert!(sink.iter().all(|f| f.text != "deep_nested_marker"));
        assert!(outcome.notes.iter().any(|n| n.contains("depth cap")));
    }

    #[test]
    fn tar_gz_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let encoder =
            flate2::write::GzEncoder::new(file.reopen().unwrap(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let payload = b"\x00tarred_marker_string\x00";
        let mut header = tar::Header::new_gnu();
        header.set_path("inner/member.bin").unwrap();
        header.set_size(payload.len() as u64);
        header.set_cksum();
        builder.append(&header, payload.as_ref()).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let (sink, _) = walk(
            file.path(),
            FileKind::Tar(Compression::Gzip),
            DEFAULT_RECURSION_CAP,
        );
        let hit = sink.iter().find(|f| f.text == "tarred_marker_string").unwrap();
        assert_eq!(hit.source.as_deref(), Some("inner/member.bin"));
    }

    #[test]
    fn traversal_entries_rejected() {
        let dest = tempfile::TempDir::new().unwrap();
        assert!(sanitize_entry_path("../escape.txt", dest.path()).is_none());
        assert!(sanitize_entry_path("/etc/passwd", dest.path()).is_none());
        assert!(sanitize_entry_path("ok/inner.txt", dest.path()).is_some());
    }

    #[test]
    fn cpio_newc_members_extracted() {
        // Hand-built single-member newc archive.
        let body = b"\x00cpio_member_marker\x00";
        let name = b"./payload.bin\0";
        let mut data = Vec::new();
        let mut header = format!(
            "070701{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
            1, 0o100644, 0, 0, 1, 0, body.len(), 0, 0, 0, 0, name.len(), 0
        )
        .into_bytes();
        data.append(&mut header);
        data.extend_from_slice(name);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        data.extend_from_slice(body);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        // trailer
        let trailer_name = b"TRAILER!!!\0";
        data.extend_from_slice(
            format!(
                "070701{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
                0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, trailer_name.len(), 0
            )
            .as_bytes(),
        );
        data.extend_from_slice(trailer_name);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        let (sink, _) = walk(file.path(), FileKind::Cpio, DEFAULT_RECURSION_CAP);
        let hit = sink.iter().find(|f| f.text == "cpio_member_marker").unwrap();
        assert_eq!(hit.source.as_deref(), Some("payload.bin"));
    }
}
