//! End-to-end engine tests: ingest signatures, analyze crafted inputs,
//! check the detection contract.

use binsniff::sigfile::load_signature_file;
use binsniff::{AnalysisOptions, ErrorKind, MatchMethod, SignatureStore, Sniffer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const LIBPNG_SIG: &str = r#"{
    "component": {"name": "libpng", "version": "1.6.37", "license": "libpng-2.0",
                  "publisher": "PNG Development Group", "ecosystem": "native"},
    "signature_metadata": {"version": "1.0"},
    "patterns": [
        {"pattern": "png_create_read_struct", "confidence": 0.9},
        {"pattern": "libpng version 1.6.37", "confidence": 0.9, "context": "version_string"}
    ]
}"#;

const X264_SIG: &str = r#"{
    "component": {"name": "x264", "license": "GPL-2.0", "ecosystem": "native"},
    "patterns": [
        {"pattern": "x264_", "confidence": 0.8, "context": "prefix"},
        {"pattern": "x264_encoder_encode", "confidence": 0.95},
        {"pattern": "x264_param_default", "confidence": 0.95}
    ]
}"#;

const OKHTTP_SIG: &str = r#"{
    "component": {"name": "okhttp", "ecosystem": "android"},
    "patterns": [
        {"pattern": "okhttp3.OkHttpClient", "confidence": 0.9},
        {"pattern": "okhttp3.internal.connection", "confidence": 0.9}
    ]
}"#;

fn build_store(dir: &Path, sigs: &[&str]) -> PathBuf {
    let store_path = dir.join("signatures.db");
    let mut store = SignatureStore::open(&store_path).unwrap();
    for sig in sigs {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(sig.as_bytes()).unwrap();
        store.import(&load_signature_file(f.path()).unwrap()).unwrap();
    }
    store_path
}

/// Bytes that sniff as ELF but fail structured parsing, so the engine falls
/// back to a raw string scan, standing in for a stripped binary.
fn fake_elf(strings: &[&str]) -> Vec<u8> {
    let mut data = b"\x7fELF\x02\x01\x01\x00".to_vec();
    data.resize(64, 0);
    for s in strings {
        data.push(0);
        data.extend_from_slice(s.as_bytes());
        data.push(0);
    }
    data
}

#[test]
fn elf_with_libpng_strings_direct_match() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG]);
    let input = dir.path().join("app.so");
    fs::write(
        &input,
        fake_elf(&["png_create_read_struct", "libpng version 1.6.37", "other_stuff"]),
    )
    .unwrap();

    let sniffer = Sniffer::open(&store).unwrap();
    let result = sniffer.analyze(&input, &AnalysisOptions::default()).unwrap();

    assert!(result.error.is_none());
    assert_eq!(result.file_type, "elf");
    assert_eq!(result.matches.len(), 1);
    let m = &result.matches[0];
    assert_eq!(m.component, "libpng@1.6.37");
    assert!(m.confidence >= 0.5);
    assert_eq!(m.match_method, MatchMethod::Direct);
    assert!(m.evidence.pattern_count >= 2);
    assert_eq!(m.license.as_deref(), Some("libpng-2.0"));
}

#[test]
fn apk_with_nested_native_codec() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[X264_SIG]);

    let apk_path = dir.path().join("app.apk");
    let file = fs::File::create(&apk_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("classes.dex", options).unwrap();
    writer.write_all(b"\x00placeholder\x00").unwrap();
    writer
        .start_file("lib/arm64-v8a/libx264.so", options)
        .unwrap();
    writer
        .write_all(&fake_elf(&["x264_encoder_encode", "x264_param_default"]))
        .unwrap();
    writer.finish().unwrap();

    let sniffer = Sniffer::open(&store).unwrap();
    let result = sniffer.analyze(&apk_path, &AnalysisOptions::default()).unwrap();

    let m = result
        .matches
        .iter()
        .find(|m| m.name == "x264")
        .expect("x264 detected in nested library");
    assert!(m
        .evidence
        .source_files
        .iter()
        .any(|s| s.ends_with("/libx264.so")));
}

#[test]
fn empty_input_yields_empty_result() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG]);
    let input = dir.path().join("empty.bin");
    fs::write(&input, b"").unwrap();

    let sniffer = Sniffer::open(&store).unwrap();
    let result = sniffer.analyze(&input, &AnalysisOptions::default()).unwrap();

    assert!(result.error.is_none());
    assert_eq!(result.features_extracted, 0);
    assert!(result.matches.is_empty());
}

#[test]
fn generic_only_features_match_nothing() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG, X264_SIG]);
    let input = dir.path().join("generic.bin");
    fs::write(&input, b"\x00init\x00error\x00data\x00buffer\x00").unwrap();

    let sniffer = Sniffer::open(&store).unwrap();
    let result = sniffer.analyze(&input, &AnalysisOptions::default()).unwrap();
    assert!(result.matches.is_empty());
    // The normalizer dropped every stop-listed token.
    assert_eq!(result.features_extracted, 0);
}

#[test]
fn native_context_suppresses_mobile_components() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[OKHTTP_SIG]);
    let strings = ["okhttp3.OkHttpClient", "okhttp3.internal.connection"];

    let elf = dir.path().join("native.so");
    fs::write(&elf, fake_elf(&strings)).unwrap();
    let sniffer = Sniffer::open(&store).unwrap();

    let opts = AnalysisOptions { threshold: 0.3, ..Default::default() };
    let result = sniffer.analyze(&elf, &opts).unwrap();
    assert!(
        result.matches.iter().all(|m| m.name != "okhttp"),
        "android component must not match inside a native ELF"
    );

    // The same strings in a generic binary are fair game.
    let blob = dir.path().join("dump.bin");
    let mut data = vec![0u8, 1u8];
    for s in &strings {
        data.extend_from_slice(s.as_bytes());
        data.push(0);
    }
    fs::write(&blob, &data).unwrap();
    let result = sniffer.analyze(&blob, &opts).unwrap();
    assert!(result.matches.iter().any(|m| m.name == "okhttp"));
}

#[test]
fn thresholds_ordering_uniqueness() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG, X264_SIG]);
    let input = dir.path().join("both.bin");
    let mut data = Vec::new();
    for s in [
        "png_create_read_struct",
        "libpng version 1.6.37",
        "x264_encoder_encode",
        "x264_param_default",
    ] {
        data.push(0);
        data.extend_from_slice(s.as_bytes());
    }
    data.push(0);
    fs::write(&input, &data).unwrap();

    let sniffer = Sniffer::open(&store).unwrap();
    let opts = AnalysisOptions { threshold: 0.5, ..Default::default() };
    let result = sniffer.analyze(&input, &opts).unwrap();

    // Every match above threshold, at most one entry per component, sorted
    // by (confidence desc, name asc).
    assert!(result.matches.iter().all(|m| m.confidence >= 0.5));
    let mut names: Vec<&str> = result.matches.iter().map(|m| m.name.as_str()).collect();
    let unique_before = names.len();
    names.sort();
    names.dedup();
    assert_eq!(unique_before, names.len());
    for pair in result.matches.windows(2) {
        assert!(
            pair[0].confidence > pair[1].confidence
                || (pair[0].confidence == pair[1].confidence && pair[0].name <= pair[1].name),
            "ordering must be (confidence desc, name asc)"
        );
    }
}

#[test]
fn no_fuzzy_match_below_minimum_payload() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG]);
    let input = dir.path().join("tiny.bin");
    // One short feature: payload well under 256 bytes.
    fs::write(&input, b"\x00short_feature_only\x00").unwrap();

    let sniffer = Sniffer::open(&store).unwrap();
    let result = sniffer.analyze(&input, &AnalysisOptions::default()).unwrap();
    assert!(result
        .matches
        .iter()
        .all(|m| m.evidence.fuzzy_distance.is_none()));
}

#[test]
fn directory_batch_isolates_failures() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG]);

    let scan_root = dir.path().join("scan");
    fs::create_dir_all(&scan_root).unwrap();
    for name in ["a.bin", "b.bin", "c.bin"] {
        fs::write(
            scan_root.join(name),
            fake_elf(&["png_create_read_struct", "libpng version 1.6.37"]),
        )
        .unwrap();
    }
    // One file over the size ceiling fails with ResourceExceeded.
    fs::write(scan_root.join("huge.bin"), vec![0x41u8; 64 * 1024]).unwrap();

    let sniffer = Sniffer::open(&store).unwrap();
    let opts = AnalysisOptions {
        size_ceiling: Some(32 * 1024),
        ..Default::default()
    };
    let results = sniffer.analyze_directory(&scan_root, &opts).unwrap();

    assert_eq!(results.len(), 4);
    // Lexicographic path order.
    for pair in results.windows(2) {
        assert!(pair[0].file_path <= pair[1].file_path);
    }
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].file_path.ends_with("huge.bin"));
    assert_eq!(failed[0].error.as_ref().unwrap().kind, ErrorKind::ResourceExceeded);
    assert!(failed[0].matches.is_empty());

    // The other three are unperturbed.
    for r in results.iter().filter(|r| r.error.is_none()) {
        assert_eq!(r.matches.len(), 1, "{} should match libpng", r.file_path);
    }
}

#[cfg(unix)]
#[test]
fn directory_batch_with_permission_denied_file() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG]);
    let scan_root = dir.path().join("scan");
    fs::create_dir_all(&scan_root).unwrap();
    fs::write(scan_root.join("ok.bin"), fake_elf(&["png_create_read_struct"])).unwrap();
    let blocked = scan_root.join("blocked.bin");
    fs::write(&blocked, b"\x00some_content_here\x00").unwrap();
    fs::set_permissions(&blocked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&blocked).is_ok() {
        // Running privileged; the permission bit has no effect here.
        return;
    }

    let sniffer = Sniffer::open(&store).unwrap();
    let results = sniffer
        .analyze_directory(&scan_root, &AnalysisOptions::default())
        .unwrap();

    assert_eq!(results.len(), 2);
    let failed = results.iter().find(|r| r.error.is_some()).unwrap();
    assert!(failed.file_path.ends_with("blocked.bin"));
    assert_eq!(failed.error.as_ref().unwrap().kind, ErrorKind::IoError);
    let ok = results.iter().find(|r| r.error.is_none()).unwrap();
    assert!(ok.file_path.ends_with("ok.bin"));
}

#[test]
fn unreadable_path_is_io_error_result() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG]);
    let sniffer = Sniffer::open(&store).unwrap();

    let result = sniffer
        .analyze(dir.path().join("does-not-exist.bin"), &AnalysisOptions::default())
        .unwrap();
    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::IoError);
    assert!(result.matches.is_empty());
}

#[test]
fn analysis_is_deterministic_across_runs_and_instances() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG, X264_SIG]);
    let input = dir.path().join("input.so");
    let mut strings = vec![
        "png_create_read_struct",
        "libpng version 1.6.37",
        "x264_encoder_encode",
        "x264_param_default",
    ];
    // Pad the feature payload past the fuzzy minimum so both layers run.
    let filler: Vec<String> = (0..40).map(|i| format!("filler_symbol_number_{i}")).collect();
    strings.extend(filler.iter().map(|s| s.as_str()));
    fs::write(&input, fake_elf(&strings)).unwrap();

    let mut serialized = Vec::new();
    for _ in 0..10 {
        let sniffer = Sniffer::open(&store).unwrap();
        let result = sniffer.analyze(&input, &AnalysisOptions::default()).unwrap();
        serialized.push(serde_json::to_string(&result.matches).unwrap());
    }
    assert!(
        serialized.windows(2).all(|w| w[0] == w[1]),
        "match lists must be byte-identical across runs"
    );
}

#[test]
fn store_error_is_fatal() {
    let dir = TempDir::new().unwrap();
    let bogus = dir.path().join("missing.db");
    assert!(Sniffer::open(&bogus).is_err());
}

#[test]
fn feature_cap_truncates_and_annotates() {
    let dir = TempDir::new().unwrap();
    let store = build_store(dir.path(), &[LIBPNG_SIG]);
    let input = dir.path().join("many.bin");
    let mut data = Vec::new();
    for i in 0..200 {
        data.push(0);
        data.extend_from_slice(format!("generated_symbol_{i}").as_bytes());
    }
    fs::write(&input, &data).unwrap();

    let sniffer = Sniffer::open(&store).unwrap();
    let opts = AnalysisOptions { max_features: 50, ..Default::default() };
    let result = sniffer.analyze(&input, &opts).unwrap();
    assert_eq!(result.features_extracted, 50);
    assert!(result.features_truncated);
    assert!(result.error.is_none(), "cap is a continuation, not a failure");
}
