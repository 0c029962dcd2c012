//! CLI round-trips: import signatures, query status, analyze files.

use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn binsniff() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("binsniff").unwrap()
}

const ZLIB_SIG: &str = r#"{
    "component": {"name": "zlib", "version": "1.3.1", "license": "Zlib", "ecosystem": "native"},
    "patterns": [
        {"pattern": "inflateInit2_", "confidence": 0.9},
        {"pattern": "deflate 1.3.1 Copyright", "confidence": 0.9}
    ]
}"#;

fn setup_store(dir: &TempDir) -> std::path::PathBuf {
    let sig = dir.path().join("zlib.json");
    fs::write(&sig, ZLIB_SIG).unwrap();
    let store = dir.path().join("signatures.db");

    binsniff()
        .args([
            "--store",
            store.to_str().unwrap(),
            "signatures",
            "import",
            sig.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 imported"));
    store
}

#[test]
fn import_then_status() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir);

    binsniff()
        .args(["--store", store.to_str().unwrap(), "signatures", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("components:  1"))
        .stdout(predicate::str::contains("patterns:    2"));
}

#[test]
fn reimport_is_noop() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir);
    let sig = dir.path().join("zlib.json");

    binsniff()
        .args([
            "--store",
            store.to_str().unwrap(),
            "signatures",
            "import",
            sig.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 unchanged"));
}

#[test]
fn analyze_reports_match_as_json() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir);

    let input = dir.path().join("libz-copy.so");
    let mut data = vec![0u8; 8];
    data.extend_from_slice(b"inflateInit2_\x00deflate 1.3.1 Copyright\x00");
    fs::write(&input, &data).unwrap();

    binsniff()
        .args([
            "--store",
            store.to_str().unwrap(),
            "--json",
            "analyze",
            input.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"component\": \"zlib@1.3.1\""))
        .stdout(predicate::str::contains("\"match_method\": \"direct\""));
}

#[test]
fn analyze_without_store_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("x.bin");
    fs::write(&input, b"whatever content").unwrap();

    binsniff()
        .args([
            "--store",
            dir.path().join("missing.db").to_str().unwrap(),
            "analyze",
            input.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("signature store"));
}

#[test]
fn analyze_directory_table_output() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir);

    let scan = dir.path().join("scan");
    fs::create_dir_all(&scan).unwrap();
    fs::write(scan.join("a.bin"), b"\x00inflateInit2_\x00deflate 1.3.1 Copyright\x00").unwrap();
    fs::write(scan.join("b.bin"), b"\x00nothing_of_note_here\x00").unwrap();

    binsniff()
        .args([
            "--store",
            store.to_str().unwrap(),
            "analyze",
            scan.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("zlib@1.3.1"))
        .stdout(predicate::str::contains("no components detected"));
}
