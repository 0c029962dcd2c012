//! Optional file hashes attached to results on request.

use crate::config::MIN_FUZZY_INPUT;
use crate::results::FileHashes;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

/// Compute the requested hash families over the raw input bytes. Fuzzy
/// hashes need a minimum amount of content and are omitted below it.
pub fn compute_file_hashes(data: &[u8], cryptographic: bool, fuzzy: bool) -> FileHashes {
    let mut hashes = FileHashes::default();
    if cryptographic {
        hashes.md5 = Some(hex(&Md5::digest(data)));
        hashes.sha1 = Some(hex(&Sha1::digest(data)));
        hashes.sha256 = Some(sha256_hex(data));
    }
    if fuzzy && data.len() >= MIN_FUZZY_INPUT {
        hashes.tlsh = crate::tlsh_util::hash_buf(data).ok().map(|h| h.hash());
        hashes.ssdeep = Some(fuzzyhash::FuzzyHash::new(data).to_string());
    }
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sha256() {
        // sha256 of the empty string
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fuzzy_hashes_absent_below_minimum() {
        let hashes = compute_file_hashes(b"short", true, true);
        assert!(hashes.md5.is_some());
        assert!(hashes.tlsh.is_none());
        assert!(hashes.ssdeep.is_none());
    }

    #[test]
    fn fuzzy_hashes_present_for_rich_input() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 37 % 251) as u8).collect();
        let hashes = compute_file_hashes(&data, false, true);
        assert!(hashes.md5.is_none());
        assert!(hashes.ssdeep.is_some());
    }
}
