//! Thin wrapper over the `tlsh` crate's builder API, exposing the
//! `hash_buf`/`compare` shape the rest of the codebase expects.

use tlsh::{BucketKind, ChecksumKind, Tlsh, TlshBuilder, TlshError, Version};

pub fn hash_buf(data: &[u8]) -> Result<Tlsh, TlshError> {
    let mut builder = TlshBuilder::new(BucketKind::Bucket128, ChecksumKind::OneByte, Version::Version4);
    builder.update(data);
    builder.build()
}

pub fn compare(a: &str, b: &str) -> Result<u32, TlshError> {
    let digest_a = Tlsh::from_str(a)?;
    let digest_b = Tlsh::from_str(b)?;
    Ok(digest_a.diff(&digest_b, true) as u32)
}
