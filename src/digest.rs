//! SHA256 digest utilities.
//!
//! Layer blobs can be multi-GiB, so digesting a file must stream fixed-size
//! reads rather than loading the whole thing into memory.

use crate::error::{Result, io_context};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read chunk size for file digesting, matching the Docker/OCI convention
/// used throughout the pipeline's digest-then-upload loops.
const READ_CHUNK: usize = 64 * 1024;

/// Computes `sha256:<hex>` of a file by streaming fixed-size reads.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| io_context(e, path))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_context(e, path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Computes `sha256:<hex>` of an in-memory byte slice (used for small
/// payloads such as the synthesized manifest body, where the bytes already
/// exist in memory and re-reading from disk would be pointless).
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{:x}", hasher.finalize())
}

/// Validates digest format: `sha256:` followed by exactly 64 lowercase hex chars.
pub fn is_valid_digest(digest: &str) -> bool {
    match digest.strip_prefix("sha256:") {
        Some(hex) => hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
