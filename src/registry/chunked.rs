//! Chunked blob-upload state machine: `Starting -> Uploading -> Completing -> Done | Failed`.
//!
//! The running digest and the byte counter live in the same loop that feeds
//! the HTTP body, so the file is never re-read after upload.

use crate::digest::sha256_file;
use crate::error::{PusherError, Result};
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// 2 MiB chunks.
pub const CHUNK_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Starting,
    Uploading,
    Completing,
    Done,
    Failed,
}

pub struct ChunkedUploadOutcome {
    pub digest: String,
    pub bytes_uploaded: u64,
}

/// Reports one chunk's progress when `stream` is enabled on the registry
/// client; kept as a callback so the state machine stays transport-only.
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// Runs the PATCH/PATCH/.../PUT sequence against `upload_url` for the
/// contents of `file_path`, returning the completed digest and byte count.
///
/// `upload_url` is the session URL returned by the registry's `202` response
/// to `POST /v2/<name>/blobs/uploads/`. Every non-final chunk is sent with
/// `PATCH`; the registry may redirect the session by returning a new
/// `Location`, which is adopted for the next chunk. The final chunk is sent
/// with `PUT ...&digest=<digest>`.
pub async fn upload_file(
    client: &Client,
    mut upload_url: String,
    file_path: &Path,
    basic_auth: Option<(&str, &str)>,
    is_gzip_layer: bool,
    progress: Option<&ProgressFn<'_>>,
) -> Result<ChunkedUploadOutcome> {
    let mut state = UploadState::Starting;
    let mut file = File::open(file_path)?;
    let total_size = file.metadata()?.len();
    let mut hasher = Sha256::new();
    let mut sent: u64 = 0;
    let mut buf = vec![0u8; CHUNK_SIZE];

    state = UploadState::Uploading;

    loop {
        let n = file.read(&mut buf)?;
        let chunk = &buf[..n];
        hasher.update(chunk);
        let start = sent;
        let end = start + n as u64;
        sent = end;
        let is_final = sent == total_size;

        if !is_final {
            let mut req = client
                .patch(&upload_url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(CONTENT_LENGTH, n.to_string())
                .header(CONTENT_RANGE, format!("{start}-{end}"));
            if is_gzip_layer {
                req = req.header("Content-Encoding", "gzip");
            }
            if let Some((user, pass)) = basic_auth {
                req = req.basic_auth(user, Some(pass));
            }
            let resp = req.body(chunk.to_vec()).send().await?;
            if resp.status().as_u16() != 202 {
                state = UploadState::Failed;
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(PusherError::Network(format!(
                    "chunk upload failed (state={state:?}): status={status}, body={body}"
                )));
            }
            if let Some(location) = resp.headers().get("Location") {
                if let Ok(loc) = location.to_str() {
                    upload_url = loc.to_string();
                }
            }
            if let Some(cb) = progress {
                cb(sent, total_size);
            }
            if n == 0 {
                // Empty file: a single zero-length non-final read never
                // happens in practice since is_final triggers at sent==0==total_size,
                // but guard against infinite loop regardless.
                break;
            }
            continue;
        }

        // Final chunk.
        state = UploadState::Completing;
        let digest = format!("sha256:{:x}", hasher.finalize_reset());
        let put_url = if upload_url.contains('?') {
            format!("{upload_url}&digest={digest}")
        } else {
            format!("{upload_url}?digest={digest}")
        };

        let mut req = client
            .put(&put_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, n.to_string());
        if is_gzip_layer {
            req = req.header("Content-Encoding", "gzip");
        }
        if let Some((user, pass)) = basic_auth {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.body(chunk.to_vec()).send().await?;
        if resp.status().as_u16() != 201 {
            state = UploadState::Failed;
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PusherError::Network(format!(
                "failed to complete upload (state={state:?}): status={status}, body={body}"
            )));
        }

        let server_digest = resp
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(server_digest) = server_digest {
            if server_digest != digest {
                return Err(PusherError::DigestMismatch {
                    expected: digest,
                    actual: server_digest,
                });
            }
        }

        if let Some(cb) = progress {
            cb(sent, total_size);
        }

        state = UploadState::Done;
        debug_assert_eq!(state, UploadState::Done);
        return Ok(ChunkedUploadOutcome {
            digest,
            bytes_uploaded: sent,
        });
    }

    // Only reachable for a genuinely empty file (total_size == 0): the loop
    // above never reaches the final-chunk branch because `n == 0 == total_size`
    // already satisfies `is_final` on the very first iteration, so this path
    // exists purely as a defensive fallback.
    let digest = sha256_file(file_path)?;
    Ok(ChunkedUploadOutcome {
        digest,
        bytes_uploaded: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_uses_start_end_semantics() {
        let start = 0u64;
        let n = 1024usize;
        let end = start + n as u64;
        assert_eq!(format!("{start}-{end}"), "0-1024");
    }

    #[test]
    fn chunk_size_is_positive_and_reasonable() {
        assert!(CHUNK_SIZE > 0);
        assert!(CHUNK_SIZE <= 256 * 1024 * 1024);
    }
}
