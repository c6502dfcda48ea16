//! Optional gzip recompression of extracted layer tarballs.
//!
//! `docker save` archives store each layer as a plain (uncompressed) tar; the
//! `--gzip-layers` flag recompresses every layer before upload to shrink the
//! bytes actually sent over the wire. Two passes are needed because a layer
//! directory entry can be a symlink to another layer's `layer.tar` (an image
//! sharing a base layer with one already unpacked earlier in the archive):
//! compressing the link target in place and then naively recompressing the
//! link itself would double-compress it, or dangle the link once the
//! original `.tar` is deleted. So symlinks are retargeted to the `.tar.gz`
//! name first, and only concrete `.tar` files are compressed.

use crate::archive::ArchiveManifest;
use crate::digest::sha256_file;
use crate::error::{PusherError, Result, io_context};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Recompresses every `*/layer.tar` under `root` into `*/layer.tar.gz`,
/// rewrites `manifest`'s `Layers` entries in place, and patches each
/// referenced image config's `rootfs.diff_ids`. Compression of independent
/// layer files runs with up to `parallel` tasks in flight.
pub async fn recompress_layers(
    root: &Path,
    manifest: &mut ArchiveManifest,
    parallel: usize,
) -> Result<()> {
    let mut rename_map: HashMap<String, String> = HashMap::new();

    retarget_symlinks(root, manifest)?;

    let mut all_layers: Vec<String> = Vec::new();
    for entry in manifest.iter() {
        for layer in &entry.layers {
            if !all_layers.contains(layer) {
                all_layers.push(layer.clone());
            }
        }
    }

    let semaphore = Arc::new(Semaphore::new(parallel.max(1)));
    let mut set = tokio::task::JoinSet::new();
    for layer in all_layers {
        if layer.ends_with(".gz") || layer.ends_with(".gzip") {
            continue;
        }
        let root = root.to_path_buf();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            tokio::task::spawn_blocking(move || compress_one(&root, &layer))
                .await
                .map_err(|e| PusherError::archive(format!("compression task panicked: {e}")))?
        });
    }

    while let Some(joined) = set.join_next().await {
        let outcome = joined.map_err(|e| PusherError::archive(format!("join error: {e}")))??;
        rename_map.insert(outcome.original, outcome.compressed);
    }

    for entry in manifest.iter_mut() {
        let original_layers = entry.layers.clone();
        for layer in entry.layers.iter_mut() {
            if let Some(renamed) = rename_map.get(layer) {
                *layer = renamed.clone();
            }
        }
        rewrite_config_diff_ids(root, &entry.config, &original_layers, &entry.layers, &rename_map)?;
    }

    Ok(())
}

struct CompressOutcome {
    original: String,
    compressed: String,
}

fn compress_one(root: &Path, relative_layer: &str) -> Result<CompressOutcome> {
    let src = root.join(relative_layer);
    let dest_relative = format!("{relative_layer}.gz");
    let dest = root.join(&dest_relative);

    if dest.exists() {
        fs::remove_file(&src).map_err(|e| io_context(e, &src))?;
        return Ok(CompressOutcome {
            original: relative_layer.to_string(),
            compressed: dest_relative,
        });
    }

    let metadata = fs::symlink_metadata(&src).map_err(|e| io_context(e, &src))?;
    if metadata.is_symlink() {
        // Retargeting already ran; any symlink reaching here points at a
        // sibling layer that hasn't been compressed yet. Leave it for the
        // task handling that target; the manifest rewrite still applies via
        // the rename map once that task completes.
        return Ok(CompressOutcome {
            original: relative_layer.to_string(),
            compressed: dest_relative,
        });
    }

    let input = fs::File::open(&src).map_err(|e| io_context(e, &src))?;
    let mut reader = BufReader::new(input);
    let output = fs::File::create(&dest).map_err(|e| io_context(e, &dest))?;
    let writer = BufWriter::new(output);
    let mut encoder = GzEncoder::new(writer, Compression::new(9));

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| io_context(e, &src))?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n]).map_err(|e| io_context(e, &dest))?;
    }
    encoder.finish().map_err(|e| io_context(e, &dest))?;

    fs::remove_file(&src).map_err(|e| io_context(e, &src))?;

    Ok(CompressOutcome {
        original: relative_layer.to_string(),
        compressed: dest_relative,
    })
}

/// Repoints every symlink ending in `layer.tar` at `<target>.gz`, so that
/// once the real file behind it is compressed, the link resolves correctly
/// without ever dereferencing a deleted `.tar`.
fn retarget_symlinks(root: &Path, manifest: &ArchiveManifest) -> Result<()> {
    for entry in manifest.iter() {
        for layer in &entry.layers {
            let path = root.join(layer);
            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_symlink() {
                continue;
            }
            let target = fs::read_link(&path).map_err(|e| io_context(e, &path))?;
            let new_target = append_gz_suffix(&target);
            fs::remove_file(&path).map_err(|e| io_context(e, &path))?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&new_target, &path).map_err(|e| io_context(e, &path))?;
            #[cfg(not(unix))]
            fs::copy(&new_target, &path).map_err(|e| io_context(e, &path))?;
        }
    }
    Ok(())
}

fn append_gz_suffix(target: &Path) -> PathBuf {
    let mut s = target.as_os_str().to_os_string();
    s.push(".gz");
    PathBuf::from(s)
}

/// Recomputes `rootfs.diff_ids[i]` to the sha256 digest of the recompressed
/// `.tar.gz` file, for every layer index this run actually recompressed.
/// `original_layers`/`new_layers` share index order with `diff_ids`, per
/// `docker save` output; `rename_map` (keyed by original path) identifies
/// which indices were touched this run versus already-compressed or
/// symlinked-through layers left alone.
fn rewrite_config_diff_ids(
    root: &Path,
    config_name: &str,
    original_layers: &[String],
    new_layers: &[String],
    rename_map: &HashMap<String, String>,
) -> Result<()> {
    if rename_map.is_empty() {
        return Ok(());
    }
    let config_path = root.join(config_name);
    let raw = fs::read_to_string(&config_path).map_err(|e| io_context(e, &config_path))?;
    let mut value: serde_json::Value = serde_json::from_str(&raw)?;

    let Some(diff_ids) = value
        .pointer_mut("/rootfs/diff_ids")
        .and_then(|v| v.as_array_mut())
    else {
        return Ok(());
    };

    let mut changed = false;
    for (index, original) in original_layers.iter().enumerate() {
        if !rename_map.contains_key(original) {
            continue;
        }
        let Some(new_layer) = new_layers.get(index) else {
            continue;
        };
        let Some(slot) = diff_ids.get_mut(index) else {
            continue;
        };
        let digest = sha256_file(&root.join(new_layer))?;
        *slot = serde_json::Value::String(digest);
        changed = true;
    }

    if changed {
        let serialized = serde_json::to_vec(&value)?;
        fs::write(&config_path, serialized).map_err(|e| io_context(e, &config_path))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ImageEntry;

    fn write_file(path: &Path, data: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn recompresses_plain_layer_and_updates_manifest() {
        let root = std::env::temp_dir().join(format!("recompress-test-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&root).unwrap();
        write_file(&root.join("abc/layer.tar"), b"layer contents");
        write_file(&root.join("abc/json"), b"{}");
        write_file(&root.join("config.json"), br#"{"rootfs":{"diff_ids":["sha256:x"]}}"#);

        let mut manifest: ArchiveManifest = vec![ImageEntry {
            config: "config.json".into(),
            repo_tags: vec!["demo:latest".into()],
            layers: vec!["abc/layer.tar".into()],
        }];

        recompress_layers(&root, &mut manifest, 2).await.unwrap();

        assert_eq!(manifest[0].layers[0], "abc/layer.tar.gz");
        assert!(root.join("abc/layer.tar.gz").exists());
        assert!(!root.join("abc/layer.tar").exists());

        let rewritten = fs::read_to_string(root.join("config.json")).unwrap();
        let config: serde_json::Value = serde_json::from_str(&rewritten).unwrap();
        let diff_id = config["rootfs"]["diff_ids"][0].as_str().unwrap();
        let expected = sha256_file(&root.join("abc/layer.tar.gz")).unwrap();
        assert_eq!(diff_id, expected);
        assert_ne!(diff_id, "sha256:x");

        fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn skips_layer_already_compressed() {
        let root = std::env::temp_dir().join(format!("recompress-test-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&root).unwrap();
        write_file(&root.join("abc/layer.tar"), b"layer contents");
        write_file(&root.join("abc/layer.tar.gz"), b"already compressed");

        let mut manifest: ArchiveManifest = vec![ImageEntry {
            config: "config.json".into(),
            repo_tags: vec!["demo:latest".into()],
            layers: vec!["abc/layer.tar".into()],
        }];
        write_file(&root.join("config.json"), br#"{"rootfs":{"diff_ids":["sha256:x"]}}"#);

        recompress_layers(&root, &mut manifest, 1).await.unwrap();

        assert_eq!(manifest[0].layers[0], "abc/layer.tar.gz");
        assert!(!root.join("abc/layer.tar").exists());

        fs::remove_dir_all(&root).ok();
    }
}
