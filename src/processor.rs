//! Top-level coordinator: extracts the archive into a scratch directory,
//! optionally recompresses its layers, then fans the archive's images out to
//! a bounded worker pool and pushes each one to the registry.
//!
//! Resolves a scratch directory, extracts the archive into it, iterates
//! images through a bounded worker pool, and cleans up on every exit path
//! including failure.

use crate::archive::{ArchiveManifest, Extractor, recompress};
use crate::config::PushConfig;
use crate::error::{PusherError, Result};
use crate::image_processor::ImageProcessor;
use crate::locks::LayerLockTable;
use crate::registry::RegistryClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

const MANIFEST_FILE: &str = "manifest.json";

/// Removes its directory (recursively) when dropped, regardless of how the
/// enclosing scope exits — success, error, or panic.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn new(base: Option<&Path>) -> Result<Self> {
        let base = base
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let path = base.join(format!("archive-registry-pusher-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to clean up scratch directory");
        }
    }
}

pub struct ArchiveProcessor {
    config: PushConfig,
}

impl ArchiveProcessor {
    pub fn new(config: PushConfig) -> Self {
        Self { config }
    }

    /// Runs the full archive-to-registry push: extract, (optionally)
    /// recompress, then push every image's layers, config, and manifest(s).
    /// Returns the first error encountered across all images, if any, after
    /// every other image has finished (or failed) independently.
    pub async fn process(&self) -> Result<()> {
        let scratch = ScratchDir::new(
            self.config
                .tmp_dir_override
                .as_deref()
                .or(self.config.tmp_dir.as_deref()),
        )?;

        info!(archive = %self.config.archive_path.display(), "extracting archive");
        let extractor = Extractor::new(&self.config.archive_path);
        extractor.extract_all(scratch.path())?;

        let manifest_path = scratch.path().join(MANIFEST_FILE);
        let manifest_raw = std::fs::read_to_string(&manifest_path)?;
        let mut manifest: ArchiveManifest = serde_json::from_str(&manifest_raw).map_err(|e| {
            PusherError::archive(format!("failed to parse {MANIFEST_FILE}: {e}"))
        })?;

        if manifest.is_empty() {
            return Err(PusherError::archive(format!(
                "{MANIFEST_FILE} contains no images"
            )));
        }

        if self.config.gzip_layers {
            info!("recompressing layers to gzip");
            recompress::recompress_layers(scratch.path(), &mut manifest, self.config.parallel).await?;
        }

        let registry = RegistryClient::builder(self.config.registry_url.clone())
            .with_auth(self.config.auth.clone())
            .with_ssl_verify(self.config.ssl_verify)
            .build()?;

        if let Err(e) = registry.check_v2_available().await {
            warn!(error = %e, "registry did not confirm API v2 availability, proceeding anyway");
        }

        let locks = LayerLockTable::new();
        let semaphore = Arc::new(Semaphore::new(self.config.parallel.max(1)));
        let first_error: Arc<Mutex<Option<PusherError>>> = Arc::new(Mutex::new(None));

        let mut set = tokio::task::JoinSet::new();
        for entry in manifest {
            let semaphore = semaphore.clone();
            let registry = registry.clone();
            let locks = locks.clone();
            let root = scratch.path().to_path_buf();
            let gzip_layers = self.config.gzip_layers;
            let tag_rewrite = self.config.tag_rewrite.clone();
            let first_error = first_error.clone();

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let processor = ImageProcessor::new(&root, &registry, &locks, gzip_layers, tag_rewrite);
                if let Err(e) = processor.process(&entry).await {
                    error!(config = %entry.config, error = %e, "image push failed");
                    let mut slot = first_error.lock().await;
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            joined.map_err(|e| PusherError::archive(format!("worker task panicked: {e}")))?;
        }

        let outcome = first_error.lock().await.take();
        if let Some(err) = outcome {
            return Err(err);
        }

        info!("all images pushed successfully");
        Ok(())
    }
}
