//! Archive manifest data model.
//!
//! `manifest.json` at the root of a `docker save`-style tar is a bare JSON
//! array of image entries — not an object — which is why `ArchiveManifest`
//! is just a type alias over `Vec<ImageEntry>`.

pub mod extractor;
pub mod recompress;

pub use extractor::Extractor;

use serde::{Deserialize, Serialize};

/// One entry of the archive's top-level `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEntry {
    #[serde(rename = "Config")]
    pub config: String,
    #[serde(rename = "RepoTags")]
    pub repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

pub type ArchiveManifest = Vec<ImageEntry>;
