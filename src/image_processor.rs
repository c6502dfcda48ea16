//! Per-image push orchestration: one [`crate::archive::ImageEntry`] pushed to
//! every repository its `RepoTags` name.
//!
//! Parses each RepoTags reference, groups tags by destination repository,
//! pushes layers and config under the keyed lock table, then pushes one
//! manifest per tag.

use crate::archive::ImageEntry;
use crate::config::TagRewrite;
use crate::digest::sha256_file;
use crate::error::{PusherError, Result};
use crate::locks::LayerLockTable;
use crate::manifest::{self, ConfigDescriptor, LayerDescriptor};
use crate::registry::RegistryClient;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// A parsed `repository:tag` reference, split on the *last* `:` so that
/// `host:port/name:tag` forms keep their port intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTag {
    pub repository: String,
    pub tag: String,
}

/// Splits `reference` into repository and tag on the last `:`. A reference
/// with no `:` at all is fatal — there is no implicit `latest`.
pub fn parse_repo_tag(reference: &str) -> Result<RepoTag> {
    match reference.rfind(':') {
        Some(idx) => Ok(RepoTag {
            repository: reference[..idx].to_string(),
            tag: reference[idx + 1..].to_string(),
        }),
        None => Err(PusherError::archive(format!(
            "RepoTags entry missing ':': {reference}"
        ))),
    }
}

/// Applies an optional tag-rewrite rule to a bare tag (anchored match),
/// never touching the repository portion of the reference.
fn apply_tag_rewrite(tag: &str, rewrite: &Option<TagRewrite>) -> String {
    match rewrite {
        Some(r) => r.match_regex.replace(tag, r.target.as_str()).into_owned(),
        None => tag.to_string(),
    }
}

pub struct ImageProcessor<'a> {
    root: &'a Path,
    registry: &'a RegistryClient,
    locks: &'a LayerLockTable,
    gzip_layers: bool,
    tag_rewrite: Option<TagRewrite>,
}

impl<'a> ImageProcessor<'a> {
    pub fn new(
        root: &'a Path,
        registry: &'a RegistryClient,
        locks: &'a LayerLockTable,
        gzip_layers: bool,
        tag_rewrite: Option<TagRewrite>,
    ) -> Self {
        Self {
            root,
            registry,
            locks,
            gzip_layers,
            tag_rewrite,
        }
    }

    /// Pushes every layer, the config, and a manifest per tag for one image
    /// entry of the archive's `manifest.json`.
    pub async fn process(&self, entry: &ImageEntry) -> Result<()> {
        if entry.repo_tags.is_empty() {
            return Err(PusherError::archive(format!(
                "image entry with config {} has no RepoTags",
                entry.config
            )));
        }

        let mut by_repository: HashMap<String, Vec<String>> = HashMap::new();
        for raw_reference in &entry.repo_tags {
            let parsed = parse_repo_tag(raw_reference)?;
            let tag = apply_tag_rewrite(&parsed.tag, &self.tag_rewrite);
            by_repository
                .entry(parsed.repository)
                .or_default()
                .push(tag);
        }

        let config_path = self.root.join(&entry.config);
        let config_digest = sha256_file(&config_path)?;
        let config_size = std::fs::metadata(&config_path)?.len();
        let config_descriptor = ConfigDescriptor {
            digest: config_digest.clone(),
            size: config_size,
        };

        let mut layer_descriptors = Vec::with_capacity(entry.layers.len());
        for layer in &entry.layers {
            let layer_path = self.root.join(layer);
            let digest = sha256_file(&layer_path)?;
            let size = std::fs::metadata(&layer_path)?.len();
            layer_descriptors.push((layer.clone(), LayerDescriptor {
                digest,
                size,
                media_type: LayerDescriptor::media_type_for_path(layer),
            }));
        }

        let manifest_body = manifest::build_manifest(
            &config_descriptor,
            &layer_descriptors.iter().map(|(_, d)| d.clone()).collect::<Vec<_>>(),
        );

        for (repository, tags) in &by_repository {
            for (layer_path, descriptor) in &layer_descriptors {
                let lock_key = format!("{repository}:{}", descriptor.digest);
                let _guard = self.locks.acquire(&lock_key).await;
                let is_gzip = self.gzip_layers || layer_path.ends_with(".gz") || layer_path.ends_with(".gzip");
                self.registry
                    .push_blob(repository, &descriptor.digest, &self.root.join(layer_path), is_gzip, None)
                    .await?;
            }

            let config_lock_key = format!("{repository}:{config_digest}");
            let _guard = self.locks.acquire(&config_lock_key).await;
            self.registry
                .push_config(repository, &config_digest, &config_path)
                .await?;
            drop(_guard);

            for tag in tags {
                self.registry
                    .push_manifest(repository, tag, manifest_body.clone())
                    .await?;
                info!(%repository, %tag, "image pushed");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repo_tag_splits_on_last_colon() {
        let parsed = parse_repo_tag("myregistry.local:5000/team/image:v1.2.3").unwrap();
        assert_eq!(parsed.repository, "myregistry.local:5000/team/image");
        assert_eq!(parsed.tag, "v1.2.3");
    }

    #[test]
    fn parse_repo_tag_is_fatal_without_colon() {
        assert!(parse_repo_tag("myregistry.local:5000/team/image").is_err());
    }

    #[test]
    fn parse_repo_tag_handles_plain_name_tag() {
        let parsed = parse_repo_tag("alpine:3.18").unwrap();
        assert_eq!(parsed.repository, "alpine");
        assert_eq!(parsed.tag, "3.18");
    }

    #[test]
    fn apply_tag_rewrite_replaces_matching_tag() {
        // Spec scenario: --replace-tags-match '^latest$' --replace-tags-target v1.2.3
        // applied to img:latest must rewrite the tag, not the whole reference.
        let rewrite = Some(TagRewrite {
            match_regex: regex::Regex::new("^latest$").unwrap(),
            target: "v1.2.3".to_string(),
        });
        let parsed = parse_repo_tag("img:latest").unwrap();
        let tag = apply_tag_rewrite(&parsed.tag, &rewrite);
        assert_eq!(parsed.repository, "img");
        assert_eq!(tag, "v1.2.3");
    }

    #[test]
    fn apply_tag_rewrite_is_noop_without_rule() {
        let result = apply_tag_rewrite("3.18", &None);
        assert_eq!(result, "3.18");
    }

    #[test]
    fn apply_tag_rewrite_does_not_match_unrelated_tag() {
        let rewrite = Some(TagRewrite {
            match_regex: regex::Regex::new("^latest$").unwrap(),
            target: "v1.2.3".to_string(),
        });
        let result = apply_tag_rewrite("3.18", &rewrite);
        assert_eq!(result, "3.18");
    }
}
