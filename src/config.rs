//! Run configuration: the fully-resolved settings threaded from the CLI
//! into the coordinator, registry client and image processor.
//!
//! Collects registry, auth, and upload settings into one struct instead of
//! a long parameter list threaded through every function.

use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub login: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.login.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TagRewrite {
    pub match_regex: regex::Regex,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub archive_path: PathBuf,
    pub registry_url: String,
    pub parallel: usize,
    pub auth: AuthConfig,
    pub ssl_verify: bool,
    pub stream: bool,
    pub gzip_layers: bool,
    pub tmp_dir: Option<PathBuf>,
    pub tmp_dir_override: Option<PathBuf>,
    pub tag_rewrite: Option<TagRewrite>,
}

impl PushConfig {
    /// Prepends `http://` to the registry URL if it is missing a scheme,
    /// and forces `stream = false` when `parallel > 1` (interleaved
    /// per-chunk progress on a shared terminal would corrupt output).
    pub fn normalize(mut self) -> Self {
        if !self.registry_url.starts_with("http://") && !self.registry_url.starts_with("https://") {
            self.registry_url = format!("http://{}", self.registry_url);
        }
        if self.parallel > 1 && self.stream {
            self.stream = false;
            warn!(parallel = self.parallel, "disabling --stream: interleaved per-chunk progress from concurrent workers would corrupt terminal output");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> PushConfig {
        PushConfig {
            archive_path: PathBuf::from("archive.tar"),
            registry_url: "registry.example.com".into(),
            parallel: 1,
            auth: AuthConfig::default(),
            ssl_verify: true,
            stream: false,
            gzip_layers: false,
            tmp_dir: None,
            tmp_dir_override: None,
            tag_rewrite: None,
        }
    }

    #[test]
    fn normalize_prepends_http_scheme_when_missing() {
        let cfg = base_config().normalize();
        assert_eq!(cfg.registry_url, "http://registry.example.com");
    }

    #[test]
    fn normalize_leaves_explicit_scheme_alone() {
        let mut cfg = base_config();
        cfg.registry_url = "https://registry.example.com".into();
        let cfg = cfg.normalize();
        assert_eq!(cfg.registry_url, "https://registry.example.com");
    }

    #[test]
    fn normalize_disables_stream_when_parallel_exceeds_one() {
        let mut cfg = base_config();
        cfg.parallel = 4;
        cfg.stream = true;
        let cfg = cfg.normalize();
        assert!(!cfg.stream);
    }

    #[test]
    fn normalize_keeps_stream_when_single_worker() {
        let mut cfg = base_config();
        cfg.parallel = 1;
        cfg.stream = true;
        let cfg = cfg.normalize();
        assert!(cfg.stream);
    }
}
