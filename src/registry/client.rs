//! HTTP client for the Docker Registry API v2 endpoints this crate needs:
//! blob existence checks, chunked blob upload, and manifest push.
//!
//! The builder resolves TLS/auth policy once; the client is then reused
//! across every image and layer in the archive. Auth is HTTP Basic only —
//! there is no bearer-token exchange in scope here.

use crate::config::AuthConfig;
use crate::error::{PusherError, Result};
use crate::registry::chunked::{self, ProgressFn};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct RegistryClientBuilder {
    base_url: String,
    auth: AuthConfig,
    ssl_verify: bool,
}

impl RegistryClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: AuthConfig::default(),
            ssl_verify: true,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_ssl_verify(mut self, ssl_verify: bool) -> Self {
        self.ssl_verify = ssl_verify;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!self.ssl_verify)
            .build()
            .map_err(|e| PusherError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(RegistryClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            auth: self.auth,
        })
    }
}

#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
    auth: AuthConfig,
}

impl RegistryClient {
    pub fn builder(base_url: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder::new(base_url)
    }

    fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.auth.login, &self.auth.password) {
            (Some(l), Some(p)) => Some((l.as_str(), p.as_str())),
            _ => None,
        }
    }

    /// `HEAD /v2/<repo>/blobs/<digest>`: true when the registry already has
    /// this blob, letting the caller skip a redundant upload.
    pub async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool> {
        let url = format!("{}/v2/{repository}/blobs/{digest}", self.base_url);
        let mut req = self.client.head(&url);
        if let Some((user, pass)) = self.basic_auth() {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.send().await?;
        match resp.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(PusherError::Network(format!(
                "unexpected status {status} checking blob existence for {digest}"
            ))),
        }
    }

    /// `POST /v2/<repo>/blobs/uploads/`: opens a new chunked-upload session
    /// and returns its initial `Location`.
    pub async fn start_upload(&self, repository: &str) -> Result<String> {
        let url = format!("{}/v2/{repository}/blobs/uploads/", self.base_url);
        let mut req = self.client.post(&url);
        if let Some((user, pass)) = self.basic_auth() {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.send().await?;
        if resp.status().as_u16() != 202 {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PusherError::Protocol(format!(
                "failed to start blob upload (status={status}): {body}"
            )));
        }
        let location = resp
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PusherError::Protocol("upload start response missing Location".into()))?;
        Ok(self.resolve_location(location))
    }

    /// Uploads a layer blob to `repository`, skipping the transfer entirely
    /// if the registry already has it under `digest` (checked via `HEAD`).
    pub async fn push_blob(
        &self,
        repository: &str,
        digest: &str,
        file_path: &Path,
        is_gzip_layer: bool,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<()> {
        if self.blob_exists(repository, digest).await? {
            debug!(%digest, %repository, "blob already present, skipping upload");
            return Ok(());
        }
        self.upload_blob(repository, digest, file_path, is_gzip_layer, progress)
            .await
    }

    /// Uploads the image config blob. Identical wire protocol to
    /// [`RegistryClient::push_blob`] but without the `HEAD` existence probe —
    /// the config blob is small and unique enough per image that the extra
    /// round trip buys nothing.
    pub async fn push_config(&self, repository: &str, digest: &str, file_path: &Path) -> Result<()> {
        self.upload_blob(repository, digest, file_path, false, None).await
    }

    async fn upload_blob(
        &self,
        repository: &str,
        digest: &str,
        file_path: &Path,
        is_gzip_layer: bool,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<()> {
        let upload_url = self.start_upload(repository).await?;
        let outcome = chunked::upload_file(
            &self.client,
            upload_url,
            file_path,
            self.basic_auth(),
            is_gzip_layer,
            progress,
        )
        .await?;

        if outcome.digest != digest {
            return Err(PusherError::DigestMismatch {
                expected: digest.to_string(),
                actual: outcome.digest,
            });
        }

        info!(%digest, %repository, bytes = outcome.bytes_uploaded, "blob uploaded");
        Ok(())
    }

    /// `PUT /v2/<repo>/manifests/<tag>`.
    pub async fn push_manifest(&self, repository: &str, tag: &str, manifest_body: Vec<u8>) -> Result<()> {
        let url = format!("{}/v2/{repository}/manifests/{tag}", self.base_url);
        let mut req = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/vnd.docker.distribution.manifest.v2+json")
            .body(manifest_body);
        if let Some((user, pass)) = self.basic_auth() {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.send().await?;
        if resp.status().as_u16() != 201 {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PusherError::Protocol(format!(
                "manifest push failed for {repository}:{tag} (status={status}): {body}"
            )));
        }
        info!(%repository, %tag, "manifest pushed");
        Ok(())
    }

    /// `GET /v2/`: used by the coordinator as an early sanity check before
    /// doing any real work, so a misconfigured registry fails fast.
    pub async fn check_v2_available(&self) -> Result<()> {
        let url = format!("{}/v2/", self.base_url);
        let mut req = self.client.get(&url);
        if let Some((user, pass)) = self.basic_auth() {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.send().await?;
        match resp.status().as_u16() {
            200 | 401 => Ok(()),
            status => {
                warn!(%status, "registry did not respond to /v2/ as expected");
                Err(PusherError::Protocol(format!(
                    "registry API v2 not available, status={status}"
                )))
            }
        }
    }

    /// A `Location` header may be relative to the registry's origin or a
    /// fully-qualified URL; normalize it to the latter.
    fn resolve_location(&self, location: &str) -> String {
        if location.starts_with('/') {
            format!("{}{location}", self.base_url)
        } else {
            location.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_location_prepends_base_for_relative_path() {
        let client = RegistryClientBuilder::new("http://registry.local")
            .build()
            .unwrap();
        assert_eq!(
            client.resolve_location("/v2/demo/blobs/uploads/abc"),
            "http://registry.local/v2/demo/blobs/uploads/abc"
        );
    }

    #[test]
    fn resolve_location_leaves_absolute_url_alone() {
        let client = RegistryClientBuilder::new("http://registry.local")
            .build()
            .unwrap();
        assert_eq!(
            client.resolve_location("http://other.example.com/upload/xyz"),
            "http://other.example.com/upload/xyz"
        );
    }

    #[test]
    fn builder_trims_trailing_slash_from_base_url() {
        let client = RegistryClientBuilder::new("http://registry.local/")
            .build()
            .unwrap();
        assert_eq!(client.base_url, "http://registry.local");
    }
}
