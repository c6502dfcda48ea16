//! Archive Registry Pusher
//!
//! Pushes every image in a `docker save`-style tar archive directly to a
//! Docker Registry HTTP API v2 endpoint, without needing a local Docker
//! daemon. Supports concurrent per-image pushes, layer deduplication across
//! images that share a base layer, resumable chunked blob upload, tag
//! rewriting, and optional gzip recompression of layers before upload.
//!
//! ## Main modules
//! - [`cli`] — command-line argument parsing.
//! - [`config`] — the resolved run configuration threaded through the rest
//!   of the crate.
//! - [`archive`] — tar extraction and optional gzip recompression.
//! - [`manifest`] — registry v2 schema-2 manifest synthesis.
//! - [`digest`] — sha256 digest computation.
//! - [`locks`] — the keyed mutex table serializing concurrent uploads of the
//!   same layer.
//! - [`registry`] — the Docker Registry API v2 HTTP client and chunked
//!   upload state machine.
//! - [`image_processor`] — per-image push orchestration.
//! - [`processor`] — the top-level coordinator tying extraction, recompression,
//!   and the worker pool together.
//! - [`logging`] — structured logging setup and the first-error sentinel.
//! - [`error`] — the crate's error taxonomy.

pub mod archive;
pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod image_processor;
pub mod locks;
pub mod logging;
pub mod manifest;
pub mod processor;
pub mod registry;

pub use config::{AuthConfig, PushConfig, TagRewrite};
pub use error::{PusherError, Result};
pub use processor::ArchiveProcessor;
