//! Docker Registry HTTP API v2 client: blob existence checks, chunked blob
//! upload, and manifest push.

pub mod chunked;
pub mod client;

pub use client::{RegistryClient, RegistryClientBuilder};
