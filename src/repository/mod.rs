// src/repository/mod.rs

//! Remote RPM repositories
//!
//! This module provides:
//! - The `MetadataSource` seam through which all remote documents are fetched
//! - A blocking HTTP implementation of it
//! - URL resolution relative to a repository base URL
//! - Decompression of primary metadata
//! - The repomd parser and the package records it produces

pub mod package;
pub mod repomd;

pub use package::RpmPackage;
pub use repomd::RepoMdParser;

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;
use tracing::debug;
use url::Url;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("bci-build/", env!("CARGO_PKG_VERSION"));

/// Something that can fetch the raw bytes behind a URL
///
/// Fetch failures are fatal for the caller; implementations must not retry.
pub trait MetadataSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Fetch a document and decode it as UTF-8
    fn fetch_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch(url)?;
        String::from_utf8(bytes)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", url, e)))
    }
}

/// HTTP metadata source backed by a blocking reqwest client
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    /// Create a new HTTP source
    ///
    /// No request timeout is configured; a fetch either completes or fails.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl MetadataSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to download {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "Failed to download {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read response from {}: {}", url, e)))?;

        Ok(bytes.to_vec())
    }
}

/// In-memory source serving fixed documents, counting requests per URL
///
/// Used to run the resolution pipeline against canned repositories.
#[derive(Default)]
pub struct StaticSource {
    documents: HashMap<String, Vec<u8>>,
    requests: Mutex<HashMap<String, usize>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`
    pub fn with(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.documents.insert(url.into(), body.into());
        self
    }

    /// Number of times `url` was requested
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .map(|requests| requests.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl MetadataSource for StaticSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            *requests.entry(url.to_string()).or_insert(0) += 1;
        }
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| Error::DownloadError(format!("Failed to download {}: HTTP 404", url)))
    }
}

fn parse_base_url(base: &str) -> Result<Url> {
    Url::parse(base)
        .map_err(|e| Error::ConfigError(format!("Invalid repository URL '{}': {}", base, e)))
}

/// Canonical form of a repository URL
///
/// Lowercases the host, drops default ports and percent-encodes the path,
/// exactly as [`join_url`] does for the URLs it returns. Prefix checks on
/// joined URLs must use this form.
pub fn normalize_url(base: &str) -> Result<String> {
    Ok(parse_base_url(base)?.to_string())
}

/// Resolve `reference` relative to `base` (RFC 3986)
pub fn join_url(base: &str, reference: &str) -> Result<String> {
    let base = parse_base_url(base)?;
    let joined = base
        .join(reference)
        .map_err(|e| Error::ParseError(format!("Invalid location '{}': {}", reference, e)))?;
    Ok(joined.to_string())
}

/// Decompress a metadata file, detecting the format from its location
pub fn decompress(location: &str, bytes: &[u8]) -> Result<String> {
    let decompressed = if location.ends_with(".gz") {
        debug!("Decompressing gzip-compressed {}", location);
        let mut gz = GzDecoder::new(bytes);
        let mut decompressed = String::new();
        gz.read_to_string(&mut decompressed)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?;
        decompressed
    } else if location.ends_with(".zst") {
        debug!("Decompressing zstd-compressed {}", location);
        let decompressed_bytes = zstd::decode_all(bytes)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?;
        String::from_utf8(decompressed_bytes)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", location, e)))?
    } else {
        return Err(Error::ParseError(format!(
            "Unsupported compression for {}",
            location
        )));
    };

    debug!("Decompressed {}: {} bytes", location, decompressed.len());
    Ok(decompressed)
}
