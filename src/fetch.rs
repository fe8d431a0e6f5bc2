//! Conditional artifact fetching
//!
//! One fetcher is shared by the catalog, version manifest, jar and per-asset
//! object downloads. Re-fetch is avoided two ways:
//!
//! - an existence-based skip (`skip_if_exists`) that performs no network call
//!   at all — an optimization, not a correctness guarantee;
//! - conditional requests (`If-None-Match` via an ETag sidecar file and
//!   `If-Modified-Since` via the destination's mtime), where a `304` leaves
//!   the existing file untouched.
//!
//! Bodies are streamed to a `.part` temporary next to the destination and
//! renamed into place atomically. When an expected checksum is known the
//! temporary is verified *before* the rename, so an interrupted or corrupt
//! transfer never leaves a file at a final cache path.

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::verify;
use futures::StreamExt;
use reqwest::{Client, StatusCode, header};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Outcome of a fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination was already current; no bytes were written
    Unchanged,
    /// The destination was (over)written with fresh content
    Updated,
}

/// Per-fetch behavior flags
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Skip the network entirely when the destination file exists
    pub skip_if_exists: bool,
    /// Send `If-None-Match` / `If-Modified-Since` when the destination exists
    pub use_conditional: bool,
    /// Verify the downloaded bytes against this SHA-1 before the final rename
    pub expected_sha1: Option<String>,
}

impl FetchOptions {
    /// Options matching the manifest/catalog download tasks: skip when
    /// present, otherwise fetch conditionally
    pub fn cached() -> Self {
        Self {
            skip_if_exists: true,
            use_conditional: true,
            expected_sha1: None,
        }
    }

    /// [`FetchOptions::cached`] plus checksum verification of fresh content
    pub fn cached_verified(sha1: impl Into<String>) -> Self {
        Self {
            skip_if_exists: true,
            use_conditional: true,
            expected_sha1: Some(sha1.into()),
        }
    }
}

/// One artifact of a batch fetch
#[derive(Clone, Debug)]
pub struct FetchSpec {
    /// Source URL
    pub url: String,
    /// Destination file path
    pub dest: PathBuf,
    /// Expected SHA-1 of the artifact, when the manifest declares one
    pub expected_sha1: Option<String>,
}

/// Shared HTTP fetcher
///
/// Wraps a single [`reqwest::Client`]; cheap to clone.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Build a fetcher from the HTTP configuration
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Fetch a single artifact
    ///
    /// See the module docs for the skip/conditional/verify discipline. A
    /// network failure is surfaced with the failing URL and is not retried
    /// internally.
    pub async fn fetch(&self, url: &str, dest: &Path, opts: &FetchOptions) -> Result<FetchOutcome> {
        if opts.skip_if_exists && dest.exists() {
            debug!(url, dest = %dest.display(), "destination exists, skipping fetch");
            return Ok(FetchOutcome::Unchanged);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut request = self.client.get(url);
        if opts.use_conditional && dest.exists() {
            if let Some(etag) = read_etag_sidecar(dest).await {
                request = request.header(header::IF_NONE_MATCH, etag);
            }
            if let Some(since) = if_modified_since(dest) {
                request = request.header(header::IF_MODIFIED_SINCE, since);
            }
        }

        let response = request.send().await.map_err(|e| Error::Network {
            url: url.to_string(),
            source: e,
        })?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(url, "not modified, keeping existing file");
            return Ok(FetchOutcome::Unchanged);
        }

        let response = response.error_for_status().map_err(|e| Error::Network {
            url: url.to_string(),
            source: e,
        })?;

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        // Stream the body to a temporary next to the destination; only a
        // fully transferred (and, if requested, verified) file is renamed
        // into place.
        let part = sidecar_path(dest, "part");
        let mut file = tokio::fs::File::create(&part).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Network {
                url: url.to_string(),
                source: e,
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = &opts.expected_sha1 {
            // A mismatch keeps the temporary for diagnosis and leaves the
            // final path untouched.
            verify::verify(&part, expected).await?;
        }

        tokio::fs::rename(&part, dest).await?;

        match etag {
            Some(etag) => {
                let sidecar = sidecar_path(dest, "etag");
                if let Err(e) = tokio::fs::write(&sidecar, etag).await {
                    warn!(dest = %dest.display(), error = %e, "failed to write ETag sidecar");
                }
            }
            None => {
                // Stale sidecar from a previous server would poison future
                // conditional requests.
                let _ = tokio::fs::remove_file(sidecar_path(dest, "etag")).await;
            }
        }

        debug!(url, dest = %dest.display(), bytes = written, "downloaded");
        Ok(FetchOutcome::Updated)
    }

    /// Fetch a batch of sibling artifacts for a single logical task
    ///
    /// Each is fetched independently; the first failure aborts the batch.
    /// The outcome is [`FetchOutcome::Updated`] iff any member updated.
    pub async fn fetch_all(&self, specs: &[FetchSpec], opts: &FetchOptions) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome::Unchanged;
        for spec in specs {
            let item_opts = FetchOptions {
                expected_sha1: spec.expected_sha1.clone(),
                ..opts.clone()
            };
            if self.fetch(&spec.url, &spec.dest, &item_opts).await? == FetchOutcome::Updated {
                outcome = FetchOutcome::Updated;
            }
        }
        Ok(outcome)
    }
}

/// Sidecar path next to a destination: `client.jar` -> `client.jar.<ext>`
fn sidecar_path(dest: &Path, ext: &str) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{ext}"));
    dest.with_file_name(name)
}

async fn read_etag_sidecar(dest: &Path) -> Option<String> {
    let raw = tokio::fs::read_to_string(sidecar_path(dest, "etag"))
        .await
        .ok()?;
    let etag = raw.trim().to_string();
    (!etag.is_empty()).then_some(etag)
}

/// Format the destination mtime as an HTTP date for `If-Modified-Since`
fn if_modified_since(dest: &Path) -> Option<String> {
    let mtime = std::fs::metadata(dest).ok()?.modified().ok()?;
    let dt: chrono::DateTime<chrono::Utc> = mtime.into();
    Some(dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}
