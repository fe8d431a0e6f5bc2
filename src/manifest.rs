//! Launcher catalog, version manifest and asset index documents
//!
//! These are the three upstream JSON documents the pipeline consumes. All
//! parsing is pure; fetching is the [`crate::fetch`] module's job. Documents
//! are parsed lazily from their cached files and never mutated after parse.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level launcher catalog: every known game version and where to fetch
/// its manifest
///
/// Immutable once fetched; sourced once per invocation.
#[derive(Clone, Debug, Deserialize)]
pub struct VersionCatalog {
    /// Ordered list of catalog entries, newest first upstream
    pub versions: Vec<CatalogEntry>,
}

/// One `{id, manifestUrl}` entry in the launcher catalog
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogEntry {
    /// Version identifier (e.g. "1.7.10")
    pub id: String,
    /// URL of this version's manifest document
    pub url: String,
}

impl VersionCatalog {
    /// Parse a catalog from its raw JSON text
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }

    /// Parse the catalog from its cached file
    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json).map_err(|e| Error::MalformedManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Resolve the manifest URL for a version identifier
    ///
    /// Fails with [`Error::VersionNotFound`] when the version is absent from
    /// the catalog.
    pub fn resolve_manifest_url(&self, version: &str) -> Result<&str> {
        self.versions
            .iter()
            .find(|entry| entry.id == version)
            .map(|entry| entry.url.as_str())
            .ok_or_else(|| Error::VersionNotFound(version.to_string()))
    }
}

/// Per-version manifest: artifact URLs and expected SHA-1 checksums
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionManifest {
    /// Asset index document location and checksum
    pub asset_index: AssetIndexRef,
    /// Side-specific downloadable artifacts
    pub downloads: SideDownloads,
}

/// Reference to the asset index document
#[derive(Clone, Debug, Deserialize)]
pub struct AssetIndexRef {
    /// Asset index identifier (the on-disk cache key under `indexes/`)
    pub id: String,
    /// Expected SHA-1 of the index document
    pub sha1: String,
    /// Where to fetch the index
    pub url: String,
}

/// The client and server artifact entries of a version manifest
#[derive(Clone, Debug, Deserialize)]
pub struct SideDownloads {
    /// Client jar
    pub client: ArtifactRef,
    /// Server jar
    pub server: ArtifactRef,
}

/// A single downloadable artifact with its expected checksum
#[derive(Clone, Debug, Deserialize)]
pub struct ArtifactRef {
    /// Expected SHA-1 hex digest
    pub sha1: String,
    /// Artifact size in bytes, as declared upstream
    #[serde(default)]
    pub size: u64,
    /// Where to fetch the artifact
    pub url: String,
}

impl VersionManifest {
    /// Parse a version manifest from its raw JSON text
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }

    /// Parse the version manifest from its cached file
    ///
    /// Fails with [`Error::MalformedManifest`] on schema mismatch.
    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json).map_err(|e| Error::MalformedManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Asset index: logical asset path to content-addressed object mapping
///
/// Object storage location is derived from the content hash alone, so
/// identical assets are shared across game versions.
#[derive(Clone, Debug, Deserialize)]
pub struct AssetIndex {
    /// Logical path -> object descriptor
    ///
    /// A `BTreeMap` keeps iteration deterministic.
    pub objects: BTreeMap<String, AssetObject>,
}

/// A single content-addressed asset object
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AssetObject {
    /// SHA-1 hex digest of the object contents; doubles as the cache key
    pub hash: String,
    /// Object size in bytes
    pub size: u64,
}

impl AssetObject {
    /// Relative storage path under the objects root: `hash[0..2]/hash`
    ///
    /// Hashes shorter than the bucket prefix are bucketed under themselves;
    /// [`AssetIndex::parse`] rejects them before they reach the store.
    pub fn relative_path(&self) -> String {
        let bucket = self.hash.get(..2).unwrap_or(&self.hash);
        format!("{bucket}/{}", self.hash)
    }

    fn hash_is_valid(&self) -> bool {
        self.hash.len() == 40 && self.hash.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl AssetIndex {
    /// Parse an asset index from its raw JSON text
    ///
    /// Every object hash must be a 40-character hex digest; anything else is
    /// a malformed index, not a valid store key.
    pub fn parse(json: &str) -> Result<Self> {
        let index: Self = serde_json::from_str(json)?;
        index.check_hashes(Path::new(""))?;
        Ok(index)
    }

    /// Parse the asset index from its cached file
    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let index: Self =
            serde_json::from_str(&json).map_err(|e| Error::MalformedManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        index.check_hashes(path)?;
        Ok(index)
    }

    fn check_hashes(&self, path: &Path) -> Result<()> {
        for (name, object) in &self.objects {
            if !object.hash_is_valid() {
                return Err(Error::MalformedManifest {
                    path: PathBuf::from(path),
                    reason: format!("object {name} has invalid hash {:?}", object.hash),
                });
            }
        }
        Ok(())
    }

    /// The deduplicated set of distinct objects, ordered by hash
    ///
    /// Two logical paths may share one object; each distinct hash is
    /// downloaded at most once.
    pub fn distinct_objects(&self) -> Vec<&AssetObject> {
        let mut by_hash: BTreeMap<&str, &AssetObject> = BTreeMap::new();
        for object in self.objects.values() {
            by_hash.entry(object.hash.as_str()).or_insert(object);
        }
        by_hash.into_values().collect()
    }
}
