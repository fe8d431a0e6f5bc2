//! Asset set downloading
//!
//! Expands an asset index into its set of content-addressed object downloads.
//! Objects are deduplicated by hash (two logical paths may share one object)
//! and stored under `objects/<hash[0..2]>/<hash>`, which makes identical
//! assets shareable across game versions. Individual object fetches are
//! independent, so they run on a bounded worker pool; distinct hashes map to
//! distinct destination paths, so there is no write contention.

use crate::error::Result;
use crate::fetch::{FetchOptions, Fetcher};
use crate::manifest::{AssetIndex, AssetObject};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Summary of one asset set download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssetStats {
    /// Logical asset paths in the index
    pub total: usize,
    /// Distinct content hashes after deduplication
    pub distinct: usize,
    /// Objects actually fetched this run
    pub downloaded: usize,
    /// Objects already present in the store
    pub reused: usize,
}

/// Downloads the object set referenced by an asset index
pub struct AssetDownloader {
    fetcher: Fetcher,
    resources_url: String,
    max_concurrent: usize,
}

impl AssetDownloader {
    /// Create a downloader fetching from `resources_url` with at most
    /// `max_concurrent` in-flight object downloads
    pub fn new(fetcher: Fetcher, resources_url: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            resources_url: resources_url.into(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Download every object the index references that is not already present
    ///
    /// Each fetched object is verified against its content hash before it is
    /// considered present. The first failure aborts the whole download.
    pub async fn download(&self, index_path: &Path, objects_root: &Path) -> Result<AssetStats> {
        let index = AssetIndex::read(index_path)?;
        let distinct = index.distinct_objects();

        let mut stats = AssetStats {
            total: index.objects.len(),
            distinct: distinct.len(),
            ..Default::default()
        };

        // Owned objects: the per-object futures outlive this borrow of the
        // index once they are boxed into a task action.
        let missing: Vec<AssetObject> = distinct
            .into_iter()
            .filter(|object| !objects_root.join(object.relative_path()).exists())
            .cloned()
            .collect();
        stats.reused = stats.distinct - missing.len();

        debug!(
            total = stats.total,
            distinct = stats.distinct,
            missing = missing.len(),
            "expanding asset index"
        );

        let results = futures::stream::iter(missing.into_iter().map(|object| {
            let url = self.object_url(&object);
            let dest = objects_root.join(object.relative_path());
            let opts = FetchOptions {
                skip_if_exists: true,
                use_conditional: false,
                expected_sha1: Some(object.hash.clone()),
            };
            let fetcher = self.fetcher.clone();
            async move { fetcher.fetch(&url, &dest, &opts).await }
        }))
        .buffer_unordered(self.max_concurrent)
        .collect::<Vec<_>>()
        .await;

        for result in results {
            result?;
            stats.downloaded += 1;
        }

        info!(
            downloaded = stats.downloaded,
            reused = stats.reused,
            "asset objects up to date"
        );
        Ok(stats)
    }

    /// Canonical object storage URL: `base/<hash[0..2]>/<hash>`
    fn object_url(&self, object: &AssetObject) -> String {
        format!(
            "{}/{}",
            self.resources_url.trim_end_matches('/'),
            object.relative_path()
        )
    }
}

/// Remove the cached asset store (indexes and objects)
pub async fn clean_assets(assets_root: &Path) -> Result<()> {
    if assets_root.exists() {
        info!(path = %assets_root.display(), "cleaning asset folders");
        tokio::fs::remove_dir_all(assets_root).await?;
    }
    Ok(())
}

/// The destination path of an object inside the store
///
/// Hashes shorter than the two-character bucket prefix are bucketed under
/// themselves rather than panicking; [`crate::manifest::AssetIndex`] rejects
/// such hashes at parse time.
pub fn object_path(objects_root: &Path, hash: &str) -> PathBuf {
    let bucket = hash.get(..2).unwrap_or(hash);
    objects_root.join(bucket).join(hash)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::error::Error;
    use sha1::{Digest, Sha1};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha1_hex(data: &[u8]) -> String {
        let digest = Sha1::digest(data);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn write_index(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let objects: Vec<String> = entries
            .iter()
            .map(|(logical, data)| {
                format!(
                    r#""{}": {{"hash": "{}", "size": {}}}"#,
                    logical,
                    sha1_hex(data),
                    data.len()
                )
            })
            .collect();
        let json = format!(r#"{{"objects": {{{}}}}}"#, objects.join(","));
        let index_path = dir.join("1.7.10.json");
        std::fs::write(&index_path, json).unwrap();
        index_path
    }

    async fn mount_object(server: &MockServer, data: &[u8], expect: u64) {
        let hash = sha1_hex(data);
        Mock::given(method("GET"))
            .and(path(format!("/{}/{}", &hash[..2], hash)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(data.to_vec()))
            .expect(expect)
            .mount(server)
            .await;
    }

    fn downloader(server: &MockServer) -> AssetDownloader {
        let fetcher = Fetcher::new(&HttpConfig::default()).unwrap();
        AssetDownloader::new(fetcher, server.uri(), 4)
    }

    #[tokio::test]
    async fn shared_hash_downloads_exactly_once() {
        let server = MockServer::start().await;
        mount_object(&server, b"shared sound", 1).await;

        let dir = tempfile::tempdir().unwrap();
        let index = write_index(
            dir.path(),
            &[
                ("sounds/a.ogg", b"shared sound"),
                ("sounds/b.ogg", b"shared sound"),
            ],
        );
        let objects_root = dir.path().join("objects");

        let stats = downloader(&server)
            .download(&index, &objects_root)
            .await
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.distinct, 1);
        assert_eq!(stats.downloaded, 1);
        let hash = sha1_hex(b"shared sound");
        assert!(object_path(&objects_root, &hash).exists());
        server.verify().await;
    }

    #[tokio::test]
    async fn present_objects_are_reused_without_network() {
        let server = MockServer::start().await;
        mount_object(&server, b"texture", 0).await;

        let dir = tempfile::tempdir().unwrap();
        let index = write_index(dir.path(), &[("textures/stone.png", b"texture")]);
        let objects_root = dir.path().join("objects");

        let hash = sha1_hex(b"texture");
        let pre = object_path(&objects_root, &hash);
        std::fs::create_dir_all(pre.parent().unwrap()).unwrap();
        std::fs::write(&pre, b"texture").unwrap();

        let stats = downloader(&server)
            .download(&index, &objects_root)
            .await
            .unwrap();

        assert_eq!(stats.downloaded, 0);
        assert_eq!(stats.reused, 1);
        server.verify().await;
    }

    #[tokio::test]
    async fn corrupt_object_fails_and_never_lands_in_store() {
        let server = MockServer::start().await;
        let hash = sha1_hex(b"the real bytes");
        Mock::given(method("GET"))
            .and(path(format!("/{}/{}", &hash[..2], hash)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let index = write_index(dir.path(), &[("lang/en_US.lang", b"the real bytes")]);
        let objects_root = dir.path().join("objects");

        let err = downloader(&server)
            .download(&index, &objects_root)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Integrity { .. }));
        assert!(!object_path(&objects_root, &hash).exists());
    }

    #[tokio::test]
    async fn download_runs_inside_a_spawned_task() {
        let server = MockServer::start().await;
        mount_object(&server, b"spawned fetch", 1).await;

        let dir = tempfile::tempdir().unwrap();
        let index = write_index(dir.path(), &[("sounds/levelup.ogg", b"spawned fetch")]);
        let objects_root = dir.path().join("objects");

        // The download future must be Send + 'static, as when it is boxed
        // into a task graph action.
        let downloader = std::sync::Arc::new(downloader(&server));
        let handle = tokio::spawn({
            let downloader = downloader.clone();
            async move { downloader.download(&index, &objects_root).await }
        });

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.downloaded, 1);
        server.verify().await;
    }

    #[test]
    fn object_path_tolerates_a_short_hash() {
        let root = Path::new("/store");
        assert_eq!(object_path(root, "a"), Path::new("/store/a/a"));
        assert_eq!(
            object_path(root, "10a54fc66c8f479bb65c8d39c3b62265ac82e742"),
            Path::new("/store/10/10a54fc66c8f479bb65c8d39c3b62265ac82e742")
        );
    }

    #[tokio::test]
    async fn clean_assets_removes_tree_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        std::fs::create_dir_all(assets.join("objects/aa")).unwrap();
        std::fs::write(assets.join("objects/aa/aabb"), b"x").unwrap();

        clean_assets(&assets).await.unwrap();
        assert!(!assets.exists());

        // Second clean on a missing tree is a no-op
        clean_assets(&assets).await.unwrap();
    }
}
