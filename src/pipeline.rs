//! Standard vanilla artifact task set
//!
//! Wires the fetch/verify/extract/merge/tool stages into a [`TaskGraph`]
//! with the dependency edges of the artifact data flow:
//!
//! ```text
//! catalog -> version manifest -> (jars, asset index)
//!         -> (verified jars, object set) -> merged jar -> decompiled src
//! ```
//!
//! Every download node carries an existence-based skip predicate, so a warm
//! cache run executes nothing and touches the network not at all.

use crate::assets::{self, AssetDownloader};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::fetch::{FetchOptions, FetchSpec, Fetcher};
use crate::graph::{GraphReport, SkipPredicate, TaskAction, TaskGraph, TaskId};
use crate::launch::{ClientLaunch, ServerLaunch};
use crate::manifest::{VersionCatalog, VersionManifest};
use crate::merge;
use crate::natives;
use crate::tools;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Worker bound for independent graph nodes
const MAX_GRAPH_WORKERS: usize = 4;

/// Cache subdirectory for vanilla game artifacts
pub const MC_DOWNLOAD_PATH: &str = "mc-vanilla";

/// Exposed operation names, as consumed by the embedding build CLI
pub mod task {
    /// Fetch the launcher version catalog
    pub const DOWNLOAD_CATALOG: &str = "download-catalog";
    /// Resolve and fetch the per-version manifest
    pub const DOWNLOAD_VERSION_MANIFEST: &str = "download-version-manifest";
    /// Fetch and verify the asset index document
    pub const DOWNLOAD_ASSET_MANIFEST: &str = "download-asset-manifest";
    /// Fetch and verify the client and server jars
    pub const DOWNLOAD_VANILLA_JARS: &str = "download-vanilla-jars";
    /// Expand the asset index into its verified object set
    pub const DOWNLOAD_VANILLA_ASSETS: &str = "download-vanilla-assets";
    /// Unpack native libraries into the run directory
    pub const EXTRACT_NATIVES: &str = "extract-natives";
    /// Merge the client and server jars
    pub const MERGE_SIDES: &str = "merge-sides";
    /// Decompile the merged jar (registered when a decompiler is configured)
    pub const DECOMPILE: &str = "decompile";
    /// Recompile patched sources (registered when a recompiler is configured)
    pub const RECOMPILE: &str = "recompile";
    /// Launch the vanilla client
    pub const RUN_CLIENT: &str = "run-client";
    /// Launch the vanilla server
    pub const RUN_SERVER: &str = "run-server";
    /// Remove the cached asset store
    pub const CLEAN_ASSETS: &str = "clean-assets";
}

/// Explicit resolved-dependency-set input
///
/// Produced by the external package resolver from the maven-style library
/// repositories; consumed here as plain file path sets. Order follows
/// dependency-resolution order and is significant for native extraction.
#[derive(Clone, Debug, Default)]
pub struct ResolvedLibraries {
    /// Library jars for the client classpath
    pub classpath: Vec<PathBuf>,
    /// Jars containing platform native libraries
    pub natives: Vec<PathBuf>,
}

/// All cache and output locations, derived from the configuration snapshot
///
/// The existence of a file at its path *is* the "already built" signal; no
/// separate metadata is maintained.
#[derive(Clone, Debug)]
pub struct VanillaPaths {
    /// `build/mc-vanilla/all_versions_manifest.json`
    pub catalog: PathBuf,
    /// `build/mc-vanilla/mc_version_manifest.json`
    pub version_manifest: PathBuf,
    /// Assets root containing `indexes/` and `objects/`
    pub assets_root: PathBuf,
    /// `<cacheRoot>/assets/indexes/<version>.json`
    pub asset_index: PathBuf,
    /// `<cacheRoot>/assets/objects`
    pub objects_root: PathBuf,
    /// `<cacheRoot>/mc-vanilla/<version>/client.jar`
    pub client_jar: PathBuf,
    /// `<cacheRoot>/mc-vanilla/<version>/server.jar`
    pub server_jar: PathBuf,
    /// `<cacheRoot>/mc-vanilla/<version>/merged.jar`
    pub merged_jar: PathBuf,
    /// Decompiler output directory
    pub decompiled_src: PathBuf,
    /// Recompiled artifact
    pub recompiled_jar: PathBuf,
    /// Game run directory
    pub run_dir: PathBuf,
    /// Extracted natives, under the run directory
    pub natives_dir: PathBuf,
}

impl VanillaPaths {
    /// Derive the full layout from a configuration snapshot
    pub fn new(config: &PipelineConfig) -> Self {
        let downloads = config.build_dir.join(MC_DOWNLOAD_PATH);
        let assets_root = config.cache_root.join("assets");
        let version_cache = config.cache_root.join(MC_DOWNLOAD_PATH).join(&config.version);
        Self {
            catalog: downloads.join("all_versions_manifest.json"),
            version_manifest: downloads.join("mc_version_manifest.json"),
            asset_index: assets_root
                .join("indexes")
                .join(format!("{}.json", config.version)),
            objects_root: assets_root.join("objects"),
            assets_root,
            client_jar: version_cache.join("client.jar"),
            server_jar: version_cache.join("server.jar"),
            merged_jar: version_cache.join("merged.jar"),
            decompiled_src: version_cache.join("decompiled-src"),
            recompiled_jar: version_cache.join("recompiled.jar"),
            run_dir: config.run_dir.clone(),
            natives_dir: config.run_dir.join("natives"),
        }
    }
}

/// The registered vanilla task set
///
/// Construction registers every exposed operation on an internal
/// [`TaskGraph`]; [`VanillaTasks::run`] executes named targets with their
/// transitive dependencies.
pub struct VanillaTasks {
    graph: TaskGraph,
    paths: Arc<VanillaPaths>,
    config: Arc<PipelineConfig>,
}

impl VanillaTasks {
    /// Register the task set for a configuration snapshot and resolved
    /// library set
    pub fn build(config: PipelineConfig, libraries: ResolvedLibraries) -> Result<Self> {
        let config = Arc::new(config);
        let paths = Arc::new(VanillaPaths::new(&config));
        let fetcher = Fetcher::new(&config.http)?;
        let mut graph = TaskGraph::new(MAX_GRAPH_WORKERS);

        let catalog = Self::register_catalog(&mut graph, &config, &paths, &fetcher)?;
        let manifest = Self::register_version_manifest(&mut graph, &config, &paths, &fetcher, catalog)?;
        Self::register_asset_manifest(&mut graph, &paths, &fetcher, manifest)?;
        let jars = Self::register_jars(&mut graph, &paths, &fetcher, manifest)?;
        let assets_task = Self::register_assets(&mut graph, &config, &paths, &fetcher)?;
        let natives_task = Self::register_natives(&mut graph, &paths, &libraries)?;
        let merged = Self::register_merge(&mut graph, &paths, jars)?;
        Self::register_tool_stages(&mut graph, &config, &paths, merged)?;
        Self::register_runs(&mut graph, &config, &paths, &libraries, jars, assets_task, natives_task)?;
        Self::register_clean(&mut graph, &paths)?;

        Ok(Self {
            graph,
            paths,
            config,
        })
    }

    /// The derived cache layout
    pub fn paths(&self) -> &VanillaPaths {
        &self.paths
    }

    /// The configuration snapshot the graph was built from
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The underlying task graph
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Execute named operations and their transitive dependencies
    pub async fn run(&self, targets: &[&str]) -> Result<GraphReport> {
        self.graph.run(targets).await
    }

    /// The operations a full artifact preparation runs
    ///
    /// Everything needed to compile against the game: verified jars, the
    /// asset set, extracted natives, the merged jar and, when tools are
    /// configured, decompiled and recompiled outputs.
    pub fn prepare_targets(&self) -> Vec<&'static str> {
        let mut targets = vec![
            task::DOWNLOAD_VANILLA_ASSETS,
            task::EXTRACT_NATIVES,
            task::MERGE_SIDES,
        ];
        if self.graph.task_id(task::RECOMPILE).is_some() {
            targets.push(task::RECOMPILE);
        } else if self.graph.task_id(task::DECOMPILE).is_some() {
            targets.push(task::DECOMPILE);
        }
        targets
    }

    fn exists_skip(path: &Path) -> SkipPredicate {
        let path = path.to_path_buf();
        Box::new(move || path.exists())
    }

    fn register_catalog(
        graph: &mut TaskGraph,
        config: &Arc<PipelineConfig>,
        paths: &Arc<VanillaPaths>,
        fetcher: &Fetcher,
    ) -> Result<TaskId> {
        let url = config.http.catalog_url.clone();
        let dest = paths.catalog.clone();
        let fetcher = fetcher.clone();
        let action: TaskAction = Box::new(move || {
            let url = url.clone();
            let dest = dest.clone();
            let fetcher = fetcher.clone();
            Box::pin(async move {
                fetcher.fetch(&url, &dest, &FetchOptions::cached()).await?;
                Ok(())
            })
        });
        graph.add_task(
            task::DOWNLOAD_CATALOG,
            &[],
            Some(Self::exists_skip(&paths.catalog)),
            action,
        )
    }

    fn register_version_manifest(
        graph: &mut TaskGraph,
        config: &Arc<PipelineConfig>,
        paths: &Arc<VanillaPaths>,
        fetcher: &Fetcher,
        catalog: TaskId,
    ) -> Result<TaskId> {
        let version = config.version.clone();
        let catalog_path = paths.catalog.clone();
        let dest = paths.version_manifest.clone();
        let fetcher = fetcher.clone();
        let action: TaskAction = Box::new(move || {
            let version = version.clone();
            let catalog_path = catalog_path.clone();
            let dest = dest.clone();
            let fetcher = fetcher.clone();
            Box::pin(async move {
                let catalog = VersionCatalog::read(&catalog_path)?;
                let url = catalog.resolve_manifest_url(&version)?.to_string();
                fetcher.fetch(&url, &dest, &FetchOptions::cached()).await?;
                // Surface schema problems here rather than in a downstream node
                VersionManifest::read(&dest)?;
                Ok(())
            })
        });
        graph.add_task(
            task::DOWNLOAD_VERSION_MANIFEST,
            &[catalog],
            Some(Self::exists_skip(&paths.version_manifest)),
            action,
        )
    }

    fn register_asset_manifest(
        graph: &mut TaskGraph,
        paths: &Arc<VanillaPaths>,
        fetcher: &Fetcher,
        manifest: TaskId,
    ) -> Result<TaskId> {
        let manifest_path = paths.version_manifest.clone();
        let dest = paths.asset_index.clone();
        let fetcher = fetcher.clone();
        let action: TaskAction = Box::new(move || {
            let manifest_path = manifest_path.clone();
            let dest = dest.clone();
            let fetcher = fetcher.clone();
            Box::pin(async move {
                let manifest = VersionManifest::read(&manifest_path)?;
                fetcher
                    .fetch(
                        &manifest.asset_index.url,
                        &dest,
                        &FetchOptions::cached_verified(manifest.asset_index.sha1),
                    )
                    .await?;
                Ok(())
            })
        });
        graph.add_task(
            task::DOWNLOAD_ASSET_MANIFEST,
            &[manifest],
            Some(Self::exists_skip(&paths.asset_index)),
            action,
        )
    }

    fn register_jars(
        graph: &mut TaskGraph,
        paths: &Arc<VanillaPaths>,
        fetcher: &Fetcher,
        manifest: TaskId,
    ) -> Result<TaskId> {
        let manifest_path = paths.version_manifest.clone();
        let client = paths.client_jar.clone();
        let server = paths.server_jar.clone();
        let fetcher = fetcher.clone();
        let action: TaskAction = Box::new(move || {
            let manifest_path = manifest_path.clone();
            let client = client.clone();
            let server = server.clone();
            let fetcher = fetcher.clone();
            Box::pin(async move {
                let manifest = VersionManifest::read(&manifest_path)?;
                let specs = [
                    FetchSpec {
                        url: manifest.downloads.client.url.clone(),
                        dest: client,
                        expected_sha1: Some(manifest.downloads.client.sha1.clone()),
                    },
                    FetchSpec {
                        url: manifest.downloads.server.url.clone(),
                        dest: server,
                        expected_sha1: Some(manifest.downloads.server.sha1.clone()),
                    },
                ];
                fetcher.fetch_all(&specs, &FetchOptions::cached()).await?;
                Ok(())
            })
        });

        // Skip only when both side jars are present
        let client = paths.client_jar.clone();
        let server = paths.server_jar.clone();
        let skip: SkipPredicate = Box::new(move || client.exists() && server.exists());
        graph.add_task(task::DOWNLOAD_VANILLA_JARS, &[manifest], Some(skip), action)
    }

    fn register_assets(
        graph: &mut TaskGraph,
        config: &Arc<PipelineConfig>,
        paths: &Arc<VanillaPaths>,
        fetcher: &Fetcher,
    ) -> Result<TaskId> {
        let asset_manifest = graph
            .task_id(task::DOWNLOAD_ASSET_MANIFEST)
            .ok_or_else(|| Error::UnknownTask(task::DOWNLOAD_ASSET_MANIFEST.into()))?;
        let index_path = paths.asset_index.clone();
        let objects_root = paths.objects_root.clone();
        let downloader = Arc::new(AssetDownloader::new(
            fetcher.clone(),
            config.http.resources_url.clone(),
            config.http.max_concurrent_assets,
        ));
        let action: TaskAction = Box::new(move || {
            let index_path = index_path.clone();
            let objects_root = objects_root.clone();
            let downloader = downloader.clone();
            Box::pin(async move {
                downloader.download(&index_path, &objects_root).await?;
                Ok(())
            })
        });
        // No skip predicate: presence is checked per object, which is what
        // makes identical assets shareable across versions.
        graph.add_task(task::DOWNLOAD_VANILLA_ASSETS, &[asset_manifest], None, action)
    }

    fn register_natives(
        graph: &mut TaskGraph,
        paths: &Arc<VanillaPaths>,
        libraries: &ResolvedLibraries,
    ) -> Result<TaskId> {
        let jars = libraries.natives.clone();
        let output = paths.natives_dir.clone();
        let action: TaskAction = Box::new(move || {
            let jars = jars.clone();
            let output = output.clone();
            Box::pin(async move {
                natives::extract_natives(&jars, &output).await?;
                Ok(())
            })
        });

        // Up to date when the output is at least as new as every input jar
        let jars = libraries.natives.clone();
        let output = paths.natives_dir.clone();
        let skip: SkipPredicate = Box::new(move || natives::up_to_date(&jars, &output));
        graph.add_task(task::EXTRACT_NATIVES, &[], Some(skip), action)
    }

    fn register_merge(
        graph: &mut TaskGraph,
        paths: &Arc<VanillaPaths>,
        jars: TaskId,
    ) -> Result<TaskId> {
        let client = paths.client_jar.clone();
        let server = paths.server_jar.clone();
        let merged = paths.merged_jar.clone();
        let action: TaskAction = Box::new(move || {
            let client = client.clone();
            let server = server.clone();
            let merged = merged.clone();
            Box::pin(async move {
                merge::merge_sides(&client, &server, &merged).await?;
                Ok(())
            })
        });
        graph.add_task(
            task::MERGE_SIDES,
            &[jars],
            Some(Self::exists_skip(&paths.merged_jar)),
            action,
        )
    }

    fn register_tool_stages(
        graph: &mut TaskGraph,
        config: &Arc<PipelineConfig>,
        paths: &Arc<VanillaPaths>,
        merged: TaskId,
    ) -> Result<()> {
        let Some(decompiler) = config.tools.decompiler.clone() else {
            return Ok(());
        };

        let merged_jar = paths.merged_jar.clone();
        let sources = paths.decompiled_src.clone();
        let action: TaskAction = Box::new(move || {
            let decompiler = decompiler.clone();
            let merged_jar = merged_jar.clone();
            let sources = sources.clone();
            Box::pin(async move { tools::decompile(&decompiler, &merged_jar, &sources).await })
        });
        let decompile = graph.add_task(
            task::DECOMPILE,
            &[merged],
            Some(Self::exists_skip(&paths.decompiled_src)),
            action,
        )?;

        let Some(recompiler) = config.tools.recompiler.clone() else {
            return Ok(());
        };
        let sources = paths.decompiled_src.clone();
        let output = paths.recompiled_jar.clone();
        let action: TaskAction = Box::new(move || {
            let recompiler = recompiler.clone();
            let sources = sources.clone();
            let output = output.clone();
            Box::pin(async move { tools::recompile(&recompiler, &sources, &output).await })
        });
        graph.add_task(
            task::RECOMPILE,
            &[decompile],
            Some(Self::exists_skip(&paths.recompiled_jar)),
            action,
        )?;
        Ok(())
    }

    fn register_runs(
        graph: &mut TaskGraph,
        config: &Arc<PipelineConfig>,
        paths: &Arc<VanillaPaths>,
        libraries: &ResolvedLibraries,
        jars: TaskId,
        assets: TaskId,
        natives: TaskId,
    ) -> Result<()> {
        let java = config
            .tools
            .java_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("java"));

        let client = ClientLaunch {
            java: java.clone(),
            client_jar: paths.client_jar.clone(),
            libraries: libraries.classpath.clone(),
            natives_dir: paths.natives_dir.clone(),
            run_dir: paths.run_dir.clone(),
            assets_dir: paths.assets_root.clone(),
            asset_index: config.version.clone(),
            version: config.version.clone(),
        };
        let action: TaskAction = Box::new(move || {
            let invocation = client.invocation();
            Box::pin(async move { invocation.run().await })
        });
        graph.add_task(task::RUN_CLIENT, &[jars, assets, natives], None, action)?;

        let server = ServerLaunch {
            java,
            server_jar: paths.server_jar.clone(),
            run_dir: paths.run_dir.clone(),
        };
        let action: TaskAction = Box::new(move || {
            let invocation = server.invocation();
            Box::pin(async move { invocation.run().await })
        });
        graph.add_task(task::RUN_SERVER, &[jars], None, action)?;
        Ok(())
    }

    fn register_clean(graph: &mut TaskGraph, paths: &Arc<VanillaPaths>) -> Result<TaskId> {
        let assets_root = paths.assets_root.clone();
        let action: TaskAction = Box::new(move || {
            let assets_root = assets_root.clone();
            Box::pin(async move { assets::clean_assets(&assets_root).await })
        });
        graph.add_task(task::CLEAN_ASSETS, &[], None, action)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolCommand;

    fn test_config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::for_version("1.7.10");
        config.build_dir = root.join("build");
        config.cache_root = root.join("cache");
        config.run_dir = root.join("run");
        config
    }

    #[test]
    fn paths_follow_the_cache_layout() {
        let config = test_config(Path::new("/work"));
        let paths = VanillaPaths::new(&config);

        assert_eq!(
            paths.catalog,
            Path::new("/work/build/mc-vanilla/all_versions_manifest.json")
        );
        assert_eq!(
            paths.version_manifest,
            Path::new("/work/build/mc-vanilla/mc_version_manifest.json")
        );
        assert_eq!(
            paths.asset_index,
            Path::new("/work/cache/assets/indexes/1.7.10.json")
        );
        assert_eq!(paths.objects_root, Path::new("/work/cache/assets/objects"));
        assert_eq!(
            paths.client_jar,
            Path::new("/work/cache/mc-vanilla/1.7.10/client.jar")
        );
        assert_eq!(
            paths.server_jar,
            Path::new("/work/cache/mc-vanilla/1.7.10/server.jar")
        );
        assert_eq!(paths.natives_dir, Path::new("/work/run/natives"));
    }

    #[test]
    fn registers_the_exposed_operations() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = VanillaTasks::build(test_config(dir.path()), ResolvedLibraries::default())
            .unwrap();
        let names: Vec<&str> = tasks.graph().task_names().collect();

        for expected in [
            task::DOWNLOAD_CATALOG,
            task::DOWNLOAD_VERSION_MANIFEST,
            task::DOWNLOAD_ASSET_MANIFEST,
            task::DOWNLOAD_VANILLA_JARS,
            task::DOWNLOAD_VANILLA_ASSETS,
            task::EXTRACT_NATIVES,
            task::MERGE_SIDES,
            task::RUN_CLIENT,
            task::RUN_SERVER,
            task::CLEAN_ASSETS,
        ] {
            assert!(names.contains(&expected), "missing task {expected}");
        }
        // Tool stages are absent without configured tools
        assert!(!names.contains(&task::DECOMPILE));
        assert!(!names.contains(&task::RECOMPILE));
    }

    #[test]
    fn tool_stages_register_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.tools.decompiler = Some(ToolCommand {
            program: PathBuf::from("/opt/fernflower"),
            args: vec![],
        });
        config.tools.recompiler = Some(ToolCommand {
            program: PathBuf::from("/opt/recompile"),
            args: vec![],
        });

        let tasks = VanillaTasks::build(config, ResolvedLibraries::default()).unwrap();
        assert!(tasks.graph().task_id(task::DECOMPILE).is_some());
        assert!(tasks.graph().task_id(task::RECOMPILE).is_some());
        assert_eq!(tasks.prepare_targets().last(), Some(&task::RECOMPILE));
    }

    #[test]
    fn prepare_targets_without_tools() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = VanillaTasks::build(test_config(dir.path()), ResolvedLibraries::default())
            .unwrap();
        assert_eq!(
            tasks.prepare_targets(),
            vec![
                task::DOWNLOAD_VANILLA_ASSETS,
                task::EXTRACT_NATIVES,
                task::MERGE_SIDES,
            ]
        );
    }
}
