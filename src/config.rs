//! Configuration types for craftprep
//!
//! The pipeline reads an immutable [`PipelineConfig`] snapshot resolved once
//! before the task graph begins executing. Task closures receive it behind an
//! `Arc`; nothing mutates it after construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default launcher catalog endpoint (the only hardcoded discovery root)
pub const DEFAULT_CATALOG_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest.json";

/// Default content-addressed asset object storage root
pub const DEFAULT_RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Immutable pipeline configuration snapshot
///
/// Resolved once from the embedding build tool's configuration surface before
/// graph execution starts. The target `version` and `lwjgl_version` are
/// read-only inputs supplied by the embedder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target game version identifier (e.g. "1.7.10")
    pub version: String,

    /// Target native-library-set (LWJGL) version
    ///
    /// Consumed by the external dependency resolver that produces the
    /// [`crate::pipeline::ResolvedLibraries`] input; recorded here so the
    /// snapshot is self-describing.
    #[serde(default = "default_lwjgl_version")]
    pub lwjgl_version: String,

    /// Build output root (default: "./build")
    ///
    /// Holds the launcher catalog and version manifest documents.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Shared cache root (default: "./cache")
    ///
    /// Holds version-keyed jars and the cross-version asset store.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Run directory for launching the game (default: "./run")
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,

    /// HTTP endpoints and limits
    #[serde(default)]
    pub http: HttpConfig,

    /// External tool commands (decompiler, recompiler, java)
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl PipelineConfig {
    /// Create a config for a target version with defaults everywhere else
    pub fn for_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            lwjgl_version: default_lwjgl_version(),
            build_dir: default_build_dir(),
            cache_root: default_cache_root(),
            run_dir: default_run_dir(),
            http: HttpConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// HTTP client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Launcher catalog URL (default: the upstream launchermeta endpoint)
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,

    /// Asset object storage base URL
    #[serde(default = "default_resources_url")]
    pub resources_url: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds (default: 120)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent asset object downloads (default: 16)
    ///
    /// Asset objects are thousands of small independent files; the worker
    /// pool is bounded to avoid saturating the remote store.
    #[serde(default = "default_max_concurrent_assets")]
    pub max_concurrent_assets: usize,
}

impl HttpConfig {
    /// Per-request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_catalog_url(),
            resources_url: default_resources_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_assets: default_max_concurrent_assets(),
        }
    }
}

/// External tool configuration
///
/// The decompiler and recompiler are opaque external processes; the pipeline
/// only defines their inputs and outputs. Tasks for a tool are registered
/// only when the tool is configured.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the java executable (auto-detected on PATH if None)
    #[serde(default)]
    pub java_path: Option<PathBuf>,

    /// Decompiler invocation (e.g. a Fernflower wrapper)
    ///
    /// Receives the merged jar and the sources output directory as trailing
    /// arguments.
    #[serde(default)]
    pub decompiler: Option<ToolCommand>,

    /// Patch/recompile invocation
    ///
    /// Receives the decompiled sources directory and the rebuilt jar path as
    /// trailing arguments.
    #[serde(default)]
    pub recompiler: Option<ToolCommand>,
}

/// An external tool invocation: program plus fixed leading arguments
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Program to run (absolute path, or a name resolved on PATH)
    pub program: PathBuf,

    /// Fixed arguments placed before the per-invocation ones
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_lwjgl_version() -> String {
    "2.9.4-nightly-20150209".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("./build")
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_run_dir() -> PathBuf {
    PathBuf::from("./run")
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}

fn default_resources_url() -> String {
    DEFAULT_RESOURCES_URL.to_string()
}

fn default_user_agent() -> String {
    format!("craftprep/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_concurrent_assets() -> usize {
    16
}
