//! # craftprep
//!
//! Library for preparing vanilla Minecraft build inputs: manifest resolution,
//! cached and verified artifact downloads, asset set expansion, native
//! extraction, client/server jar merging and external decompile/recompile
//! drivers, wired together as an explicit task graph.
//!
//! ## Design Philosophy
//!
//! craftprep is designed to be:
//! - **Cache-honest** - A file's existence at its cache path is the "already
//!   built" signal; warm runs execute nothing and touch the network not at all
//! - **Integrity-first** - Declared SHA-1 digests are verified before any file
//!   reaches its final cache path, and mismatches are fatal, never repaired
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding in a
//!   build tool
//! - **Explicit** - Dependencies between stages are declared edges in a task
//!   graph, not implicit ordering
//!
//! ## Quick Start
//!
//! ```no_run
//! use craftprep::{PipelineConfig, ResolvedLibraries, VanillaTasks};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::for_version("1.7.10");
//!     let libraries = ResolvedLibraries::default();
//!
//!     let tasks = VanillaTasks::build(config, libraries)?;
//!     let targets = tasks.prepare_targets();
//!     let report = tasks.run(&targets).await?;
//!     report.into_result()?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Asset index expansion and the content-addressed object store
pub mod assets;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Conditional HTTP fetching with checksum verification
pub mod fetch;
/// Task graph registration and execution
pub mod graph;
/// Client and server launch invocations
pub mod launch;
/// Launcher catalog, version manifest and asset index documents
pub mod manifest;
/// Client/server jar merging
pub mod merge;
/// Native library extraction
pub mod natives;
/// The standard vanilla task set
pub mod pipeline;
/// External decompiler/recompiler drivers
pub mod tools;
/// SHA-1 file verification
pub mod verify;

// Re-export commonly used types
pub use config::{HttpConfig, PipelineConfig, ToolCommand, ToolsConfig};
pub use error::{Error, Result};
pub use fetch::{FetchOptions, FetchOutcome, FetchSpec, Fetcher};
pub use graph::{GraphReport, TaskGraph, TaskId, TaskState};
pub use manifest::{AssetIndex, VersionCatalog, VersionManifest};
pub use pipeline::{ResolvedLibraries, VanillaPaths, VanillaTasks, task};
