//! Error types for craftprep
//!
//! This module provides the error taxonomy for the artifact pipeline:
//! - Network failures (surfaced with the failing URL, never retried internally)
//! - Integrity failures (checksum mismatch, fatal, never auto-repaired)
//! - Manifest resolution and parse errors
//! - Side-merge conflicts
//! - Task graph failures carrying the responsible node name

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for craftprep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for craftprep
///
/// Each variant carries the context an operator needs to diagnose the failure
/// (failing URL, offending file path, expected vs. actual digest, task name).
#[derive(Debug, Error)]
pub enum Error {
    /// Network failure while fetching an artifact
    ///
    /// Not retried internally; retry policy is left to the invoking
    /// operator or CI.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed to fetch
        url: String,
        /// The underlying HTTP client error
        source: reqwest::Error,
    },

    /// Checksum mismatch between a downloaded file and its manifest entry
    ///
    /// Fatal. The offending file is never deleted or repaired automatically,
    /// so the operator can distinguish a corrupted cache from an upstream
    /// change.
    #[error("checksum mismatch for {path}: expected {expected}, actual {actual}")]
    Integrity {
        /// Path of the file that failed verification
        path: PathBuf,
        /// Digest declared by the manifest
        expected: String,
        /// Digest actually computed from the file
        actual: String,
    },

    /// Requested game version is absent from the launcher catalog
    #[error("version {0} not found in launcher catalog")]
    VersionNotFound(String),

    /// A fetched document does not match the expected schema
    #[error("malformed manifest {path}: {reason}")]
    MalformedManifest {
        /// Path of the cached document that failed to parse
        path: PathBuf,
        /// Parse or schema-validation failure detail
        reason: String,
    },

    /// Irreconcilable duplicate entry encountered during side merging
    #[error("merge conflict on entry {entry}: {reason}")]
    MergeConflict {
        /// The archive entry name that conflicted
        entry: String,
        /// Why the merge rules could not resolve the duplicate
        reason: String,
    },

    /// A task graph node failed
    ///
    /// Wraps the underlying error with the name of the responsible node.
    /// All transitive dependents of the failed node are aborted.
    #[error("task {name} failed: {source}")]
    Task {
        /// Name of the failed node
        name: String,
        /// The error that aborted the node
        source: Box<Error>,
    },

    /// External transformation tool (decompiler, recompiler) failed
    #[error("external tool {tool} failed: {reason}")]
    ExternalTool {
        /// The tool binary that failed
        tool: String,
        /// Exit status / stderr detail
        reason: String,
    },

    /// A task name was requested that is not registered in the graph
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the invalid setting
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Archive read/write error
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl Error {
    /// Wrap an error as the failure of a named task graph node
    pub fn for_task(name: impl Into<String>, source: Error) -> Self {
        Error::Task {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// The name of the task graph node responsible, if this is a task failure
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Error::Task { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_error_reports_both_digests() {
        let err = Error::Integrity {
            path: PathBuf::from("/cache/client.jar"),
            expected: "def456".into(),
            actual: "abc123".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("def456"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("client.jar"));
    }

    #[test]
    fn task_error_carries_node_name() {
        let inner = Error::VersionNotFound("1.6.4".into());
        let err = Error::for_task("download-version-manifest", inner);
        assert_eq!(err.task_name(), Some("download-version-manifest"));
        assert!(err.to_string().contains("download-version-manifest"));
        assert!(err.to_string().contains("1.6.4"));
    }

    #[test]
    fn non_task_errors_have_no_task_name() {
        let err = Error::UnknownTask("frobnicate".into());
        assert_eq!(err.task_name(), None);
    }
}
