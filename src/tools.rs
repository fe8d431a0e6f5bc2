//! External transformation tool drivers
//!
//! The decompiler and patch/recompile toolchains are opaque external
//! processes. This module only defines how they are located and invoked and
//! how their failures surface; their internals are out of scope. Each driver
//! consumes the previous pipeline stage's declared output.

use crate::config::ToolCommand;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How many trailing stderr bytes to include in a failure report
const STDERR_TAIL: usize = 2048;

/// Resolve a tool program to an executable path
///
/// Absolute and relative paths are used as-is; bare names are looked up on
/// `PATH`.
pub fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return Ok(program.to_path_buf());
    }
    which::which(program).map_err(|e| Error::ExternalTool {
        tool: program.display().to_string(),
        reason: format!("not found on PATH: {e}"),
    })
}

/// Run an external tool to completion
///
/// `extra_args` are appended after the command's fixed arguments. Fails with
/// [`Error::ExternalTool`] carrying the exit status and a stderr tail on a
/// non-zero exit.
pub async fn run_tool(cmd: &ToolCommand, extra_args: &[String]) -> Result<()> {
    let program = resolve_program(&cmd.program)?;
    debug!(program = %program.display(), ?extra_args, "invoking external tool");

    let output = tokio::process::Command::new(&program)
        .args(&cmd.args)
        .args(extra_args)
        .output()
        .await
        .map_err(|e| Error::ExternalTool {
            tool: program.display().to_string(),
            reason: format!("failed to start: {e}"),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::ExternalTool {
            tool: program.display().to_string(),
            reason: format!("{}; stderr: {}", output.status, stderr_tail(&stderr)),
        })
    }
}

/// The last [`STDERR_TAIL`] bytes of captured stderr, trimmed back to a
/// character boundary
fn stderr_tail(stderr: &str) -> &str {
    let mut start = stderr.len().saturating_sub(STDERR_TAIL);
    while !stderr.is_char_boundary(start) {
        start -= 1;
    }
    &stderr[start..]
}

/// Decompile the merged jar into a sources directory
pub async fn decompile(cmd: &ToolCommand, merged_jar: &Path, sources_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(sources_dir).await?;
    info!(input = %merged_jar.display(), output = %sources_dir.display(), "decompiling merged jar");
    run_tool(
        cmd,
        &[
            merged_jar.display().to_string(),
            sources_dir.display().to_string(),
        ],
    )
    .await
}

/// Recompile patched sources into a rebuilt jar
pub async fn recompile(cmd: &ToolCommand, sources_dir: &Path, output_jar: &Path) -> Result<()> {
    if let Some(parent) = output_jar.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    info!(input = %sources_dir.display(), output = %output_jar.display(), "recompiling patched sources");
    run_tool(
        cmd,
        &[
            sources_dir.display().to_string(),
            output_jar.display().to_string(),
        ],
    )
    .await
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_programs_resolve_to_themselves() {
        let program = PathBuf::from("/opt/fernflower/bin/fernflower");
        assert_eq!(resolve_program(&program).unwrap(), program);
    }

    #[test]
    fn missing_bare_name_is_an_external_tool_error() {
        let err = resolve_program(Path::new("definitely-not-a-real-tool-xyz")).unwrap_err();
        assert!(matches!(err, Error::ExternalTool { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_tool_run() {
        let cmd = ToolCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), "exit 0".into()],
        };
        run_tool(&cmd, &[]).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_reports_status_and_stderr() {
        let cmd = ToolCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), "echo boom >&2; exit 3".into()],
        };
        let err = run_tool(&cmd, &[]).await.unwrap_err();
        match err {
            Error::ExternalTool { tool, reason } => {
                assert_eq!(tool, "/bin/sh");
                assert!(reason.contains("boom"));
            }
            other => panic!("expected ExternalTool, got {other:?}"),
        }
    }

    #[test]
    fn stderr_tail_respects_char_boundaries() {
        let long: String = "€".repeat(1000);
        let tail = stderr_tail(&long);
        assert!(tail.len() <= STDERR_TAIL);
        assert!(tail.chars().all(|c| c == '€'));

        assert_eq!(stderr_tail("short"), "short");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn multibyte_stderr_overflow_still_reports_cleanly() {
        let cmd = ToolCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec![
                "-c".into(),
                "i=0; while [ $i -lt 1000 ]; do printf '€'; i=$((i+1)); done >&2; exit 1".into(),
            ],
        };
        let err = run_tool(&cmd, &[]).await.unwrap_err();
        match err {
            Error::ExternalTool { reason, .. } => assert!(reason.contains('€')),
            other => panic!("expected ExternalTool, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn extra_args_are_appended_after_fixed_args() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let cmd = ToolCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), r#"printf '%s' "$1" > "$2""#.into(), "sh".into()],
        };
        run_tool(
            &cmd,
            &["payload".into(), marker.display().to_string()],
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&marker).unwrap(), b"payload");
    }
}
