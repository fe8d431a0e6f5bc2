//! Native library extraction
//!
//! Unpacks platform shared libraries from the filtered "natives" dependency
//! jars into the run directory. Jars are processed in resolved-dependency
//! order and a later jar overwrites same-named files from an earlier one, so
//! input order is significant for determinism.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extensions treated as platform shared libraries
const NATIVE_EXTENSIONS: &[&str] = &["so", "dll", "dylib", "jnilib"];

/// Extract shared-library entries from `jars` into `output_dir`
///
/// Returns the number of files written. Entries under `META-INF/` and
/// entries that are not shared libraries are skipped; name collisions across
/// jars are resolved last-writer-wins.
pub async fn extract_natives(jars: &[PathBuf], output_dir: &Path) -> Result<usize> {
    let jars = jars.to_vec();
    let output_dir = output_dir.to_path_buf();
    // Archive reading is synchronous; hop off the async executor.
    tokio::task::spawn_blocking(move || extract_natives_blocking(&jars, &output_dir))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

fn extract_natives_blocking(jars: &[PathBuf], output_dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(output_dir)?;
    let mut written = 0usize;

    for jar in jars {
        let file = std::fs::File::open(jar)?;
        let mut archive = zip::ZipArchive::new(file)?;
        debug!(jar = %jar.display(), entries = archive.len(), "scanning natives jar");

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                warn!(entry = entry.name(), "skipping entry with unsafe path");
                continue;
            };
            if !is_native_entry(&relative) {
                continue;
            }

            let dest = output_dir.join(&relative);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut contents = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut contents)?;
            // Overwrites an existing file of the same name from an earlier jar
            std::fs::write(&dest, contents)?;
            written += 1;
        }
    }

    debug!(count = written, dir = %output_dir.display(), "extracted native libraries");
    Ok(written)
}

/// True when the extracted output is at least as new as every input jar
///
/// Used as the up-to-date check for re-runs: a re-resolved (newer) natives
/// jar invalidates the output, while an untouched input set does not.
pub fn up_to_date(jars: &[PathBuf], output_dir: &Path) -> bool {
    let Ok(output_time) = std::fs::metadata(output_dir).and_then(|m| m.modified()) else {
        return false;
    };
    jars.iter().all(|jar| {
        std::fs::metadata(jar)
            .and_then(|m| m.modified())
            .map(|t| t <= output_time)
            .unwrap_or(false)
    })
}

fn is_native_entry(relative: &Path) -> bool {
    if relative
        .components()
        .next()
        .is_some_and(|c| c.as_os_str().eq_ignore_ascii_case("META-INF"))
    {
        return false;
    }
    relative
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            NATIVE_EXTENSIONS
                .iter()
                .any(|native| ext.eq_ignore_ascii_case(native))
        })
}
