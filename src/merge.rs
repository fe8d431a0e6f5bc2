//! Side merging
//!
//! Combines the client and server jars into a single archive containing the
//! union of their entries. Precedence on a name collision:
//!
//! - duplicate `.class` entries: the client copy wins;
//! - server-only entries are added;
//! - duplicate resources with differing bytes: the server copy overrides;
//! - a file in one side colliding with a directory in the other is
//!   structurally incompatible and fails with a merge conflict.
//!
//! The merged jar is written to a temporary and renamed into place, so a
//! cancelled merge never leaves a partial archive at the final path.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Summary of one side merge
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Entries taken from the client jar
    pub client_entries: usize,
    /// Entries present only in the server jar
    pub server_only: usize,
    /// Duplicate resources where the server copy replaced the client's
    pub overridden: usize,
}

/// Merge the client and server jars into `merged_out`
pub async fn merge_sides(
    client_jar: &Path,
    server_jar: &Path,
    merged_out: &Path,
) -> Result<MergeStats> {
    let client_jar = client_jar.to_path_buf();
    let server_jar = server_jar.to_path_buf();
    let merged_out = merged_out.to_path_buf();
    tokio::task::spawn_blocking(move || merge_sides_blocking(&client_jar, &server_jar, &merged_out))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

struct SideContents {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

fn read_side(jar: &Path) -> Result<SideContents> {
    let file = std::fs::File::open(jar)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut files = BTreeMap::new();
    let mut dirs = BTreeSet::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        if entry.is_dir() {
            dirs.insert(name.trim_end_matches('/').to_string());
        } else {
            let mut contents = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut contents)?;
            files.insert(name, contents);
        }
    }
    Ok(SideContents { files, dirs })
}

fn merge_sides_blocking(client_jar: &Path, server_jar: &Path, merged_out: &Path) -> Result<MergeStats> {
    let client = read_side(client_jar)?;
    let server = read_side(server_jar)?;

    check_structural_conflicts(&client, &server)?;

    let mut merged: BTreeMap<String, Vec<u8>> = client.files.clone();
    let mut stats = MergeStats {
        client_entries: client.files.len(),
        ..Default::default()
    };

    for (name, contents) in &server.files {
        match client.files.get(name) {
            None => {
                merged.insert(name.clone(), contents.clone());
                stats.server_only += 1;
            }
            Some(client_contents) => {
                if name.ends_with(".class") {
                    // Client copy takes priority for classes present on both sides
                    debug!(entry = %name, "duplicate class, keeping client copy");
                } else if client_contents != contents {
                    debug!(entry = %name, "duplicate resource, server copy overrides");
                    merged.insert(name.clone(), contents.clone());
                    stats.overridden += 1;
                }
            }
        }
    }

    write_merged(merged_out, &merged)?;
    info!(
        entries = merged.len(),
        out = %merged_out.display(),
        "merged client and server sides"
    );
    Ok(stats)
}

/// A file name on one side colliding with a directory on the other cannot be
/// represented in the union archive
fn check_structural_conflicts(client: &SideContents, server: &SideContents) -> Result<()> {
    for name in server.files.keys() {
        if client.dirs.contains(name.as_str()) {
            return Err(Error::MergeConflict {
                entry: name.clone(),
                reason: "server file collides with client directory".into(),
            });
        }
    }
    for name in client.files.keys() {
        if server.dirs.contains(name.as_str()) {
            return Err(Error::MergeConflict {
                entry: name.clone(),
                reason: "client file collides with server directory".into(),
            });
        }
    }
    Ok(())
}

fn write_merged(merged_out: &Path, entries: &BTreeMap<String, Vec<u8>>) -> Result<()> {
    if let Some(parent) = merged_out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let part = part_path(merged_out);
    {
        let file = std::fs::File::create(&part)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, contents) in entries {
            writer.start_file(name, options)?;
            writer.write_all(contents)?;
        }
        writer.finish()?;
    }
    std::fs::rename(&part, merged_out)?;
    Ok(())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn make_jar(path: &Path, files: &[(&str, &[u8])], dirs: &[&str]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for dir in dirs {
            writer.add_directory(*dir, options).unwrap();
        }
        for (name, data) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_entry(jar: &Path, name: &str) -> Vec<u8> {
        let file = std::fs::File::open(jar).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        contents
    }

    #[tokio::test]
    async fn union_with_client_class_priority() {
        let dir = tempfile::tempdir().unwrap();
        let client = dir.path().join("client.jar");
        let server = dir.path().join("server.jar");
        make_jar(
            &client,
            &[
                ("net/minecraft/Shared.class", b"client bytes"),
                ("net/minecraft/ClientOnly.class", b"client only"),
            ],
            &[],
        );
        make_jar(
            &server,
            &[
                ("net/minecraft/Shared.class", b"server bytes"),
                ("net/minecraft/ServerOnly.class", b"server only"),
            ],
            &[],
        );

        let merged = dir.path().join("merged.jar");
        let stats = merge_sides(&client, &server, &merged).await.unwrap();

        assert_eq!(stats.client_entries, 2);
        assert_eq!(stats.server_only, 1);
        assert_eq!(stats.overridden, 0);
        assert_eq!(read_entry(&merged, "net/minecraft/Shared.class"), b"client bytes");
        assert_eq!(read_entry(&merged, "net/minecraft/ClientOnly.class"), b"client only");
        assert_eq!(read_entry(&merged, "net/minecraft/ServerOnly.class"), b"server only");
    }

    #[tokio::test]
    async fn differing_resource_takes_server_copy() {
        let dir = tempfile::tempdir().unwrap();
        let client = dir.path().join("client.jar");
        let server = dir.path().join("server.jar");
        make_jar(&client, &[("banned-ips.txt", b"client stub")], &[]);
        make_jar(&server, &[("banned-ips.txt", b"server resource")], &[]);

        let merged = dir.path().join("merged.jar");
        let stats = merge_sides(&client, &server, &merged).await.unwrap();

        assert_eq!(stats.overridden, 1);
        assert_eq!(read_entry(&merged, "banned-ips.txt"), b"server resource");
    }

    #[tokio::test]
    async fn identical_resource_is_not_counted_as_override() {
        let dir = tempfile::tempdir().unwrap();
        let client = dir.path().join("client.jar");
        let server = dir.path().join("server.jar");
        make_jar(&client, &[("pack.mcmeta", b"same")], &[]);
        make_jar(&server, &[("pack.mcmeta", b"same")], &[]);

        let merged = dir.path().join("merged.jar");
        let stats = merge_sides(&client, &server, &merged).await.unwrap();
        assert_eq!(stats.overridden, 0);
        assert_eq!(read_entry(&merged, "pack.mcmeta"), b"same");
    }

    #[tokio::test]
    async fn file_directory_collision_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let client = dir.path().join("client.jar");
        let server = dir.path().join("server.jar");
        make_jar(&client, &[], &["assets"]);
        make_jar(&server, &[("assets", b"a file named like a dir")], &[]);

        let merged = dir.path().join("merged.jar");
        let err = merge_sides(&client, &server, &merged).await.unwrap_err();
        match err {
            Error::MergeConflict { entry, .. } => assert_eq!(entry, "assets"),
            other => panic!("expected MergeConflict, got {other:?}"),
        }
        // No partial archive at the final path
        assert!(!merged.exists());
    }
}
