//! Artifact integrity verification
//!
//! Every downloaded artifact with a manifest-declared checksum is verified
//! before it is treated as present. A mismatch is fatal for the pipeline step
//! that triggered it, and the offending file is left in place untouched so
//! the operator can diagnose a corrupted cache versus an upstream change.

use crate::error::{Error, Result};
use sha1::{Digest, Sha1};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Read buffer size for streaming digests
const DIGEST_CHUNK: usize = 64 * 1024;

/// Compute the SHA-1 hex digest of a file, streaming its contents
pub async fn file_sha1(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; DIGEST_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Verify that a file's SHA-1 digest matches the expected hex value
///
/// Comparison is case-insensitive. Fails with [`Error::Integrity`] carrying
/// both digests on mismatch; never deletes or rewrites the file.
pub async fn verify(path: &Path, expected_hex: &str) -> Result<()> {
    let actual = file_sha1(path).await?;
    if actual.eq_ignore_ascii_case(expected_hex) {
        debug!(path = %path.display(), sha1 = %actual, "checksum verified");
        Ok(())
    } else {
        Err(Error::Integrity {
            path: path.to_path_buf(),
            expected: expected_hex.to_ascii_lowercase(),
            actual,
        })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        // writing to a String cannot fail
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn digest_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        // sha1("hello world")
        assert_eq!(
            file_sha1(&path).await.unwrap(),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[tokio::test]
    async fn verify_accepts_uppercase_expected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        verify(&path, "2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn mismatch_reports_actual_and_expected_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.jar");
        tokio::fs::write(&path, b"not the real jar").await.unwrap();

        let err = verify(&path, "def4560000000000000000000000000000000000")
            .await
            .unwrap_err();
        match err {
            Error::Integrity {
                path: p,
                expected,
                actual,
            } => {
                assert_eq!(p, path);
                assert_eq!(expected, "def4560000000000000000000000000000000000");
                assert_eq!(actual.len(), 40);
                assert_ne!(actual, expected);
            }
            other => panic!("expected Integrity, got {other:?}"),
        }
        // The bad file must survive for operator diagnosis
        assert!(path.exists());
    }
}
