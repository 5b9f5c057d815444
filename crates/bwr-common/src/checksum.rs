//! Digests for downloaded archives
//!
//! NCBI publishes an `.md5` next to every BLAST database volume; SHA-256 is
//! kept for mirrors that only ship that.

use crate::error::{BwrError, Result};
use crate::types::ChecksumAlgorithm;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const CHUNK: usize = 64 * 1024;

/// Feed `reader` to `sink` chunk by chunk until EOF
fn stream<R: Read>(reader: &mut R, mut sink: impl FnMut(&[u8])) -> Result<()> {
    let mut chunk = vec![0u8; CHUNK];
    loop {
        match reader.read(&mut chunk)? {
            0 => return Ok(()),
            n => sink(&chunk[..n]),
        }
    }
}

/// Lowercase hex digest of a file on disk
pub fn compute_file_checksum(path: impl AsRef<Path>, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    compute_checksum(&mut reader, algorithm)
}

pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<String> {
    Ok(match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut ctx = md5::Context::new();
            stream(reader, |bytes| ctx.consume(bytes))?;
            format!("{:x}", ctx.compute())
        },
        ChecksumAlgorithm::Sha256 => {
            let mut sha = Sha256::new();
            stream(reader, |bytes| sha.update(bytes))?;
            hex::encode(sha.finalize())
        },
    })
}

/// Hex case is ignored, so `.md5` files written in uppercase still match
pub fn verify_file_checksum(path: impl AsRef<Path>, expected: &str, algorithm: ChecksumAlgorithm) -> Result<()> {
    let expected = expected.trim();
    let actual = compute_file_checksum(path, algorithm)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(BwrError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Read the digest out of an NCBI-style `.md5` sidecar.
///
/// The sidecar holds `<hex digest>  <file name>`; only the digest is returned.
pub fn parse_md5_sidecar(text: &str) -> Option<String> {
    let digest = text.split_whitespace().next()?;
    if digest.len() == 32 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha256_of_empty_input() {
        let digest = compute_checksum(&mut Cursor::new(Vec::<u8>::new()), ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(digest, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn test_md5_spans_chunks() {
        let data = vec![b'A'; CHUNK * 2 + 7];
        let whole = format!("{:x}", md5::compute(&data));
        let digest = compute_checksum(&mut Cursor::new(data), ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(digest, whole);
    }

    #[test]
    fn test_verify_file_checksum_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        assert!(verify_file_checksum(
            file.path(),
            "5EB63BBBE01EEED093CB22BB8F5ACDC3",
            ChecksumAlgorithm::Md5
        )
        .is_ok());

        let err = verify_file_checksum(file.path(), "00", ChecksumAlgorithm::Md5).unwrap_err();
        assert!(matches!(err, BwrError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_parse_md5_sidecar() {
        let text = "5eb63bbbe01eeed093cb22bb8f5acdc3  nt.00.tar.gz\n";
        assert_eq!(parse_md5_sidecar(text).as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));
        assert_eq!(parse_md5_sidecar("not-a-digest nt.00.tar.gz"), None);
        assert_eq!(parse_md5_sidecar(""), None);
    }
}
