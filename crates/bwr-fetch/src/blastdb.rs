//! NCBI BLAST database volumes from `ftp.ncbi.nlm.nih.gov/blast/db/`

use crate::bounded::{run_bounded, FetchSummary};
use crate::error::{FetchError, Result};
use crate::ftp::{FtpClient, FtpEntry, Mirror};
use bwr_common::checksum::{parse_md5_sidecar, verify_file_checksum};
use bwr_common::types::ChecksumAlgorithm;
use bwr_common::BwrError;
use flate2::read::GzDecoder;
use indicatif::ProgressBar;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const NCBI_HOST: &str = "ftp.ncbi.nlm.nih.gov";
pub const BLASTDB_DIR: &str = "/blast/db/";

/// One `<name>[.<vol>].tar.gz` archive with its optional `.md5` sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbVolume {
    pub database: String,
    pub archive: String,
    pub md5: Option<String>,
}

/// Pattern for archives of the databases whose name matches `name`
/// (a regular expression, any database when `None`)
pub fn volume_pattern(name: Option<&str>) -> Result<Regex> {
    let name = name.unwrap_or(r"[\w-]+");
    Regex::new(&format!(r"^({name})(\.\d+)?\.tar\.gz(\.md5)?$"))
        .map_err(|e| FetchError::invalid_input(format!("database pattern '{name}': {e}")))
}

/// Group a `/blast/db/` listing into archive volumes
pub fn select_volumes(entries: &[FtpEntry], pattern: &Regex) -> Vec<DbVolume> {
    let names: BTreeSet<&str> = entries
        .iter()
        .filter(|e| !e.is_directory)
        .map(|e| e.name.as_str())
        .collect();
    names
        .iter()
        .filter(|name| !name.ends_with(".md5"))
        .filter_map(|name| {
            let caps = pattern.captures(name)?;
            let md5 = format!("{name}.md5");
            Some(DbVolume {
                database: caps.get(1)?.as_str().to_string(),
                archive: name.to_string(),
                md5: names.contains(md5.as_str()).then_some(md5),
            })
        })
        .collect()
}

/// Unique database names, sorted
pub fn database_names(volumes: &[DbVolume]) -> Vec<String> {
    volumes
        .iter()
        .map(|v| v.database.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Boxed, centred 30-column listing
pub fn format_database_table(names: &[String]) -> String {
    let rule = "=".repeat(30);
    let mut out = vec![rule.clone(), format!("|{:^28}|", "NCBI Blast database"), rule.clone()];
    out.extend(names.iter().map(|name| format!("|{name:^28}|")));
    out.push(rule);
    out.join("\n")
}

pub async fn list_volumes(client: &FtpClient, name: Option<&str>) -> Result<Vec<DbVolume>> {
    let pattern = volume_pattern(name)?;
    let entries = client.list_files(BLASTDB_DIR).await?;
    Ok(select_volumes(&entries, &pattern))
}

#[derive(Debug, Clone)]
pub struct BlastDbDownload {
    pub out_dir: PathBuf,
    pub width: usize,
    pub verify_md5: bool,
    pub extract: bool,
}

/// Download every volume (and sidecar) with the bounded runner
pub async fn download(
    client: &FtpClient,
    volumes: Vec<DbVolume>,
    options: &BlastDbDownload,
    progress: Option<&ProgressBar>,
) -> Result<FetchSummary> {
    std::fs::create_dir_all(&options.out_dir)?;
    info!(volumes = volumes.len(), out_dir = %options.out_dir.display(), "Downloading BLAST database");
    let results = run_bounded(volumes, options.width, progress, |volume| async move {
        fetch_volume(client, &volume, options).await
    })
    .await;
    Ok(FetchSummary::from_results(&results))
}

/// Fetch one volume; with `verify_md5` a corrupt archive is downloaded once
/// more from scratch and deleted if it still does not match
async fn fetch_volume<M: Mirror>(mirror: &M, volume: &DbVolume, options: &BlastDbDownload) -> Result<PathBuf> {
    let archive = options.out_dir.join(&volume.archive);
    let remote = format!("{BLASTDB_DIR}{}", volume.archive);
    mirror.fetch(&remote, &archive, false).await?;

    if options.verify_md5 {
        if let Some(md5) = &volume.md5 {
            let sidecar = options.out_dir.join(md5);
            // a few bytes, and a stale digest would fail every later check
            mirror.fetch(&format!("{BLASTDB_DIR}{md5}"), &sidecar, true).await?;
            match check_or_discard(&archive, &sidecar) {
                Err(FetchError::Checksum { .. }) => {
                    warn!(archive = %archive.display(), "MD5 mismatch, downloading the volume again");
                    mirror.fetch(&remote, &archive, true).await?;
                    check_or_discard(&archive, &sidecar)?;
                },
                other => other?,
            }
        }
    }

    if options.extract {
        let dir = options.out_dir.clone();
        let path = archive.clone();
        tokio::task::spawn_blocking(move || extract_archive(&path, &dir)).await??;
    }
    Ok(archive)
}

/// [`verify_archive`], deleting an archive that fails the check so a later
/// run cannot mistake it for a finished download
pub fn check_or_discard(archive: &Path, sidecar: &Path) -> Result<()> {
    let result = verify_archive(archive, sidecar);
    if matches!(result, Err(FetchError::Checksum { .. })) {
        if let Err(e) = std::fs::remove_file(archive) {
            warn!(archive = %archive.display(), error = %e, "Could not remove corrupt archive");
        }
    }
    result
}

/// Compare an archive against the digest in its `.md5` sidecar
pub fn verify_archive(archive: &Path, sidecar: &Path) -> Result<()> {
    let text = std::fs::read_to_string(sidecar)?;
    let expected = parse_md5_sidecar(&text)
        .ok_or_else(|| FetchError::invalid_input(format!("no digest in {}", sidecar.display())))?;
    verify_file_checksum(archive, &expected, ChecksumAlgorithm::Md5).map_err(|e| match e {
        BwrError::ChecksumMismatch { expected, actual } => FetchError::Checksum {
            file: archive.display().to_string(),
            expected,
            actual,
        },
        other => other.into(),
    })?;
    info!(archive = %archive.display(), "MD5 verified");
    Ok(())
}

pub fn extract_archive(archive: &Path, dir: &Path) -> Result<()> {
    let mut tarball = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    tarball.unpack(dir)?;
    info!(archive = %archive.display(), "Extracted");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ftp::{transfer, DownloadOutcome, RetrSource};
    use std::collections::HashMap;
    use std::future::Future;
    use std::io::Write;
    use std::sync::Mutex;

    const GOOD: &[u8] = b"hello world";
    const GOOD_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3  nt.00.tar.gz\n";

    struct Blob(Vec<u8>);

    impl RetrSource for Blob {
        fn remote_size(&mut self, _remote: &str) -> Result<u64> {
            Ok(self.0.len() as u64)
        }

        fn retrieve(&mut self, _remote: &str, offset: u64, sink: &mut dyn Write) -> Result<u64> {
            let rest = &self.0[offset as usize..];
            sink.write_all(rest)?;
            Ok(rest.len() as u64)
        }
    }

    /// Serves fixed bytes per remote path and records `(remote, restart)` calls
    #[derive(Default)]
    struct StaticMirror {
        files: HashMap<String, Vec<u8>>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl StaticMirror {
        fn with(files: &[(&str, &[u8])]) -> Self {
            Self {
                files: files.iter().map(|(k, v)| (format!("{BLASTDB_DIR}{k}"), v.to_vec())).collect(),
                ..Self::default()
            }
        }

        fn restarts(&self, remote: &str) -> usize {
            let remote = format!("{BLASTDB_DIR}{remote}");
            self.calls.lock().unwrap().iter().filter(|(r, fresh)| *r == remote && *fresh).count()
        }
    }

    impl Mirror for StaticMirror {
        fn fetch(&self, remote: &str, local: &Path, restart: bool) -> impl Future<Output = Result<DownloadOutcome>> {
            self.calls.lock().unwrap().push((remote.to_string(), restart));
            let result = match self.files.get(remote) {
                Some(bytes) => transfer(&mut Blob(bytes.clone()), remote, local, restart),
                None => Err(FetchError::not_found(remote.to_string())),
            };
            async move { result }
        }
    }

    fn volume() -> DbVolume {
        DbVolume {
            database: "nt".to_string(),
            archive: "nt.00.tar.gz".to_string(),
            md5: Some("nt.00.tar.gz.md5".to_string()),
        }
    }

    fn options(dir: &Path) -> BlastDbDownload {
        BlastDbDownload {
            out_dir: dir.to_path_buf(),
            width: 1,
            verify_md5: true,
            extract: false,
        }
    }

    #[tokio::test]
    async fn test_corrupt_archive_of_full_size_is_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        // same size as the remote, so a plain resume would skip it
        std::fs::write(dir.path().join("nt.00.tar.gz"), b"hello wOrld").unwrap();
        std::fs::write(dir.path().join("nt.00.tar.gz.md5"), "00000000000000000000000000000000  nt.00.tar.gz\n").unwrap();
        let mirror = StaticMirror::with(&[("nt.00.tar.gz", GOOD), ("nt.00.tar.gz.md5", GOOD_MD5.as_bytes())]);

        let archive = fetch_volume(&mirror, &volume(), &options(dir.path())).await.unwrap();

        assert_eq!(std::fs::read(&archive).unwrap(), GOOD);
        assert_eq!(mirror.restarts("nt.00.tar.gz.md5"), 1);
        assert_eq!(mirror.restarts("nt.00.tar.gz"), 1);
    }

    #[tokio::test]
    async fn test_archive_still_corrupt_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = StaticMirror::with(&[("nt.00.tar.gz", &b"hello wOrld"[..]), ("nt.00.tar.gz.md5", GOOD_MD5.as_bytes())]);

        let err = fetch_volume(&mirror, &volume(), &options(dir.path())).await.unwrap_err();

        assert!(matches!(err, FetchError::Checksum { .. }));
        assert!(!dir.path().join("nt.00.tar.gz").exists());
    }

    #[test]
    fn test_check_or_discard_keeps_good_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("nt.00.tar.gz");
        let sidecar = dir.path().join("nt.00.tar.gz.md5");
        std::fs::write(&archive, GOOD).unwrap();
        std::fs::write(&sidecar, GOOD_MD5).unwrap();
        check_or_discard(&archive, &sidecar).unwrap();
        assert!(archive.is_file());
    }

    fn file(name: &str) -> FtpEntry {
        FtpEntry {
            name: name.to_string(),
            is_directory: false,
            size: Some(1),
        }
    }

    fn listing() -> Vec<FtpEntry> {
        [
            "nt.00.tar.gz",
            "nt.00.tar.gz.md5",
            "nt.01.tar.gz",
            "nt.01.tar.gz.md5",
            "swissprot.tar.gz",
            "swissprot.tar.gz.md5",
            "README",
            "nt-nucl-metadata.json",
        ]
        .iter()
        .map(|n| file(n))
        .collect()
    }

    #[test]
    fn test_select_all_volumes() {
        let volumes = select_volumes(&listing(), &volume_pattern(None).unwrap());
        assert_eq!(volumes.len(), 3);
        assert_eq!(database_names(&volumes), vec!["nt", "swissprot"]);
        assert_eq!(volumes[0].md5.as_deref(), Some("nt.00.tar.gz.md5"));
    }

    #[test]
    fn test_select_named_database() {
        let volumes = select_volumes(&listing(), &volume_pattern(Some("swissprot")).unwrap());
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].archive, "swissprot.tar.gz");
    }

    #[test]
    fn test_format_database_table() {
        let table = format_database_table(&["nt".to_string()]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].len(), 30);
        assert_eq!(lines[3], format!("|{:^28}|", "nt"));
    }

    #[test]
    fn test_verify_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("nt.00.tar.gz");
        std::fs::File::create(&archive).unwrap().write_all(b"hello world").unwrap();
        let sidecar = dir.path().join("nt.00.tar.gz.md5");
        std::fs::write(&sidecar, "5eb63bbbe01eeed093cb22bb8f5acdc3  nt.00.tar.gz\n").unwrap();
        verify_archive(&archive, &sidecar).unwrap();

        std::fs::write(&sidecar, "00000000000000000000000000000000  nt.00.tar.gz\n").unwrap();
        assert!(matches!(verify_archive(&archive, &sidecar), Err(FetchError::Checksum { .. })));
    }
}
