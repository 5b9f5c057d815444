//! Shared FTP client with retry logic and resumable downloads
//!
//! suppaftp is blocking, so every session runs on `spawn_blocking` and the
//! async side only drives retries. All sessions use Extended Passive Mode
//! (EPSV) and binary transfers.
//!
//! # Examples
//!
//! ```rust,ignore
//! use bwr_fetch::ftp::{FtpClient, FtpConfig};
//!
//! let client = FtpClient::new(FtpConfig::anonymous("ftp.ncbi.nlm.nih.gov"));
//! let entries = client.list_directory("/blast/db/").await?;
//! ```

use crate::error::{FetchError, Result};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, BufWriter, Write};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tracing::{debug, info, warn};

/// Default number of retries after the first failed attempt
pub const DEFAULT_RETRIES: u32 = 2;

/// Base delay between attempts; multiplied by the attempt number
pub const RETRY_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Connect and read timeout of a session
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl FtpConfig {
    pub fn anonymous(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: "anonymous@".to_string(),
            timeout: Duration::from_secs(30),
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECS),
        }
    }
}

/// What [`FtpClient::download_resumable`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    Resumed { offset: u64, bytes: u64 },
    Skipped,
}

/// How to bring a local copy up to date with the remote file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPlan {
    Skip,
    Resume { offset: u64 },
    Fresh,
}

impl TransferPlan {
    /// Same size skips, a shorter local file resumes, anything else restarts
    pub fn decide(local_size: Option<u64>, remote_size: u64) -> Self {
        match local_size {
            Some(local) if local == remote_size => TransferPlan::Skip,
            Some(local) if local > 0 && local < remote_size => TransferPlan::Resume { offset: local },
            _ => TransferPlan::Fresh,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FtpClient {
    config: FtpConfig,
}

impl FtpClient {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FtpConfig {
        &self.config
    }

    /// Run one blocking session operation, retrying with linear backoff
    async fn with_retries<T, F>(&self, what: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&FtpConfig) -> Result<T> + Clone + Send + 'static,
    {
        let attempts = self.config.retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            debug!(attempt, attempts, what, "FTP attempt");
            let config = self.config.clone();
            let op = op.clone();
            match tokio::task::spawn_blocking(move || op(&config)).await? {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        let delay = self.config.retry_delay * attempt;
                        warn!(
                            attempt,
                            attempts,
                            error = %e,
                            delay_secs = delay.as_secs(),
                            "FTP {} failed, retrying",
                            what
                        );
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }
        Err(FetchError::RetriesExhausted {
            what: what.to_string(),
            attempts,
            message: last_error,
        })
    }

    pub async fn list_directory(&self, path: &str) -> Result<Vec<FtpEntry>> {
        let path = path.to_string();
        let entries = self
            .with_retries(&format!("LIST {path}"), move |config| list_directory_sync(config, &path))
            .await?;
        info!(entries = entries.len(), "Listed FTP directory");
        Ok(entries)
    }

    pub async fn list_files(&self, path: &str) -> Result<Vec<FtpEntry>> {
        Ok(self
            .list_directory(path)
            .await?
            .into_iter()
            .filter(|e| !e.is_directory)
            .collect())
    }

    /// Download `remote` to `local`, skipping complete files and resuming
    /// partial ones with `REST <offset>`
    pub async fn download_resumable(&self, remote: &str, local: &Path) -> Result<DownloadOutcome> {
        self.download(remote, local, false).await
    }

    /// Download `remote` from byte zero whatever `local` holds
    pub async fn download_fresh(&self, remote: &str, local: &Path) -> Result<DownloadOutcome> {
        self.download(remote, local, true).await
    }

    async fn download(&self, remote: &str, local: &Path, restart: bool) -> Result<DownloadOutcome> {
        let remote = remote.to_string();
        let local = local.to_path_buf();
        let outcome = self
            .with_retries(&format!("RETR {remote}"), {
                let remote = remote.clone();
                move |config| download_sync(config, &remote, &local, restart)
            })
            .await?;
        info!(remote = %remote, outcome = ?outcome, "FTP download finished");
        Ok(outcome)
    }
}

/// Source of remote files for [`FtpClient`] downloads and their test doubles
pub(crate) trait Mirror {
    fn fetch(&self, remote: &str, local: &Path, restart: bool) -> impl Future<Output = Result<DownloadOutcome>>;
}

impl Mirror for FtpClient {
    fn fetch(&self, remote: &str, local: &Path, restart: bool) -> impl Future<Output = Result<DownloadOutcome>> {
        self.download(remote, local, restart)
    }
}

fn connect(config: &FtpConfig) -> Result<FtpStream> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| FetchError::not_found(format!("address of {}", config.host)))?;
    debug!(host = %config.host, port = config.port, "Connecting to FTP server");
    let mut stream = FtpStream::connect_timeout(addr, config.timeout)?;
    stream.get_ref().set_read_timeout(Some(config.timeout))?;
    stream.set_mode(Mode::ExtendedPassive);
    stream.login(&config.username, &config.password)?;
    stream.transfer_type(FileType::Binary)?;
    Ok(stream)
}

fn close(mut stream: FtpStream) {
    if let Err(e) = stream.quit() {
        warn!(error = %e, "Failed to quit FTP session gracefully");
    }
}

fn list_directory_sync(config: &FtpConfig, path: &str) -> Result<Vec<FtpEntry>> {
    let mut stream = connect(config)?;
    let lines = stream.list(Some(path))?;
    close(stream);
    Ok(lines.iter().filter_map(|line| FtpEntry::parse(line)).collect())
}

fn download_sync(config: &FtpConfig, remote: &str, local: &Path, restart: bool) -> Result<DownloadOutcome> {
    let mut stream = connect(config)?;
    let outcome = transfer(&mut stream, remote, local, restart);
    close(stream);
    outcome
}

/// The two session calls a transfer needs
pub trait RetrSource {
    fn remote_size(&mut self, remote: &str) -> Result<u64>;

    /// Copy `remote` from byte `offset` into `sink`; returns the bytes copied
    fn retrieve(&mut self, remote: &str, offset: u64, sink: &mut dyn Write) -> Result<u64>;
}

impl RetrSource for FtpStream {
    fn remote_size(&mut self, remote: &str) -> Result<u64> {
        Ok(self.size(remote)? as u64)
    }

    fn retrieve(&mut self, remote: &str, offset: u64, sink: &mut dyn Write) -> Result<u64> {
        if offset > 0 {
            self.resume_transfer(offset as usize)?;
        }
        let mut data = self.retr_as_stream(remote)?;
        let bytes = io::copy(&mut data, sink)?;
        self.finalize_retr_stream(data)?;
        Ok(bytes)
    }
}

/// Bring `local` up to date with `remote`.
///
/// A shorter local file is appended to from its current length, and the
/// result must end up exactly as long as the remote file. `restart` ignores
/// whatever `local` holds.
pub fn transfer<S: RetrSource + ?Sized>(
    source: &mut S,
    remote: &str,
    local: &Path,
    restart: bool,
) -> Result<DownloadOutcome> {
    let remote_size = source.remote_size(remote)?;
    let local_size = std::fs::metadata(local).ok().map(|m| m.len());
    let plan = if restart {
        TransferPlan::Fresh
    } else {
        TransferPlan::decide(local_size, remote_size)
    };
    debug!(remote, remote_size, ?local_size, ?plan, "Planned FTP transfer");

    let offset = match plan {
        TransferPlan::Skip => return Ok(DownloadOutcome::Skipped),
        TransferPlan::Resume { offset } => offset,
        TransferPlan::Fresh => 0,
    };
    if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = if offset > 0 {
        OpenOptions::new().append(true).open(local)?
    } else {
        File::create(local)?
    };

    let mut out = BufWriter::new(file);
    let bytes = source.retrieve(remote, offset, &mut out)?;
    out.flush()?;
    drop(out);

    let size = std::fs::metadata(local)?.len();
    if size != remote_size {
        return Err(FetchError::Incomplete {
            file: local.display().to_string(),
            expected: remote_size,
            actual: size,
        });
    }
    Ok(if offset > 0 {
        DownloadOutcome::Resumed { offset, bytes }
    } else {
        DownloadOutcome::Downloaded { bytes }
    })
}

/// Parsed Unix-style `LIST` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: Option<u64>,
}

impl FtpEntry {
    /// `-rw-r--r--   1 ftp ftp  1234 Jan 15 12:00 nt.00.tar.gz`
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return None;
        }
        let name = if parts.len() >= 9 {
            parts[8..].join(" ")
        } else {
            parts.last()?.to_string()
        };
        let name = match name.split_once(" -> ") {
            Some((link, _)) => link.to_string(),
            None => name,
        };
        Some(Self {
            name,
            is_directory: parts[0].starts_with('d'),
            size: parts.get(4).and_then(|s| s.parse().ok()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// In-memory server; `stall_after` cuts the next retrieval short once
    struct MemorySource {
        data: Vec<u8>,
        offsets: Vec<u64>,
        stall_after: Option<usize>,
    }

    impl MemorySource {
        fn new(data: &[u8]) -> Self {
            Self {
                data: data.to_vec(),
                offsets: Vec::new(),
                stall_after: None,
            }
        }
    }

    impl RetrSource for MemorySource {
        fn remote_size(&mut self, _remote: &str) -> Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn retrieve(&mut self, _remote: &str, offset: u64, sink: &mut dyn Write) -> Result<u64> {
            self.offsets.push(offset);
            let mut rest = &self.data[offset as usize..];
            if let Some(n) = self.stall_after.take() {
                rest = &rest[..n.min(rest.len())];
            }
            sink.write_all(rest)?;
            Ok(rest.len() as u64)
        }
    }

    #[test]
    fn test_transfer_appends_to_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("nt.00.tar.gz");
        std::fs::write(&local, b"hello ").unwrap();
        let mut source = MemorySource::new(b"hello world");

        let outcome = transfer(&mut source, "/blast/db/nt.00.tar.gz", &local, false).unwrap();

        assert_eq!(outcome, DownloadOutcome::Resumed { offset: 6, bytes: 5 });
        assert_eq!(source.offsets, vec![6]);
        assert_eq!(std::fs::read(&local).unwrap(), b"hello world");
    }

    #[test]
    fn test_transfer_skips_complete_and_restarts_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("db").join("swissprot.tar.gz");
        let mut source = MemorySource::new(b"abcdef");

        assert_eq!(
            transfer(&mut source, "swissprot.tar.gz", &local, false).unwrap(),
            DownloadOutcome::Downloaded { bytes: 6 }
        );
        assert_eq!(transfer(&mut source, "swissprot.tar.gz", &local, false).unwrap(), DownloadOutcome::Skipped);
        assert_eq!(source.offsets, vec![0]);

        std::fs::write(&local, b"abcdefgh").unwrap();
        transfer(&mut source, "swissprot.tar.gz", &local, false).unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"abcdef");
    }

    #[test]
    fn test_restart_replaces_same_size_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("nt.00.tar.gz.md5");
        std::fs::write(&local, b"stale!").unwrap();
        let mut source = MemorySource::new(b"fresh!");

        let outcome = transfer(&mut source, "nt.00.tar.gz.md5", &local, true).unwrap();

        assert_eq!(outcome, DownloadOutcome::Downloaded { bytes: 6 });
        assert_eq!(std::fs::read(&local).unwrap(), b"fresh!");
    }

    #[test]
    fn test_short_transfer_fails_then_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("nt.01.tar.gz");
        let mut source = MemorySource::new(b"0123456789");
        source.stall_after = Some(4);

        let err = transfer(&mut source, "nt.01.tar.gz", &local, false).unwrap_err();
        assert!(matches!(err, FetchError::Incomplete { expected: 10, actual: 4, .. }));
        assert!(err.is_transient());

        let outcome = transfer(&mut source, "nt.01.tar.gz", &local, false).unwrap();
        assert_eq!(outcome, DownloadOutcome::Resumed { offset: 4, bytes: 6 });
        assert_eq!(source.offsets, vec![0, 4]);
        assert_eq!(std::fs::read(&local).unwrap(), b"0123456789");
    }

    fn quick_client(retries: u32, delay_ms: u64) -> FtpClient {
        FtpClient::new(FtpConfig {
            retries,
            retry_delay: Duration::from_millis(delay_ms),
            ..FtpConfig::default()
        })
    }

    #[tokio::test]
    async fn test_retries_back_off_linearly_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = quick_client(2, 20);
        let started = std::time::Instant::now();

        let value = client
            .with_retries("RETR x", {
                let calls = Arc::clone(&calls);
                move |_config| {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(FetchError::Io(io::Error::other("reset")))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 20ms after the first failure, 40ms after the second
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = quick_client(1, 0);

        let err = client
            .with_retries("LIST /pub/", {
                let calls = Arc::clone(&calls);
                move |_config| -> Result<()> {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::not_found("/pub/"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err {
            FetchError::RetriesExhausted { attempts, message, .. } => {
                assert_eq!(attempts, 2);
                assert!(message.contains("/pub/"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_file_entry() {
        let entry = FtpEntry::parse("-r--r--r--   1 ftp anonymous 4000000000 Mar 10 09:12 nt.00.tar.gz").unwrap();
        assert_eq!(entry.name, "nt.00.tar.gz");
        assert!(!entry.is_directory);
        assert_eq!(entry.size, Some(4_000_000_000));
    }

    #[test]
    fn test_parse_directory_and_link() {
        let dir = FtpEntry::parse("drwxr-xr-x   2 ftp ftp  4096 Jan 15 12:00 release-57").unwrap();
        assert!(dir.is_directory);
        let link = FtpEntry::parse("lrwxrwxrwx   1 ftp ftp  10 Jan 15 12:00 current -> release-57").unwrap();
        assert_eq!(link.name, "current");
        assert!(FtpEntry::parse("   ").is_none());
    }

    #[test]
    fn test_transfer_plan() {
        assert_eq!(TransferPlan::decide(None, 100), TransferPlan::Fresh);
        assert_eq!(TransferPlan::decide(Some(100), 100), TransferPlan::Skip);
        assert_eq!(TransferPlan::decide(Some(40), 100), TransferPlan::Resume { offset: 40 });
        assert_eq!(TransferPlan::decide(Some(0), 100), TransferPlan::Fresh);
        assert_eq!(TransferPlan::decide(Some(140), 100), TransferPlan::Fresh);
    }

    #[test]
    fn test_anonymous_config() {
        let config = FtpConfig::anonymous("ftp.ensemblgenomes.org");
        assert_eq!(config.port, 21);
        assert_eq!(config.username, "anonymous");
        assert_eq!(config.retries, DEFAULT_RETRIES);
    }
}
