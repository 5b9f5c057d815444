//! Grouping sequencing files by read name

use bwr_common::checksum::compute_file_checksum;
use bwr_common::types::ChecksumAlgorithm;
use bwr_common::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};
use walkdir::WalkDir;

#[allow(clippy::expect_used)]
static READ_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+.R[12]).*fastq\.gz$").expect("valid regex"));

#[allow(clippy::expect_used)]
static CHIP_READ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)\.R([12])\.(clean|lowqual|adapter)\.fastq\.gz$").expect("valid regex")
});

const RECYCLE_BIN: &str = "$RECYCLE.BIN";

/// Read name (`<sample>_R1`, `<sample>.R2`, ...) of a FASTQ file name
pub fn read_name(file_name: &str) -> Option<&str> {
    READ_NAME
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Collect FASTQ files under every directory, grouped by read name.
/// Files inside a `$RECYCLE.BIN` directory are ignored.
pub fn group_by_read(dirs: &[PathBuf]) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for dir in dirs {
        let walker = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.file_name() != RECYCLE_BIN);
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if let Some(name) = read_name(&file_name) {
                debug!(read = name, path = %entry.path().display(), "Found FASTQ file");
                groups
                    .entry(name.to_string())
                    .or_default()
                    .push(entry.path().to_path_buf());
            }
        }
    }
    Ok(groups)
}

/// What to do to produce one merged read file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAction {
    Link { source: PathBuf, target: PathBuf },
    Copy { source: PathBuf, target: PathBuf },
    Concat { sources: Vec<PathBuf>, target: PathBuf },
}

impl MergeAction {
    pub fn target(&self) -> &Path {
        match self {
            MergeAction::Link { target, .. }
            | MergeAction::Copy { target, .. }
            | MergeAction::Concat { target, .. } => target,
        }
    }

    /// Shell-equivalent description written to the plan log
    pub fn describe(&self) -> String {
        match self {
            MergeAction::Link { source, target } => {
                format!("ln -s {} {}", source.display(), target.display())
            },
            MergeAction::Copy { source, target } => {
                format!("cp {} {}", source.display(), target.display())
            },
            MergeAction::Concat { sources, target } => {
                let inputs: Vec<String> = sources.iter().map(|p| p.display().to_string()).collect();
                format!("cat {} > {}", inputs.join(" "), target.display())
            },
        }
    }

    pub fn execute(&self) -> Result<()> {
        match self {
            MergeAction::Link { source, target } => {
                let source = std::fs::canonicalize(source)?;
                std::os::unix::fs::symlink(source, target)?;
            },
            MergeAction::Copy { source, target } => {
                std::fs::copy(source, target)?;
            },
            MergeAction::Concat { sources, target } => {
                let mut out = io::BufWriter::new(File::create(target)?);
                for source in sources {
                    io::copy(&mut File::open(source)?, &mut out)?;
                }
                out.flush()?;
            },
        }
        info!(target = %self.target().display(), "Merged reads");
        Ok(())
    }
}

/// One action per read name: a symlink for a single file, otherwise the
/// concatenation of the sorted inputs into `<out>/<read>.raw.fastq.gz`
pub fn plan_merge(groups: &BTreeMap<String, Vec<PathBuf>>, out_dir: &Path) -> Vec<MergeAction> {
    groups
        .iter()
        .filter(|(_, files)| !files.is_empty())
        .map(|(read, files)| {
            let target = out_dir.join(format!("{read}.raw.fastq.gz"));
            if let [single] = files.as_slice() {
                MergeAction::Link {
                    source: single.clone(),
                    target,
                }
            } else {
                let mut sources = files.clone();
                sources.sort();
                MergeAction::Concat { sources, target }
            }
        })
        .collect()
}

/// How a file found in only one directory reaches the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SingleFile {
    #[default]
    Link,
    Copy,
}

/// Files ending in `suffix` directly inside each directory, grouped by file
/// name. Sources keep the order of `dirs`, which is the concatenation order.
pub fn group_by_file_name(dirs: &[PathBuf], suffix: &str) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for dir in dirs {
        let mut entries = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry.map_err(io::Error::from)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_file() && name.ends_with(suffix) {
                entries.push((name, entry.into_path()));
            }
        }
        entries.sort();
        for (name, path) in entries {
            groups.entry(name).or_default().push(path);
        }
    }
    Ok(groups)
}

/// Same-named files from several directories: one file is linked or copied
/// to `<out>/<name>`, several are concatenated there in directory order
pub fn plan_combine(
    groups: &BTreeMap<String, Vec<PathBuf>>,
    out_dir: &Path,
    single: SingleFile,
) -> Vec<MergeAction> {
    groups
        .iter()
        .filter(|(_, files)| !files.is_empty())
        .map(|(name, files)| {
            let target = out_dir.join(name);
            match (files.as_slice(), single) {
                ([source], SingleFile::Link) => MergeAction::Link {
                    source: source.clone(),
                    target,
                },
                ([source], SingleFile::Copy) => MergeAction::Copy {
                    source: source.clone(),
                    target,
                },
                _ => MergeAction::Concat {
                    sources: files.clone(),
                    target,
                },
            }
        })
        .collect()
}

/// Sample read files of a ChIP-seq delivery: `<sample>.R<n>.clean.fastq.gz`
/// in `dir` followed by the `lowqual` and `adapter` parts kept in `dir/002`
pub fn chip_read_groups(dir: &Path) -> Result<BTreeMap<(String, String), Vec<PathBuf>>> {
    let locations = [
        (dir.to_path_buf(), &["clean"][..], 0),
        (dir.join("002"), &["lowqual", "adapter"][..], 1),
    ];
    let mut found: Vec<(String, String, usize, PathBuf)> = Vec::new();
    for (search, kinds, first_rank) in locations {
        if !search.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&search).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            let name = entry.file_name().to_string_lossy();
            let Some(caps) = CHIP_READ.captures(&name) else {
                continue;
            };
            let Some(rank) = kinds.iter().position(|k| *k == &caps[3]) else {
                continue;
            };
            found.push((
                caps[1].to_string(),
                caps[2].to_string(),
                first_rank + rank,
                entry.path().to_path_buf(),
            ));
        }
    }
    found.sort();
    let mut groups: BTreeMap<(String, String), Vec<PathBuf>> = BTreeMap::new();
    for (sample, read, _, path) in found {
        groups.entry((sample, read)).or_default().push(path);
    }
    Ok(groups)
}

/// Concatenations into `<dir>/rawdata/<sample>.R<n>.fq.gz`, leaving out
/// outputs that already exist
pub fn plan_chip_merge(
    dir: &Path,
    groups: &BTreeMap<(String, String), Vec<PathBuf>>,
) -> Vec<MergeAction> {
    let raw_dir = dir.join("rawdata");
    groups
        .iter()
        .filter_map(|((sample, read), sources)| {
            let target = raw_dir.join(format!("{sample}.R{read}.fq.gz"));
            if target.exists() {
                debug!(target = %target.display(), "Merged reads already present");
                return None;
            }
            Some(MergeAction::Concat {
                sources: sources.clone(),
                target,
            })
        })
        .collect()
}

/// Write `<file>.md5` in `md5sum` format unless it exists; returns whether
/// a new sidecar was written
pub fn write_md5_sidecar(file: &Path) -> Result<bool> {
    let mut sidecar = file.as_os_str().to_owned();
    sidecar.push(".md5");
    let sidecar = PathBuf::from(sidecar);
    if sidecar.exists() {
        return Ok(false);
    }
    let digest = compute_file_checksum(file, ChecksumAlgorithm::Md5)?;
    std::fs::write(&sidecar, format!("{digest}  {}\n", file.display()))?;
    Ok(true)
}

/// Append the plan to `<out>/log.txt`
pub fn log_plan(actions: &[MergeAction], out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join("log.txt");
    let mut log = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    for action in actions {
        writeln!(log, "{}", action.describe())?;
    }
    Ok(path)
}
