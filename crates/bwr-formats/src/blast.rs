//! Tabular BLAST results and the external BLAST+ runner

use crate::fasta::{is_protein, records};
use crate::io::{create_text, open_text};
use crate::tool;
use bwr_common::{BwrError, Result};
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default `-outfmt 6` columns
pub const HIT_FIELDS: [&str; 12] = [
    "qseqid", "sseqid", "pident", "length", "mismatch", "gapopen", "qstart", "qend", "sstart",
    "send", "evalue", "bitscore",
];

#[derive(Debug, Clone, PartialEq)]
pub struct BlastHit {
    pub qseqid: String,
    pub sseqid: String,
    pub pident: f64,
    pub length: u64,
    pub evalue: f64,
    pub bitscore: f64,
    /// The input line, written back unchanged by filters
    pub line: String,
}

impl BlastHit {
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < HIT_FIELDS.len() {
            return Err(BwrError::parse(
                line_no,
                format!("tabular BLAST needs 12 columns, found {}", fields.len()),
            ));
        }
        let float = |idx: usize| -> Result<f64> {
            fields[idx].trim().parse().map_err(|_| {
                BwrError::parse(line_no, format!("invalid {} '{}'", HIT_FIELDS[idx], fields[idx]))
            })
        };
        Ok(Self {
            qseqid: fields[0].to_string(),
            sseqid: fields[1].to_string(),
            pident: float(2)?,
            length: float(3)? as u64,
            evalue: float(10)?,
            bitscore: float(11)?,
            line: line.to_string(),
        })
    }
}

pub fn read_hits(path: impl AsRef<Path>) -> Result<Vec<BlastHit>> {
    let mut hits = Vec::new();
    for (idx, line) in open_text(path)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        hits.push(BlastHit::parse_line(&line, idx + 1)?);
    }
    Ok(hits)
}

/// Replace the `.blasttab` extension (or append) with `suffix`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = name.strip_suffix(".blasttab").unwrap_or(&name);
    path.with_file_name(format!("{stem}{suffix}"))
}

/// Keep hits with `pident >= identity`, written next to the input as
/// `<name>.pident<identity>.blasttab`
pub fn filter_by_identity(blasttab: &Path, identity: u32) -> Result<PathBuf> {
    let out_path = sibling(blasttab, &format!(".pident{identity}.blasttab"));
    let mut out = create_text(&out_path)?;
    let mut kept = 0usize;
    for hit in read_hits(blasttab)? {
        if hit.pident >= f64::from(identity) {
            writeln!(out, "{}", hit.line)?;
            kept += 1;
        }
    }
    out.flush()?;
    info!(identity, kept, path = %out_path.display(), "Filtered BLAST hits by identity");
    Ok(out_path)
}

/// Pairs found in both directions: `(query, subject, pident forward, pident reverse)`
pub fn bidirectional_best_hits(forward: &[BlastHit], reverse: &[BlastHit]) -> Vec<(String, String, f64, f64)> {
    let mut back: HashMap<(&str, &str), Vec<f64>> = HashMap::new();
    for hit in reverse {
        back.entry((&hit.sseqid, &hit.qseqid)).or_default().push(hit.pident);
    }
    let mut pairs = Vec::new();
    for hit in forward {
        if let Some(idents) = back.get(&(hit.qseqid.as_str(), hit.sseqid.as_str())) {
            for ident in idents {
                pairs.push((hit.qseqid.clone(), hit.sseqid.clone(), hit.pident, *ident));
            }
        }
    }
    pairs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeqKind {
    Nucl,
    Prot,
}

impl SeqKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeqKind::Nucl => "nucl",
            SeqKind::Prot => "prot",
        }
    }

    fn db_suffixes(&self) -> [&'static str; 3] {
        match self {
            SeqKind::Nucl => ["nin", "nsq", "nhr"],
            SeqKind::Prot => ["pin", "psq", "phr"],
        }
    }
}

/// BLAST program for a query/database pair
pub fn program(query: SeqKind, database: SeqKind) -> &'static str {
    match (query, database) {
        (SeqKind::Nucl, SeqKind::Nucl) => "blastn",
        (SeqKind::Nucl, SeqKind::Prot) => "blastx",
        (SeqKind::Prot, SeqKind::Prot) => "blastp",
        (SeqKind::Prot, SeqKind::Nucl) => "tblastn",
    }
}

/// Kind of an existing BLAST database: `<path>.*` files carrying all three
/// index suffixes of one kind
pub fn database_kind(path: &Path) -> Option<SeqKind> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path.file_name()?.to_string_lossy().into_owned();
    let suffixes: HashSet<String> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let file = e.file_name().to_string_lossy().into_owned();
            let rest = file.strip_prefix(&format!("{name}."))?;
            Some(rest.rsplit('.').next().unwrap_or(rest).to_string())
        })
        .collect();
    [SeqKind::Nucl, SeqKind::Prot]
        .into_iter()
        .find(|kind| kind.db_suffixes().iter().all(|s| suffixes.contains(*s)))
}

/// Kind of a FASTA file judged by its first record; `None` when the file is
/// not FASTA or holds no records
pub fn fasta_kind(path: &Path) -> Option<SeqKind> {
    if !path.is_file() {
        return None;
    }
    let first = records(path).ok()?.next()?.ok()?;
    Some(if is_protein(first.seq()) {
        SeqKind::Prot
    } else {
        SeqKind::Nucl
    })
}

/// A BLAST input given either as FASTA or as a database prefix
#[derive(Debug, Clone, PartialEq)]
pub struct BlastInput {
    pub path: PathBuf,
    pub kind: SeqKind,
    pub is_fasta: bool,
}

impl BlastInput {
    pub fn detect(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(kind) = fasta_kind(&path) {
            return Ok(Self { path, kind, is_fasta: true });
        }
        if let Some(kind) = database_kind(&path) {
            return Ok(Self { path, kind, is_fasta: false });
        }
        Err(BwrError::invalid_input(format!(
            "{} is neither a FASTA file nor a BLAST database",
            path.display()
        )))
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Search settings passed to every BLAST program
#[derive(Debug, Clone, PartialEq)]
pub struct BlastParams {
    pub evalue: String,
    pub outfmt: u32,
    pub max_target_seqs: u32,
    pub num_threads: u32,
    pub perc_identity: Option<u32>,
    /// Extra options appended verbatim
    pub extra: Vec<String>,
}

impl Default for BlastParams {
    fn default() -> Self {
        Self {
            evalue: "1e-5".to_string(),
            outfmt: 6,
            max_target_seqs: 500,
            num_threads: 4,
            perc_identity: None,
            extra: Vec::new(),
        }
    }
}

/// Output files of [`BlastRunner::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct BlastOutcome {
    pub forward: PathBuf,
    pub reverse: Option<PathBuf>,
    pub best_hits: Option<PathBuf>,
}

/// Drives BLAST+ executables found in one directory
#[derive(Debug, Clone)]
pub struct BlastRunner {
    bin_dir: PathBuf,
    params: BlastParams,
}

impl BlastRunner {
    /// Use `bin_dir` when given, otherwise the directory holding `blastn` on `PATH`
    pub fn new(bin_dir: Option<PathBuf>, params: BlastParams) -> Result<Self> {
        let bin_dir = match bin_dir {
            Some(dir) => dir,
            None => tool::find_in_path("blastn")
                .and_then(|p| p.parent().map(Path::to_path_buf))
                .ok_or_else(|| BwrError::ToolNotFound("blastn".to_string()))?,
        };
        Ok(Self { bin_dir, params })
    }

    pub fn params(&self) -> &BlastParams {
        &self.params
    }

    fn exe(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    /// Database prefix for an input, building it with `makeblastdb` from FASTA
    /// when no database exists yet
    pub fn ensure_database(&self, input: &BlastInput) -> Result<PathBuf> {
        if database_kind(&input.path).is_none() {
            info!(fasta = %input.path.display(), "Making BLAST database");
            let path = input.path.to_string_lossy().into_owned();
            tool::run(
                &self.exe("makeblastdb"),
                ["-in", path.as_str(), "-dbtype", input.kind.as_str()],
            )?;
        }
        Ok(input.path.clone())
    }

    /// FASTA for an input, extracting it with `blastdbcmd` from a database
    pub fn ensure_fasta(&self, input: &BlastInput) -> Result<PathBuf> {
        if input.is_fasta {
            return Ok(input.path.clone());
        }
        let out = PathBuf::from(format!("{}.fasta", input.path.display()));
        info!(db = %input.path.display(), "Extracting sequences from BLAST database");
        let db = input.path.to_string_lossy().into_owned();
        let out_str = out.to_string_lossy().into_owned();
        tool::run(
            &self.exe("blastdbcmd"),
            ["-entry", "all", "-db", db.as_str(), "-out", out_str.as_str()],
        )?;
        Ok(out)
    }

    /// Search `query` against `subject`, writing
    /// `<outdir>/<query fasta>.<subject db>.blasttab` (identity filtered when
    /// requested). Returns the final result file.
    pub fn search(&self, query: &BlastInput, subject: &BlastInput, outdir: &Path) -> Result<PathBuf> {
        let program = program(query.kind, subject.kind);
        let fasta = self.ensure_fasta(query)?;
        let db = self.ensure_database(subject)?;
        let fasta_name = fasta.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let out = outdir.join(format!("{}.{}.blasttab", fasta_name, subject.name()));

        let p = &self.params;
        let mut args: Vec<String> = vec![
            "-query".into(),
            fasta.to_string_lossy().into_owned(),
            "-db".into(),
            db.to_string_lossy().into_owned(),
            "-evalue".into(),
            p.evalue.clone(),
            "-outfmt".into(),
            p.outfmt.to_string(),
            "-max_target_seqs".into(),
            p.max_target_seqs.to_string(),
            "-num_threads".into(),
            p.num_threads.to_string(),
        ];
        args.extend(p.extra.iter().cloned());
        args.push("-out".into());
        args.push(out.to_string_lossy().into_owned());

        info!(program, query = %fasta.display(), db = %db.display(), "Running BLAST");
        tool::run(&self.exe(program), &args)?;

        match p.perc_identity {
            Some(identity) => filter_by_identity(&out, identity),
            None => Ok(out),
        }
    }

    /// One search, or with `bidirectional` both directions (keeping one target
    /// per query) plus their reciprocal pairs in a `.bbh` file
    pub fn run(&self, input1: &BlastInput, input2: &BlastInput, outdir: &Path, bidirectional: bool) -> Result<BlastOutcome> {
        std::fs::create_dir_all(outdir)?;
        if !bidirectional {
            return Ok(BlastOutcome {
                forward: self.search(input1, input2, outdir)?,
                reverse: None,
                best_hits: None,
            });
        }

        let runner = Self {
            bin_dir: self.bin_dir.clone(),
            params: BlastParams {
                max_target_seqs: 1,
                ..self.params.clone()
            },
        };
        let forward = runner.search(input1, input2, outdir)?;
        let reverse = runner.search(input2, input1, outdir)?;
        let bbh_path = sibling(&forward, ".bbh");
        let pairs = bidirectional_best_hits(&read_hits(&forward)?, &read_hits(&reverse)?);
        let mut out = create_text(&bbh_path)?;
        for (query, subject, ident_f, ident_r) in &pairs {
            writeln!(out, "{query}\t{subject}\t{ident_f}\t{ident_r}")?;
        }
        out.flush()?;
        info!(pairs = pairs.len(), path = %bbh_path.display(), "Wrote reciprocal best hits");

        Ok(BlastOutcome {
            forward,
            reverse: Some(reverse),
            best_hits: Some(bbh_path),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn hit(q: &str, s: &str, pident: f64) -> BlastHit {
        BlastHit::parse_line(&format!("{q}\t{s}\t{pident}\t100\t0\t0\t1\t100\t1\t100\t1e-30\t200"), 1).unwrap()
    }

    #[test]
    fn test_program_table() {
        assert_eq!(program(SeqKind::Nucl, SeqKind::Prot), "blastx");
        assert_eq!(program(SeqKind::Prot, SeqKind::Nucl), "tblastn");
    }

    #[test]
    fn test_bidirectional_best_hits() {
        let forward = vec![hit("a1", "b1", 99.0), hit("a2", "b2", 80.0)];
        let reverse = vec![hit("b1", "a1", 98.5), hit("b2", "a3", 70.0)];
        assert_eq!(
            bidirectional_best_hits(&forward, &reverse),
            vec![("a1".to_string(), "b1".to_string(), 99.0, 98.5)]
        );
    }

    #[test]
    fn test_filter_by_identity_names_output() {
        let dir = tempfile::tempdir().unwrap();
        let tab = dir.path().join("q.fa.db.blasttab");
        std::fs::write(&tab, format!("{}\n{}\n", hit("a", "b", 95.0).line, hit("a", "c", 60.0).line)).unwrap();
        let out = filter_by_identity(&tab, 90).unwrap();
        assert_eq!(out, dir.path().join("q.fa.db.pident90.blasttab"));
        assert_eq!(std::fs::read_to_string(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_detect_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let prot = dir.path().join("pep.fa");
        std::fs::write(&prot, ">p1\nMKVLLA\n").unwrap();
        assert_eq!(BlastInput::detect(&prot).unwrap().kind, SeqKind::Prot);

        let db = dir.path().join("genome");
        for ext in ["nin", "nsq", "nhr"] {
            std::fs::write(dir.path().join(format!("genome.{ext}")), b"").unwrap();
        }
        let input = BlastInput::detect(&db).unwrap();
        assert_eq!((input.kind, input.is_fasta), (SeqKind::Nucl, false));

        assert!(BlastInput::detect(dir.path().join("missing")).is_err());
    }
}
