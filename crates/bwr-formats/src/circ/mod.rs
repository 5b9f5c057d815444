//! circRNA tables from CIRCexplorer
//!
//! Known-circRNA tables (`<sample>.circularRNA_known.txt`, 18 columns, no
//! header) are combined across samples, filtered, annotated with transcript
//! biotypes and flank intron sizes, then summarised ([`stats`]), laid out
//! as per-sample read matrices ([`detail`]) or used to draw matched
//! background circRNAs ([`in_silico`]).

pub mod detail;
pub mod in_silico;
pub mod stats;

use crate::io::{create_text, open_text};
use bwr_common::{BwrError, Result, Strand};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column names of a CIRCexplorer known table
pub const CIRC_HEADER: [&str; 18] = [
    "chrom",
    "start",
    "end",
    "name",
    "score",
    "strand",
    "thickStart",
    "thickEnd",
    "itemRgb",
    "exonCount",
    "exonSizes",
    "exonOffsets",
    "readNumber",
    "circType",
    "geneName",
    "isoformName",
    "index",
    "flankIntron",
];

pub const KNOWN_TABLE_SUFFIX: &str = "circularRNA_known.txt";
pub const COMBINED_TABLE: &str = "circ.combined.txt";
pub const DEFAULT_READ_CUTOFF: u64 = 2;

/// Common English name used in output file names; unknown species pass through
pub fn species_common_name(species: &str) -> &str {
    match species {
        "mus_musculus" => "Mouse",
        "canis_familiaris" => "Dog",
        "cavia_porcellus" => "Guinea_pig",
        "felis_catus" => "Cat",
        "macaca_mulatta" => "Monkey",
        "oryctolagus_cuniculus" => "Rabbit",
        "rattus_norvegicus" => "Rat",
        "ovis_aries" => "Sheep",
        "gallus_gallus" => "Chicken",
        "sus_scrofa" => "Pig",
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircRecord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub score: String,
    pub strand: Strand,
    pub thick_start: String,
    pub thick_end: String,
    pub item_rgb: String,
    pub exon_count: u32,
    pub exon_sizes: String,
    pub exon_offsets: String,
    pub read_number: u64,
    pub circ_type: String,
    pub gene_name: String,
    pub isoform_name: String,
    pub index: String,
    pub flank_intron: String,
    pub sample_id: String,
}

impl CircRecord {
    /// Parse the 18 known-table columns; the sample id is supplied separately
    pub fn parse_fields(fields: &[&str], sample_id: &str, line_no: usize) -> Result<Self> {
        if fields.len() < CIRC_HEADER.len() {
            return Err(BwrError::parse(
                line_no,
                format!("circRNA table needs 18 columns, found {}", fields.len()),
            ));
        }
        let num = |idx: usize| -> Result<u64> {
            fields[idx].trim().parse().map_err(|_| {
                BwrError::parse(line_no, format!("invalid {} '{}'", CIRC_HEADER[idx], fields[idx]))
            })
        };
        let strand = fields[5]
            .parse()
            .map_err(|_| BwrError::parse(line_no, format!("invalid strand '{}'", fields[5])))?;

        Ok(Self {
            chrom: fields[0].to_string(),
            start: num(1)?,
            end: num(2)?,
            name: fields[3].to_string(),
            score: fields[4].to_string(),
            strand,
            thick_start: fields[6].to_string(),
            thick_end: fields[7].to_string(),
            item_rgb: fields[8].to_string(),
            exon_count: u32::try_from(num(9)?).map_err(|_| {
                BwrError::parse(line_no, format!("{} out of range: '{}'", CIRC_HEADER[9], fields[9]))
            })?,
            exon_sizes: fields[10].to_string(),
            exon_offsets: fields[11].to_string(),
            read_number: num(12)?,
            circ_type: fields[13].to_string(),
            gene_name: fields[14].to_string(),
            isoform_name: fields[15].to_string(),
            index: fields[16].to_string(),
            flank_intron: fields[17].to_string(),
            sample_id: sample_id.to_string(),
        })
    }

    fn to_line(&self) -> String {
        [
            self.chrom.clone(),
            self.start.to_string(),
            self.end.to_string(),
            self.name.clone(),
            self.score.clone(),
            self.strand.to_string(),
            self.thick_start.clone(),
            self.thick_end.clone(),
            self.item_rgb.clone(),
            self.exon_count.to_string(),
            self.exon_sizes.clone(),
            self.exon_offsets.clone(),
            self.read_number.to_string(),
            self.circ_type.clone(),
            self.gene_name.clone(),
            self.isoform_name.clone(),
            self.index.clone(),
            self.flank_intron.clone(),
            self.sample_id.clone(),
        ]
        .join("\t")
    }

    /// Spliced length: the sum of `exonSizes`
    pub fn length(&self) -> Result<u64> {
        self.exon_sizes
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse::<u64>()
                    .map_err(|_| BwrError::invalid_input(format!("invalid exon size '{s}'")))
            })
            .sum()
    }
}

/// Sample id of a known table: the file name up to its first `.`
pub fn sample_id_from_path(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().split('.').next().unwrap_or_default().to_string())
        .unwrap_or_default()
}

fn read_known_table(path: &Path) -> Result<Vec<CircRecord>> {
    let sample = sample_id_from_path(path);
    let mut records = Vec::new();
    for (idx, line) in open_text(path)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        records.push(CircRecord::parse_fields(&fields, &sample, idx + 1)?);
    }
    Ok(records)
}

/// All `*<suffix>` tables of a directory, in file-name order
pub fn known_tables(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut tables: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().ends_with(suffix))
        })
        .collect();
    tables.sort();
    Ok(tables)
}

/// Load every known table of `dir`, reusing `circ.combined.txt` when it
/// exists and writing it otherwise
pub fn load_combined(dir: &Path, suffix: &str) -> Result<Vec<CircRecord>> {
    let combined = dir.join(COMBINED_TABLE);
    if combined.is_file() {
        debug!(path = %combined.display(), "Reusing combined circRNA table");
        let mut records = Vec::new();
        for (idx, line) in open_text(&combined)?.lines().enumerate().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let sample = fields.get(CIRC_HEADER.len()).copied().unwrap_or_default();
            records.push(CircRecord::parse_fields(&fields, sample, idx + 1)?);
        }
        return Ok(records);
    }

    let tables = known_tables(dir, suffix)?;
    if tables.is_empty() {
        return Err(BwrError::invalid_input(format!(
            "no *{suffix} tables in {}",
            dir.display()
        )));
    }
    let mut records = Vec::new();
    for table in &tables {
        records.extend(read_known_table(table)?);
    }
    info!(tables = tables.len(), records = records.len(), "Combined circRNA tables");

    let mut out = create_text(&combined)?;
    writeln!(out, "{}\tsample_id", CIRC_HEADER.join("\t"))?;
    for record in &records {
        writeln!(out, "{}", record.to_line())?;
    }
    out.flush()?;
    Ok(records)
}

/// Which circRNA types are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircType {
    #[default]
    All,
    CircRna,
    CiRna,
}

impl CircType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircType::All => "all_circ",
            CircType::CircRna => "circRNA",
            CircType::CiRna => "ciRNA",
        }
    }

    pub fn matches(&self, circ_type: &str) -> bool {
        match self {
            CircType::All => true,
            other => other.as_str() == circ_type,
        }
    }
}

impl std::str::FromStr for CircType {
    type Err = BwrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all_circ" => Ok(CircType::All),
            "circRNA" => Ok(CircType::CircRna),
            "ciRNA" => Ok(CircType::CiRna),
            other => Err(BwrError::invalid_input(format!("unknown circRNA type '{other}'"))),
        }
    }
}

/// Upstream and downstream flank intron sizes from `c:s-e|c:s-e`.
///
/// A `None` side has no size; the pair is swapped on the `-` strand.
pub fn flank_intron_sizes(flank: &str, strand: Strand) -> Result<(Option<u64>, Option<u64>)> {
    let parts: Vec<&str> = flank.split('|').collect();
    if parts.len() < 2 {
        return Ok((None, None));
    }
    let size = |part: &str| -> Result<Option<u64>> {
        if part == "None" {
            return Ok(None);
        }
        let invalid = || BwrError::invalid_input(format!("invalid flank intron '{part}'"));
        let (_, range) = part.rsplit_once(':').ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let start: u64 = start.parse().map_err(|_| invalid())?;
        let end: u64 = end.parse().map_err(|_| invalid())?;
        Ok(Some(end.saturating_sub(start)))
    };
    let (left, right) = (size(parts[0])?, size(parts[1])?);
    if strand.is_reverse() {
        Ok((right, left))
    } else {
        Ok((left, right))
    }
}

/// Transcript annotation joined onto circRNAs through `isoformName`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscriptAnnotation {
    pub biotype: Option<String>,
    pub gene_symbol: Option<String>,
}

/// Read a transcript table with `transcript_id`, `transcript_biotype` and
/// optionally `gene_name` columns
pub fn read_transcript_annotation(path: impl AsRef<Path>) -> Result<HashMap<String, TranscriptAnnotation>> {
    let table = crate::table::Table::read(path)?;
    let tr = table.column_index("transcript_id")?;
    let biotype = table.column_index("transcript_biotype")?;
    let symbol = table.column_index("gene_name").ok();
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Ok((0..table.len())
        .map(|row| {
            (
                table.cell(row, tr).to_string(),
                TranscriptAnnotation {
                    biotype: non_empty(table.cell(row, biotype)),
                    gene_symbol: symbol.and_then(|c| non_empty(table.cell(row, c))),
                },
            )
        })
        .collect())
}

/// A filtered circRNA with its annotation and derived sizes
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedCirc {
    pub record: CircRecord,
    pub biotype: Option<String>,
    pub gene_symbol: Option<String>,
    pub flank_up: Option<u64>,
    pub flank_down: Option<u64>,
    pub length: u64,
}

/// Apply the read cutoff and type filter, then attach annotation
pub fn annotate(
    records: Vec<CircRecord>,
    read_cutoff: u64,
    circ_type: CircType,
    transcripts: &HashMap<String, TranscriptAnnotation>,
) -> Result<Vec<AnnotatedCirc>> {
    records
        .into_iter()
        .filter(|r| r.read_number >= read_cutoff && circ_type.matches(&r.circ_type))
        .map(|record| {
            let (flank_up, flank_down) = flank_intron_sizes(&record.flank_intron, record.strand)?;
            let annotation = transcripts.get(&record.isoform_name).cloned().unwrap_or_default();
            Ok(AnnotatedCirc {
                length: record.length()?,
                biotype: annotation.biotype,
                gene_symbol: annotation.gene_symbol,
                flank_up,
                flank_down,
                record,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    /// One known-table line
    pub fn line(chrom: &str, start: u64, end: u64, strand: &str, reads: u64, circ_type: &str, gene: &str, iso: &str, flank: &str) -> String {
        format!(
            "{chrom}\t{start}\t{end}\tcirc/{reads}\t0\t{strand}\t{start}\t{start}\t0,0,0\t2\t100,50\t0,400\t{reads}\t{circ_type}\t{gene}\t{iso}\t1,2\t{flank}"
        )
    }

    pub fn record(sample: &str, text: &str) -> CircRecord {
        let fields: Vec<&str> = text.split('\t').collect();
        CircRecord::parse_fields(&fields, sample, 1).unwrap()
    }

    pub fn transcripts() -> HashMap<String, TranscriptAnnotation> {
        [
            ("T1", "protein_coding", "Abc1"),
            ("T2", "lncRNA", "Lnc2"),
        ]
        .iter()
        .map(|(t, b, s)| {
            (
                t.to_string(),
                TranscriptAnnotation {
                    biotype: Some(b.to_string()),
                    gene_symbol: Some(s.to_string()),
                },
            )
        })
        .collect()
    }

    pub fn annotated() -> Vec<AnnotatedCirc> {
        let records = vec![
            record("s1", &line("1", 1000, 1550, "+", 5, "circRNA", "G1", "T1", "1:500-1000|1:1550-1650")),
            record("s2", &line("1", 1000, 1550, "+", 3, "circRNA", "G1", "T1", "1:500-1000|1:1550-1650")),
            record("s1", &line("2", 200, 700, "-", 4, "ciRNA", "G2", "T2", "None|2:700-1000")),
            record("s2", &line("3", 10, 500, "+", 1, "circRNA", "G3", "T3", "None|None")),
        ];
        annotate(records, DEFAULT_READ_CUTOFF, CircType::All, &transcripts()).unwrap()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_flank_intron_sizes() {
        assert_eq!(
            flank_intron_sizes("1:7089216-7120193|1:7163371-7169514", Strand::Forward).unwrap(),
            (Some(30977), Some(6143))
        );
        assert_eq!(
            flank_intron_sizes("None|1:100-150", Strand::Reverse).unwrap(),
            (Some(50), None)
        );
        assert_eq!(flank_intron_sizes("None", Strand::Forward).unwrap(), (None, None));
        assert!(flank_intron_sizes("1:abc|None", Strand::Forward).is_err());
    }

    #[test]
    fn test_annotate_filters_and_joins() {
        let circs = annotated();
        assert_eq!(circs.len(), 3);
        assert_eq!(circs[0].length, 150);
        assert_eq!(circs[0].biotype.as_deref(), Some("protein_coding"));
        // minus strand swaps the flanks
        assert_eq!((circs[2].flank_up, circs[2].flank_down), (Some(300), None));

        let only_ci = annotate(
            vec![record("s1", &line("2", 200, 700, "-", 4, "ciRNA", "G2", "T2", "None|None"))],
            2,
            "circRNA".parse().unwrap(),
            &transcripts(),
        )
        .unwrap();
        assert!(only_ci.is_empty());
    }

    #[test]
    fn test_exon_count_out_of_range() {
        let text = line("1", 10, 90, "+", 3, "circRNA", "G", "T1", "None|None").replacen("\t2\t100,50", "\t4294967296\t100,50", 1);
        let fields: Vec<&str> = text.split('\t').collect();
        let err = CircRecord::parse_fields(&fields, "s1", 7).unwrap_err();
        assert!(err.to_string().contains("exon"), "{err}");
        assert_eq!(record("s1", &line("1", 10, 90, "+", 3, "circRNA", "G", "T1", "None|None")).exon_count, 2);
    }

    #[test]
    fn test_load_combined_writes_cache() {
        let dir = tempfile::tempdir().unwrap();
        for sample in ["s1", "s2"] {
            let mut file = std::fs::File::create(dir.path().join(format!("{sample}.{KNOWN_TABLE_SUFFIX}"))).unwrap();
            writeln!(file, "{}", line("1", 10, 90, "+", 3, "circRNA", "G", "T1", "None|None")).unwrap();
        }
        let records = load_combined(dir.path(), KNOWN_TABLE_SUFFIX).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sample_id, "s2");
        assert!(dir.path().join(COMBINED_TABLE).is_file());

        let cached = load_combined(dir.path(), KNOWN_TABLE_SUFFIX).unwrap();
        assert_eq!(cached, records);
    }

    #[test]
    fn test_species_common_name() {
        assert_eq!(species_common_name("sus_scrofa"), "Pig");
        assert_eq!(species_common_name("homo_sapiens"), "homo_sapiens");
    }
}
