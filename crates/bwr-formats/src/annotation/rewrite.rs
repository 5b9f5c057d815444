//! Coordinate rewrites that move features onto new sequences

use crate::bed::BedRecord;
use crate::gff::GffRecord;
use bwr_common::{BwrError, Result};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use tracing::warn;

/// Move features of merged contigs onto the super-contig, shifting their
/// coordinates by the contig offset.
///
/// Works line by line so attributes and comments are written back untouched.
/// Returns the number of shifted features.
pub fn shift_contigs<R: BufRead, W: Write>(
    input: R,
    out: &mut W,
    offsets: &HashMap<String, u64>,
    merged_name: &str,
) -> Result<usize> {
    let mut shifted = 0;
    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            writeln!(out, "{line}")?;
            continue;
        }
        let mut fields: Vec<String> = line.split('\t').map(str::to_string).collect();
        if fields.len() < 5 {
            return Err(BwrError::parse(idx + 1, "expected at least 5 tab-separated columns"));
        }
        if let Some(&offset) = offsets.get(&fields[0]) {
            for col in [3, 4] {
                let pos: u64 = fields[col].parse().map_err(|_| {
                    BwrError::parse(idx + 1, format!("invalid coordinate '{}'", fields[col]))
                })?;
                fields[col] = (pos + offset).to_string();
            }
            fields[0] = merged_name.to_string();
            shifted += 1;
        }
        writeln!(out, "{}", fields.join("\t"))?;
    }
    Ok(shifted)
}

/// Re-home features onto split chromosomes.
///
/// Each interval is `chrom start end split_name`. A feature lying inside an
/// interval moves to `split_name` with coordinates relative to the interval
/// start; anything else is kept as is.
pub fn split_by_intervals(records: Vec<GffRecord>, intervals: &[BedRecord]) -> Vec<GffRecord> {
    let mut by_chrom: HashMap<&str, Vec<&BedRecord>> = HashMap::new();
    for bed in intervals {
        by_chrom.entry(bed.chrom.as_str()).or_default().push(bed);
    }

    let mut outside = 0usize;
    let records = records
        .into_iter()
        .map(|mut record| {
            let Some(beds) = by_chrom.get(record.seqid.as_str()) else {
                return record;
            };
            let host = beds
                .iter()
                .find(|bed| record.start > bed.start && record.end <= bed.end);
            match host {
                Some(bed) => {
                    record.seqid = bed.name().to_string();
                    record.start -= bed.start;
                    record.end -= bed.start;
                },
                None => outside += 1,
            }
            record
        })
        .collect();

    if outside > 0 {
        warn!(count = outside, "Features outside every split interval were left in place");
    }
    records
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_shift_contigs_rewrites_listed_contigs() {
        let input = "#header\nctg2\tsrc\texon\t1\t10\t.\t+\t.\tgene_id \"g\";\nchr1\tsrc\texon\t5\t8\t.\t+\t.\tgene_id \"h\";\n";
        let offsets: HashMap<String, u64> = [("ctg2".to_string(), 105)].into_iter().collect();
        let mut out = Vec::new();
        let shifted = shift_contigs(Cursor::new(input), &mut out, &offsets, "chrUn").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(shifted, 1);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#header");
        assert_eq!(lines[1], "chrUn\tsrc\texon\t106\t115\t.\t+\t.\tgene_id \"g\";");
        assert!(lines[2].starts_with("chr1\tsrc\texon\t5\t8"));
    }

    #[test]
    fn test_split_by_intervals() {
        let records = vec![
            GffRecord::parse_line("chr1\ts\tgene\t1001\t1500\t.\t+\t.\tID=g1", 1).unwrap(),
            GffRecord::parse_line("chr1\ts\tgene\t1\t50\t.\t+\t.\tID=g2", 2).unwrap(),
            GffRecord::parse_line("chr2\ts\tgene\t7\t9\t.\t+\t.\tID=g3", 3).unwrap(),
        ];
        let intervals = vec![
            BedRecord::parse_line("chr1\t0\t1000\tchr1_part1", 1).unwrap(),
            BedRecord::parse_line("chr1\t1000\t2000\tchr1_part2", 2).unwrap(),
        ];
        let split = split_by_intervals(records, &intervals);
        assert_eq!((split[0].seqid.as_str(), split[0].start, split[0].end), ("chr1_part2", 1, 500));
        assert_eq!((split[1].seqid.as_str(), split[1].start), ("chr1_part1", 1));
        assert_eq!(split[2].seqid, "chr2");
    }
}
