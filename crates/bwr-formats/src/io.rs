//! File helpers shared by the readers

use bwr_common::Result;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Open a text file for buffered reading, decompressing `.gz` files on the fly
pub fn open_text(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let is_gz = path.extension().is_some_and(|ext| ext == "gz");
    if is_gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Create (truncate) a file for buffered writing, creating parent directories
pub fn create_text(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Write lines joined by `\n`, each terminated
pub fn write_lines<W: Write, S: AsRef<str>>(out: &mut W, lines: &[S]) -> Result<()> {
    for line in lines {
        writeln!(out, "{}", line.as_ref())?;
    }
    Ok(())
}

/// Replace the final extension: `genes.gtf` + `merge_ctg.gtf` -> `genes.merge_ctg.gtf`
pub fn with_suffix(path: impl AsRef<Path>, suffix: &str) -> std::path::PathBuf {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}.{suffix}"))
}

/// Format a float the way the table writers do: fixed decimals, `None` for NaN
pub fn fmt_float(value: f64, decimals: usize, na_rep: &str) -> String {
    if value.is_nan() {
        na_rep.to_string()
    } else {
        format!("{value:.decimals$}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix("/data/genes.gtf", "merge_ctg.gtf"),
            Path::new("/data/genes.merge_ctg.gtf")
        );
        assert_eq!(with_suffix("genome.fa", "ctg.offset.txt"), Path::new("genome.ctg.offset.txt"));
    }

    #[test]
    fn test_fmt_float() {
        assert_eq!(fmt_float(0.123456, 3, "None"), "0.123");
        assert_eq!(fmt_float(f64::NAN, 3, "None"), "None");
    }
}
