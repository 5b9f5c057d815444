//! GFF3 and GTF feature records
//!
//! Both formats share the nine tab-separated columns and differ only in how
//! the attribute column is written: `key=value;key=value` for GFF3 and
//! `key "value"; key "value";` for GTF. Attributes keep their input order so
//! that rewritten files diff cleanly against their source.

use crate::io::open_text;
use bwr_common::{BwrError, Result, Strand};
use std::io::{BufRead, Write};
use std::path::Path;

/// How the attribute column is serialised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeStyle {
    Gff3,
    Gtf,
}

impl AttributeStyle {
    /// Pick a style from a file extension (`.gtf` -> GTF, everything else GFF3)
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".gtf") {
            AttributeStyle::Gtf
        } else {
            AttributeStyle::Gff3
        }
    }
}

/// Insertion-ordered attribute list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an attribute column, detecting GTF (`key "value"`) or GFF3 (`key=value`)
    pub fn parse(column: &str) -> Self {
        let column = column.trim();
        if column.is_empty() || column == "." {
            return Self::default();
        }
        let first = column.split(';').next().unwrap_or_default();
        let is_gff3 = first
            .split_once('=')
            .is_some_and(|(key, _)| !key.trim().contains(char::is_whitespace));
        if is_gff3 {
            Self::parse_gff3(column)
        } else {
            Self::parse_gtf(column)
        }
    }

    pub fn parse_gff3(column: &str) -> Self {
        let pairs = column
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                let (key, value) = part.split_once('=')?;
                Some((key.trim().to_string(), value.trim().to_string()))
            })
            .collect();
        Self(pairs)
    }

    pub fn parse_gtf(column: &str) -> Self {
        let pairs = column
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once(char::is_whitespace) {
                Some((key, value)) => (key.to_string(), value.trim().trim_matches('"').to_string()),
                None => (part.to_string(), String::new()),
            })
            .collect();
        Self(pairs)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replace the value of an existing key in place, or append it
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut String)> {
        self.0.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_gff3(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn to_gtf(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k} \"{v}\";"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn render(&self, style: AttributeStyle) -> String {
        match style {
            AttributeStyle::Gff3 => self.to_gff3(),
            AttributeStyle::Gtf => self.to_gtf(),
        }
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

/// One feature line (1-based, closed coordinates)
#[derive(Debug, Clone, PartialEq)]
pub struct GffRecord {
    pub seqid: String,
    pub source: String,
    pub feature: String,
    pub start: u64,
    pub end: u64,
    /// Kept verbatim, usually `.`
    pub score: String,
    pub strand: Strand,
    pub frame: String,
    pub attributes: Attributes,
}

impl GffRecord {
    /// Parse a single tab-separated line; `line_no` is used for error context
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        if fields.len() < 8 {
            return Err(BwrError::parse(
                line_no,
                format!("expected 9 tab-separated columns, found {}", fields.len()),
            ));
        }

        let start = fields[3]
            .parse()
            .map_err(|_| BwrError::parse(line_no, format!("invalid start '{}'", fields[3])))?;
        let end = fields[4]
            .parse()
            .map_err(|_| BwrError::parse(line_no, format!("invalid end '{}'", fields[4])))?;
        let strand = fields[6]
            .parse()
            .map_err(|_| BwrError::parse(line_no, format!("invalid strand '{}'", fields[6])))?;

        Ok(Self {
            seqid: fields[0].to_string(),
            source: fields[1].to_string(),
            feature: fields[2].to_string(),
            start,
            end,
            score: fields[5].to_string(),
            strand,
            frame: fields[7].to_string(),
            attributes: Attributes::parse(fields.get(8).copied().unwrap_or_default()),
        })
    }

    /// Feature length, inclusive of both ends
    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)
    }

    pub fn gene_id(&self) -> Option<&str> {
        self.attr("gene_id")
    }

    pub fn transcript_id(&self) -> Option<&str> {
        self.attr("transcript_id")
    }

    /// Render the first eight columns, without the attribute column
    pub fn columns(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.seqid,
            self.source,
            self.feature,
            self.start,
            self.end,
            self.score,
            self.strand,
            self.frame
        )
    }

    pub fn to_line(&self, style: AttributeStyle) -> String {
        format!("{}\t{}", self.columns(), self.attributes.render(style))
    }
}

/// Streaming reader yielding records and skipping blank and `#` lines
pub struct GffReader<R> {
    inner: R,
    line_no: usize,
    buffer: String,
}

impl<R: BufRead> GffReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_no: 0,
            buffer: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for GffReader<R> {
    type Item = Result<GffRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.inner.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {},
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;
            let line = self.buffer.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Some(GffRecord::parse_line(line, self.line_no));
        }
    }
}

/// Read every record of a GFF/GTF file (plain or gzipped)
pub fn read_gff(path: impl AsRef<Path>) -> Result<Vec<GffRecord>> {
    GffReader::new(open_text(path)?).collect()
}

/// Write records in the given attribute style
pub fn write_gff<'a, W, I>(out: &mut W, records: I, style: AttributeStyle) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a GffRecord>,
{
    for record in records {
        writeln!(out, "{}", record.to_line(style))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GTF_LINE: &str = "1\tensembl\texon\t11869\t12227\t.\t+\t.\tgene_id \"ENSG00000223972\"; transcript_id \"ENST00000456328\"; exon_number \"1\";";
    const GFF_LINE: &str = "chr1\tStringTie\tmRNA\t100\t900\t.\t-\t.\tID=MSTRG.1.1;Parent=MSTRG.1";

    #[test]
    fn test_parse_gtf_line() {
        let record = GffRecord::parse_line(GTF_LINE, 1).unwrap();
        assert_eq!(record.seqid, "1");
        assert_eq!(record.feature, "exon");
        assert_eq!(record.length(), 359);
        assert_eq!(record.gene_id(), Some("ENSG00000223972"));
        assert_eq!(record.transcript_id(), Some("ENST00000456328"));
        assert_eq!(record.to_line(AttributeStyle::Gtf), GTF_LINE);
    }

    #[test]
    fn test_parse_gff3_line() {
        let record = GffRecord::parse_line(GFF_LINE, 1).unwrap();
        assert_eq!(record.strand, Strand::Reverse);
        assert_eq!(record.attr("Parent"), Some("MSTRG.1"));
        assert_eq!(record.to_line(AttributeStyle::Gff3), GFF_LINE);
    }

    #[test]
    fn test_short_line_reports_line_number() {
        let err = GffRecord::parse_line("chr1\tsrc\texon", 7).unwrap_err();
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn test_reader_skips_comments() {
        let text = format!("##gff-version 3\n\n{GFF_LINE}\n#comment\n{GFF_LINE}\n");
        let records: Vec<_> = GffReader::new(Cursor::new(text))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_attribute_insert_keeps_order() {
        let mut attrs = Attributes::parse_gff3("ID=a;Parent=b;Name=c");
        attrs.insert("Parent", "z");
        attrs.insert("note", "x");
        assert_eq!(attrs.to_gff3(), "ID=a;Parent=z;Name=c;note=x");
        assert_eq!(attrs.remove("ID").as_deref(), Some("a"));
        assert!(!attrs.contains("ID"));
    }

    #[test]
    fn test_style_from_path() {
        assert_eq!(AttributeStyle::from_path("a/genes.gtf.gz"), AttributeStyle::Gtf);
        assert_eq!(AttributeStyle::from_path("genes.gff3"), AttributeStyle::Gff3);
    }
}
