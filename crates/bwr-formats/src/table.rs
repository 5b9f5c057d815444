//! Tab-separated tables
//!
//! A [`Table`] is a header row plus string cells; numeric interpretation is
//! left to the callers that know what a column means.

use bwr_common::{BwrError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use crate::io::open_text;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Read a tab-separated file whose first line is the header
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_reader(open_text(path)?, true)
    }

    /// Read a tab-separated file without header; columns are named `0`, `1`, ...
    pub fn read_headerless(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_reader(open_text(path)?, false)
    }

    pub fn from_reader<R: Read>(reader: R, has_headers: bool) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(has_headers)
            .flexible(true)
            .quoting(false)
            .comment(None)
            .from_reader(reader);

        let mut headers: Vec<String> = if has_headers {
            csv_reader.headers()?.iter().map(str::to_string).collect()
        } else {
            Vec::new()
        };

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            if record.len() == 1 && record.get(0).is_some_and(|c| c.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if !has_headers {
            let width = rows.iter().map(Vec::len).max().unwrap_or(0);
            headers = (0..width).map(|i| i.to_string()).collect();
        }

        Ok(Self { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| BwrError::missing_column(name))
    }

    /// Cell by row and column index; short rows read as empty
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(name)?;
        Ok((0..self.rows.len()).map(|row| self.cell(row, idx)).collect())
    }

    pub fn push_row<S: Into<String>>(&mut self, row: impl IntoIterator<Item = S>) {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Map the values of one column to another; later rows win on duplicate keys
    pub fn to_map(&self, key: &str, value: &str) -> Result<HashMap<String, String>> {
        let key_idx = self.column_index(key)?;
        let value_idx = self.column_index(value)?;
        Ok((0..self.rows.len())
            .map(|row| {
                (
                    self.cell(row, key_idx).to_string(),
                    self.cell(row, value_idx).to_string(),
                )
            })
            .collect())
    }

    pub fn write_to<W: Write>(&self, out: W, include_header: bool) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .flexible(true)
            .from_writer(out);
        if include_header {
            writer.write_record(&self.headers)?;
        }
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to(crate::io::create_text(path)?, true)
    }
}

/// Stack tables, aligning columns by name; the header is the union of all
/// headers in first-seen order and missing cells are empty
pub fn concat(tables: impl IntoIterator<Item = Table>) -> Table {
    let tables: Vec<Table> = tables.into_iter().collect();
    let mut headers: Vec<String> = Vec::new();
    for table in &tables {
        for header in &table.headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
    }
    let mut out = Table::new(headers.clone());
    for table in &tables {
        let positions: Vec<Option<usize>> = headers
            .iter()
            .map(|h| table.headers.iter().position(|x| x == h))
            .collect();
        for row in 0..table.len() {
            out.rows.push(
                positions
                    .iter()
                    .map(|pos| pos.map(|col| table.cell(row, col).to_string()).unwrap_or_default())
                    .collect(),
            );
        }
    }
    out
}

/// Replace the values of one column through a lookup; unmapped values stay
pub fn replace_column_values(
    table: &mut Table,
    column: &str,
    map: &HashMap<String, String>,
) -> Result<usize> {
    let idx = table.column_index(column)?;
    let mut replaced = 0;
    for row in &mut table.rows {
        if let Some(cell) = row.get_mut(idx) {
            if let Some(new) = map.get(cell.as_str()) {
                *cell = new.clone();
                replaced += 1;
            }
        }
    }
    Ok(replaced)
}

/// Read a two-column headerless file into `(first, second)` pairs
pub fn read_pairs(path: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let table = Table::read_headerless(path)?;
    Ok((0..table.len())
        .map(|row| (table.cell(row, 0).to_string(), table.cell(row, 1).to_string()))
        .filter(|(first, _)| !first.is_empty())
        .collect())
}

/// Options for [`collapse`]
#[derive(Debug, Clone)]
pub struct CollapseOptions<'a> {
    /// Separator placed between unique values
    pub sep: &'a str,
    /// Written when a group has no values for a column; empty cell when `None`
    pub empty_rep: Option<&'a str>,
    /// Placeholder value dropped before joining (e.g. `--`)
    pub ignore: Option<&'a str>,
}

impl Default for CollapseOptions<'_> {
    fn default() -> Self {
        Self {
            sep: ",",
            empty_rep: None,
            ignore: None,
        }
    }
}

/// Condense rows sharing a key into one row.
///
/// For every other column the unique non-empty values are joined in
/// first-seen order. Output rows are sorted by key.
pub fn collapse(table: &Table, by: &str, options: &CollapseOptions<'_>) -> Result<Table> {
    let key_idx = table.column_index(by)?;
    let value_cols: Vec<usize> = (0..table.headers.len()).filter(|&i| i != key_idx).collect();

    let mut groups: BTreeMap<&str, Vec<(Vec<&str>, HashSet<&str>)>> = BTreeMap::new();
    for row in 0..table.len() {
        let key = table.cell(row, key_idx);
        let slots = groups
            .entry(key)
            .or_insert_with(|| vec![(Vec::new(), HashSet::new()); value_cols.len()]);
        for (slot, &col) in slots.iter_mut().zip(&value_cols) {
            let value = table.cell(row, col);
            if value.is_empty() || Some(value) == options.ignore {
                continue;
            }
            if slot.1.insert(value) {
                slot.0.push(value);
            }
        }
    }

    let mut headers = vec![table.headers[key_idx].clone()];
    headers.extend(value_cols.iter().map(|&i| table.headers[i].clone()));
    let mut out = Table::new(headers);

    for (key, slots) in groups {
        let mut row = vec![key.to_string()];
        for (values, _) in slots {
            if values.is_empty() {
                row.push(options.empty_rep.unwrap_or("").to_string());
            } else {
                row.push(values.join(options.sep));
            }
        }
        out.rows.push(row);
    }

    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn gene_des() -> Table {
        let text = "gene_id\tgo_id\tdescription\n\
                    g2\tGO:1\tkinase\n\
                    g1\tGO:2\t--\n\
                    g1\tGO:3\t--\n\
                    g1\tGO:2\t\n\
                    g2\tGO:1\tkinase\n";
        Table::from_reader(Cursor::new(text), true).unwrap()
    }

    #[test]
    fn test_collapse_joins_unique_values_sorted_by_key() {
        let out = collapse(
            &gene_des(),
            "gene_id",
            &CollapseOptions {
                sep: ",",
                empty_rep: Some("--"),
                ignore: Some("--"),
            },
        )
        .unwrap();

        assert_eq!(out.headers, vec!["gene_id", "go_id", "description"]);
        assert_eq!(out.rows[0], vec!["g1", "GO:2,GO:3", "--"]);
        assert_eq!(out.rows[1], vec!["g2", "GO:1", "kinase"]);
    }

    #[test]
    fn test_collapse_by_missing_column() {
        let err = collapse(&gene_des(), "transcript_id", &CollapseOptions::default()).unwrap_err();
        assert!(matches!(err, BwrError::MissingColumn(_)));
    }

    #[test]
    fn test_replace_column_values() {
        let mut table = gene_des();
        let map: HashMap<String, String> = [("g1".to_string(), "GENE1".to_string())].into_iter().collect();
        assert_eq!(replace_column_values(&mut table, "gene_id", &map).unwrap(), 3);
        assert_eq!(table.cell(1, 0), "GENE1");
        assert_eq!(table.cell(0, 0), "g2");
    }

    #[test]
    fn test_concat_aligns_columns() {
        let mut a = Table::new(["uniprot_id", "gene_names"]);
        a.push_row(["P1", "abc"]);
        let mut b = Table::new(["uniprot_id", "pfam_ids"]);
        b.push_row(["P2", "PF00069"]);
        let out = concat([a, b]);
        assert_eq!(out.headers, vec!["uniprot_id", "gene_names", "pfam_ids"]);
        assert_eq!(out.rows[1], vec!["P2", "", "PF00069"]);
    }

    #[test]
    fn test_headerless_names_columns_by_index() {
        let table = Table::from_reader(Cursor::new("a\t1\nb\t2\t3\n"), false).unwrap();
        assert_eq!(table.headers, vec!["0", "1", "2"]);
        assert_eq!(table.cell(0, 2), "");
        assert_eq!(table.cell(1, 2), "3");
    }

    #[test]
    fn test_write_round_trip() {
        let mut buf = Vec::new();
        gene_des().write_to(&mut buf, true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("gene_id\tgo_id\tdescription\ng2\tGO:1\tkinase\n"));
    }
}
