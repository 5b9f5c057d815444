//! Protein ids -> Ensembl gene ids -> genomic sequences
//!
//! Ids are looked up one at a time through the Ensembl Plants site search,
//! with a pause after every search. Each resolved id is appended to
//! `id.map.txt` straight away, so an interrupted run picks up where it
//! stopped. Ids whose search or sequence download failed stay out of the map
//! and are listed in `failed.id.txt`; the next run tries them again.

use crate::ensembl::EnsemblClient;
use crate::error::{FetchError, Result};
use crate::scrape::Scraper;
use bwr_formats::fasta::records;
use bwr_formats::table::{read_pairs, Table};
use indicatif::ProgressBar;
use scraper::{Html, Selector};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const PLANTS_SITE: &str = "https://plants.ensembl.org";
pub const ID_MAP: &str = "id.map.txt";
pub const FAILED_IDS: &str = "failed.id.txt";
pub const SEQUENCE_FILE: &str = "ensembl.genomic.seq.fa";

/// Recorded for ids the search has no hit for
pub const NOT_FOUND: &str = "Not_found";

const RESULT_SELECTOR: &str = "div.searchresults a";

/// Site search page for one query id
pub fn search_url(site: &Url, query: &str) -> Result<Url> {
    Ok(site.join(&format!(
        "/Multi/Search/Results?species=all;idx=;q={query};site=ensemblunit"
    ))?)
}

/// Text of the first result link, if the search found anything
pub fn first_search_hit(html: &str) -> Result<Option<String>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(RESULT_SELECTOR)
        .map_err(|e| FetchError::invalid_input(format!("bad selector '{RESULT_SELECTOR}': {e}")))?;
    Ok(document
        .select(&selector)
        .next()
        .map(|link| link.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty()))
}

/// Known query -> gene pairs from a table whose first column is the query
/// and whose `ensembl_id` column holds the gene id as its last word
pub fn read_name_map(path: &Path) -> Result<HashMap<String, String>> {
    let table = Table::read(path)?;
    let col = table.column_index("ensembl_id")?;
    Ok((0..table.len())
        .filter_map(|row| {
            let gene = table.cell(row, col).split_whitespace().next_back()?;
            Some((table.cell(row, 0).to_string(), gene.to_string()))
        })
        .filter(|(query, _)| !query.is_empty())
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProteinSeqSummary {
    pub resolved: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Already in the id map from an earlier run
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ProteinSeqOutputs {
    pub id_map: PathBuf,
    pub failed_ids: PathBuf,
    pub sequences: PathBuf,
    pub summary: ProteinSeqSummary,
}

enum Lookup {
    Found { gene: String, fasta: String },
    NotFound,
    /// Id to list in `failed.id.txt`: the gene when the search found one
    Failed(String),
}

pub struct ProteinSeqJob<'a> {
    pub client: &'a EnsemblClient,
    pub search: &'a Scraper,
    pub site: Url,
    pub name_map: HashMap<String, String>,
    /// Wait after every site search
    pub pause: Duration,
}

impl ProteinSeqJob<'_> {
    async fn sequence(&self, gene: &str) -> Option<String> {
        match self.client.genomic_sequence(gene).await {
            Ok(fasta) => fasta.filter(|text| !text.trim().is_empty()),
            Err(e) => {
                warn!(gene, error = %e, "Sequence download failed");
                None
            },
        }
    }

    async fn search(&self, query: &str) -> Result<Option<String>> {
        let page = self.search.page(&search_url(&self.site, query)?).await;
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
        first_search_hit(&page?)
    }

    async fn lookup(&self, query: &str) -> Result<Lookup> {
        if let Some(gene) = self.name_map.get(query) {
            if let Some(fasta) = self.sequence(gene).await {
                return Ok(Lookup::Found {
                    gene: gene.clone(),
                    fasta,
                });
            }
            debug!(query, gene = %gene, "Mapped gene has no sequence, searching");
        }
        let gene = match self.search(query).await {
            Ok(Some(gene)) => gene,
            Ok(None) => return Ok(Lookup::NotFound),
            Err(e) => {
                warn!(query, error = %e, "Site search failed");
                return Ok(Lookup::Failed(query.to_string()));
            },
        };
        Ok(match self.sequence(&gene).await {
            Some(fasta) => Lookup::Found { gene, fasta },
            None => Lookup::Failed(gene),
        })
    }

    /// Resolve every id of `ids` not yet in `<out>/id.map.txt` and append the
    /// genomic sequence of each new gene to `<out>/ensembl.genomic.seq.fa`
    pub async fn run(&self, ids: &[String], out_dir: &Path, progress: Option<&ProgressBar>) -> Result<ProteinSeqOutputs> {
        std::fs::create_dir_all(out_dir)?;
        let id_map = out_dir.join(ID_MAP);
        let failed_path = out_dir.join(FAILED_IDS);
        let sequences = out_dir.join(SEQUENCE_FILE);

        let mut mapped: HashSet<String> = HashSet::new();
        if id_map.is_file() {
            mapped.extend(read_pairs(&id_map)?.into_iter().map(|(query, _)| query));
        }
        let mut present: HashSet<String> = HashSet::new();
        if sequences.is_file() {
            for record in records(&sequences)? {
                present.insert(record?.id().to_string());
            }
        }
        let mut failed: BTreeSet<String> = BTreeSet::new();
        if failed_path.is_file() {
            failed.extend(
                std::fs::read_to_string(&failed_path)?
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }

        let mut summary = ProteinSeqSummary::default();
        let mut queue = Vec::new();
        for id in ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            if mapped.contains(id) {
                summary.skipped += 1;
            } else if !queue.contains(&id) {
                queue.push(id);
            }
        }
        info!(ids = queue.len(), skipped = summary.skipped, "Resolving protein ids");
        if let Some(pb) = progress {
            pb.set_length(queue.len() as u64);
        }

        for query in queue {
            let gene = match self.lookup(query).await? {
                Lookup::Found { gene, fasta } => {
                    if present.insert(gene.clone()) {
                        append(&sequences, &fasta)?;
                    }
                    failed.remove(query);
                    failed.remove(&gene);
                    summary.resolved += 1;
                    gene
                },
                Lookup::NotFound => {
                    summary.not_found += 1;
                    NOT_FOUND.to_string()
                },
                Lookup::Failed(what) => {
                    failed.insert(what);
                    summary.failed += 1;
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                    continue;
                },
            };
            append(&id_map, &format!("{query}\t{gene}\n"))?;
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }

        let mut out = std::fs::File::create(&failed_path)?;
        for id in &failed {
            writeln!(out, "{id}")?;
        }
        if summary.failed > 0 {
            warn!(failed = summary.failed, path = %failed_path.display(), "Some ids failed, rerun to retry them");
        }

        Ok(ProteinSeqOutputs {
            id_map,
            failed_ids: failed_path,
            sequences,
            summary,
        })
    }
}

fn append(path: &Path, text: &str) -> Result<()> {
    let mut out = OpenOptions::new().create(true).append(true).open(path)?;
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::rest::RestConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn results_page(gene: Option<&str>) -> String {
        match gene {
            Some(gene) => format!(
                "<html><body><div class=\"searchresults\"><div class=\"row\">\
                 <a href=\"/Oryza_sativa/Gene/Summary?g={gene}\">{gene}</a></div></div></body></html>"
            ),
            None => "<html><body><p>Your search returned no results</p></body></html>".to_string(),
        }
    }

    async fn search_returns(server: &MockServer, query: &str, template: ResponseTemplate, times: u64) {
        Mock::given(method("GET"))
            .and(path("/Multi/Search/Results"))
            .and(query_param("species", format!("all;idx=;q={query};site=ensemblunit")))
            .respond_with(template)
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn test_first_search_hit() {
        assert_eq!(first_search_hit(&results_page(Some("Os01g0100100"))).unwrap().as_deref(), Some("Os01g0100100"));
        assert_eq!(first_search_hit(&results_page(None)).unwrap(), None);
    }

    #[test]
    fn test_search_url_keeps_query_layout() {
        let url = search_url(&Url::parse(PLANTS_SITE).unwrap(), "XP_015636960.1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://plants.ensembl.org/Multi/Search/Results?species=all;idx=;q=XP_015636960.1;site=ensemblunit"
        );
    }

    #[test]
    fn test_read_name_map_takes_last_word() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.txt");
        std::fs::write(&path, "protein\tensembl_id\nP1\tgene:Os01g0100100\nP2\t\nP3\tOs ignored Os03g0100100\n").unwrap();
        let map = read_name_map(&path).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["P1"], "gene:Os01g0100100");
        assert_eq!(map["P3"], "Os03g0100100");
    }

    #[tokio::test]
    async fn test_run_resolves_records_and_retries_failures() {
        let server = MockServer::start().await;
        search_returns(&server, "P1", ResponseTemplate::new(200).set_body_string(results_page(Some("Os01g0100100"))), 1).await;
        search_returns(&server, "P2", ResponseTemplate::new(200).set_body_string(results_page(None)), 1).await;
        // P3 is searched on both runs: its gene has no sequence
        search_returns(&server, "P3", ResponseTemplate::new(200).set_body_string(results_page(Some("Os09g0999999"))), 2).await;
        Mock::given(method("GET"))
            .and(path("/sequence/id/Os01g0100100"))
            .respond_with(ResponseTemplate::new(200).set_body_string(">Os01g0100100\nACGT\n"))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sequence/id/Os09g0999999"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let config = RestConfig {
            reqs_per_sec: 100,
            retries: 0,
            timeout: Duration::from_secs(5),
        };
        let client = EnsemblClient::new(&server.uri(), config).unwrap();
        let search = Scraper::new(Duration::from_secs(5), 0).unwrap();
        let job = ProteinSeqJob {
            client: &client,
            search: &search,
            site: Url::parse(&server.uri()).unwrap(),
            // P4 skips the search and shares P1's gene
            name_map: HashMap::from([("P4".to_string(), "Os01g0100100".to_string())]),
            pause: Duration::ZERO,
        };
        let ids: Vec<String> = ["P1", "P2", "P3", "P4", "P1", ""].iter().map(|s| s.to_string()).collect();
        let dir = tempfile::tempdir().unwrap();

        let first = job.run(&ids, dir.path(), None).await.unwrap();
        assert_eq!(
            first.summary,
            ProteinSeqSummary {
                resolved: 2,
                not_found: 1,
                failed: 1,
                skipped: 0
            }
        );
        assert_eq!(
            std::fs::read_to_string(&first.id_map).unwrap(),
            "P1\tOs01g0100100\nP2\tNot_found\nP4\tOs01g0100100\n"
        );
        assert_eq!(std::fs::read_to_string(&first.sequences).unwrap(), ">Os01g0100100\nACGT\n");
        assert_eq!(std::fs::read_to_string(&first.failed_ids).unwrap(), "Os09g0999999\n");

        let second = job.run(&ids, dir.path(), None).await.unwrap();
        assert_eq!(second.summary.skipped, 4);
        assert_eq!(second.summary.failed, 1);
        assert_eq!(std::fs::read_to_string(&second.sequences).unwrap(), ">Os01g0100100\nACGT\n");
    }
}
