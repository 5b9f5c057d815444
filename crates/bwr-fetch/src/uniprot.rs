//! EMBL-EBI Proteins API and QuickGO

use crate::error::Result;
use crate::rest::{RestClient, RestConfig};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const EBI_SERVER: &str = "https://www.ebi.ac.uk";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: u32,
    pub current: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAnnotation {
    #[serde(default)]
    pub go_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAnnotationPage {
    #[serde(default)]
    pub results: Vec<GoAnnotation>,
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoTerm {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aspect: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GoTermSearch {
    #[serde(default)]
    results: Vec<GoTerm>,
}

pub struct UniprotClient {
    rest: RestClient,
}

impl UniprotClient {
    pub fn new(server: &str, config: RestConfig) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(server, config)?,
        })
    }

    /// All UniProt entries cross-referenced by a gene (`Ensembl:<id>`)
    pub async fn gene_entries(&self, gene: &str) -> Result<Option<Vec<Value>>> {
        self.rest
            .get_json(
                &format!("/proteins/api/proteins/{gene}"),
                &[("size", "-1".to_string())],
            )
            .await
    }

    pub async fn protein(&self, accession: &str) -> Result<Option<Value>> {
        self.rest
            .get_json(&format!("/proteins/api/proteins/{accession}"), &[])
            .await
    }

    pub async fn go_annotations(&self, accession: &str, page: u32) -> Result<Option<GoAnnotationPage>> {
        self.rest
            .get_json(
                "/QuickGO/services/annotation/search",
                &[
                    ("geneProductType", "protein".to_string()),
                    ("geneProductId", accession.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await
    }

    /// GO ids over every QuickGO page; `None` when any page failed
    pub async fn all_go_ids(&self, accession: &str) -> Result<Option<Vec<String>>> {
        let mut ids = Vec::new();
        let mut page = 1;
        loop {
            let Some(found) = self.go_annotations(accession, page).await? else {
                return Ok(None);
            };
            ids.extend(found.results.into_iter().filter_map(|a| a.go_id));
            debug!(accession, page, total = found.page_info.total, "Fetched GO page");
            if found.page_info.current >= found.page_info.total {
                return Ok(Some(ids));
            }
            page = found.page_info.current + 1;
        }
    }

    /// Term name and aspect of one GO id
    pub async fn go_term(&self, go_id: &str) -> Result<Option<Option<GoTerm>>> {
        let search: Option<GoTermSearch> = self
            .rest
            .get_json(
                "/QuickGO/services/ontology/go/search",
                &[("query", go_id.to_string())],
            )
            .await?;
        Ok(search.map(|s| s.results.into_iter().find(|t| t.id == go_id)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> RestConfig {
        RestConfig {
            reqs_per_sec: 100,
            retries: 0,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_all_go_ids_follows_pages() {
        let server = MockServer::start().await;
        for page in 1..=2u32 {
            Mock::given(method("GET"))
                .and(path("/QuickGO/services/annotation/search"))
                .and(query_param("geneProductId", "P12345"))
                .and(query_param("page", page.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "results": [{"goId": format!("GO:000000{page}")}, {"other": 1}],
                    "pageInfo": {"total": 2, "current": page}
                })))
                .mount(&server)
                .await;
        }

        let client = UniprotClient::new(&server.uri(), config()).unwrap();
        let ids = client.all_go_ids("P12345").await.unwrap().unwrap();
        assert_eq!(ids, vec!["GO:0000001", "GO:0000002"]);
    }

    #[tokio::test]
    async fn test_go_term_picks_exact_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/QuickGO/services/ontology/go/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"id": "GO:0008152", "name": "metabolic process", "aspect": "biological_process"},
                    {"id": "GO:0008150", "name": "biological_process", "aspect": "biological_process"}
                ]
            })))
            .mount(&server)
            .await;

        let client = UniprotClient::new(&server.uri(), config()).unwrap();
        let term = client.go_term("GO:0008150").await.unwrap().unwrap().unwrap();
        assert_eq!(term.name, "biological_process");
    }
}
