//! Ensembl and Ensembl Genomes REST endpoints

use crate::error::{FetchError, Result};
use crate::rest::{RestClient, RestConfig, FASTA};
use serde::Deserialize;
use std::fmt;
use tracing::info;

pub const ENSEMBL_REST: &str = "https://rest.ensembl.org";
pub const ENSEMBL_GENOMES_REST: &str = "https://rest.ensemblgenomes.org";

/// Default orthologue target taxon (Oryza sativa)
pub const DEFAULT_TARGET_TAXON: u32 = 4565;

/// Which Ensembl site serves a species; the name doubles as the UniProt
/// cross-reference database prefix (`Ensembl:<id>`, `EnsemblPlants:<id>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Division {
    Ensembl,
    EnsemblPlants,
}

impl Division {
    pub fn as_str(&self) -> &'static str {
        match self {
            Division::Ensembl => "Ensembl",
            Division::EnsemblPlants => "EnsemblPlants",
        }
    }

    pub fn server(&self) -> &'static str {
        match self {
            Division::Ensembl => ENSEMBL_REST,
            Division::EnsemblPlants => ENSEMBL_GENOMES_REST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Xref {
    pub id: String,
    #[serde(default)]
    pub primary_id: Option<String>,
    #[serde(default)]
    pub dbname: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Variant {
    pub id: String,
    pub seq_region_name: String,
    pub start: u64,
    pub end: u64,
    pub strand: i8,
    #[serde(default)]
    pub consequence_type: String,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{} ==> {} ({})",
            self.seq_region_name, self.start, self.end, self.strand, self.id, self.consequence_type
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
struct HomologyMember {
    id: String,
    perc_id: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct Homology {
    source: HomologyMember,
    target: HomologyMember,
}

#[derive(Debug, Clone, Deserialize)]
struct HomologyData {
    #[serde(default)]
    homologies: Vec<Homology>,
}

#[derive(Debug, Clone, Deserialize)]
struct HomologyResponse {
    #[serde(default)]
    data: Vec<HomologyData>,
}

/// One orthologue of a query gene
#[derive(Debug, Clone, PartialEq)]
pub struct Orthologue {
    pub target_id: String,
    pub target_percent: f64,
    pub query_percent: f64,
}

pub struct EnsemblClient {
    rest: RestClient,
}

impl EnsemblClient {
    pub fn new(server: &str, config: RestConfig) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(server, config)?,
        })
    }

    pub fn for_division(division: Division, config: RestConfig) -> Result<Self> {
        Self::new(division.server(), config)
    }

    /// Gene xrefs for a symbol, then the variants overlapping the first gene
    pub async fn symbol_variants(&self, species: &str, symbol: &str) -> Result<Option<Vec<Variant>>> {
        let genes: Option<Vec<Xref>> = self
            .rest
            .get_json(
                &format!("/xrefs/symbol/{species}/{symbol}"),
                &[("object_type", "gene".to_string())],
            )
            .await?;
        let Some(gene) = genes.and_then(|g| g.into_iter().next()) else {
            return Ok(None);
        };
        info!(species, symbol, gene = %gene.id, "Resolved symbol");
        self.rest
            .get_json(
                &format!("/overlap/id/{}", gene.id),
                &[("feature", "variation".to_string())],
            )
            .await
    }

    /// Orthologues in `taxon`; `None` when the request failed
    pub async fn orthologues(&self, id: &str, taxon: u32) -> Result<Option<Vec<Orthologue>>> {
        let response: Option<HomologyResponse> = self
            .rest
            .get_json(
                &format!("/homology/id/{id}"),
                &[
                    ("type", "orthologues".to_string()),
                    ("target_taxon", taxon.to_string()),
                ],
            )
            .await?;
        Ok(response.map(|r| {
            r.data
                .into_iter()
                .next()
                .map(|d| d.homologies)
                .unwrap_or_default()
                .into_iter()
                .map(|h| Orthologue {
                    target_id: h.target.id,
                    target_percent: h.target.perc_id,
                    query_percent: h.source.perc_id,
                })
                .collect()
        }))
    }

    /// Genomic sequence as FASTA text
    pub async fn genomic_sequence(&self, id: &str) -> Result<Option<String>> {
        self.rest
            .get_text(
                &format!("/sequence/id/{id}"),
                &[("type", "genomic".to_string())],
                FASTA,
            )
            .await
    }

    pub async fn uniprot_xrefs(&self, id: &str) -> Result<Option<Vec<Xref>>> {
        self.rest
            .get_json(
                &format!("/xrefs/id/{id}"),
                &[("external_db", "Uniprot_gn".to_string())],
            )
            .await
    }

    /// `true` when `/info/assembly/<species>` answers on this server
    pub async fn has_species(&self, species: &str) -> Result<bool> {
        let found: Option<serde_json::Value> = self
            .rest
            .get_json(&format!("/info/assembly/{species}"), &[])
            .await?;
        Ok(found.is_some())
    }
}

/// Try Ensembl, then Ensembl Genomes
pub async fn detect_division(species: &str, config: &RestConfig) -> Result<Division> {
    let servers = [
        (Division::Ensembl, ENSEMBL_REST),
        (Division::EnsemblPlants, ENSEMBL_GENOMES_REST),
    ];
    detect_division_on(species, config, &servers).await
}

pub async fn detect_division_on(species: &str, config: &RestConfig, servers: &[(Division, &str)]) -> Result<Division> {
    for (division, server) in servers {
        let client = EnsemblClient::new(server, config.clone())?;
        if client.has_species(species).await? {
            info!(species, division = division.as_str(), "Detected Ensembl division");
            return Ok(*division);
        }
    }
    Err(FetchError::not_found(format!("{species} in Ensembl")))
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
    async fn test_orthologues_parse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/homology/id/AT1G01010"))
            .and(query_param("type", "orthologues"))
            .and(query_param("target_taxon", "4565"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"homologies": [
                    {"source": {"id": "AT1G01010", "perc_id": 71.5},
                     "target": {"id": "TraesCS1A02G000100", "perc_id": 65.2}}
                ]}]
            })))
            .mount(&server)
            .await;

        let client = EnsemblClient::new(&server.uri(), config()).unwrap();
        let orthologues = client.orthologues("AT1G01010", DEFAULT_TARGET_TAXON).await.unwrap().unwrap();
        assert_eq!(
            orthologues,
            vec![Orthologue {
                target_id: "TraesCS1A02G000100".to_string(),
                target_percent: 65.2,
                query_percent: 71.5,
            }]
        );
    }

    #[tokio::test]
    async fn test_symbol_variants() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrefs/symbol/human/BRAF"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": "ENSG00000157764"}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/overlap/id/ENSG00000157764"))
            .and(query_param("feature", "variation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": "rs1", "seq_region_name": "7", "start": 10, "end": 10,
                "strand": 1, "consequence_type": "intron_variant"
            }])))
            .mount(&server)
            .await;

        let client = EnsemblClient::new(&server.uri(), config()).unwrap();
        let variants = client.symbol_variants("human", "BRAF").await.unwrap().unwrap();
        assert_eq!(variants[0].to_string(), "7:10-10:1 ==> rs1 (intron_variant)");
    }

    #[tokio::test]
    async fn test_detect_division_falls_through() {
        let ensembl = MockServer::start().await;
        let plants = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info/assembly/oryza_sativa"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&ensembl)
            .await;
        Mock::given(method("GET"))
            .and(path("/info/assembly/oryza_sativa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"assembly_name": "IRGSP-1.0"})))
            .mount(&plants)
            .await;

        let servers = [
            (Division::Ensembl, ensembl.uri()),
            (Division::EnsemblPlants, plants.uri()),
        ];
        let servers: Vec<(Division, &str)> = servers.iter().map(|(d, s)| (*d, s.as_str())).collect();
        let division = detect_division_on("oryza_sativa", &config(), &servers).await.unwrap();
        assert_eq!(division, Division::EnsemblPlants);
    }
}
