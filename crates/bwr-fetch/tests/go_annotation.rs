//! GO annotation of a BLAST-against-UniProt table, end to end on a mock server

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bwr_fetch::annotation::GoPipeline;
use bwr_fetch::rest::RestConfig;
use bwr_fetch::uniprot::UniprotClient;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_ebi() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proteins/api/proteins/P12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accession": "P12345",
            "gene": [{"name": {"value": "KIN1"}}],
            "protein": {"recommendedName": {"fullName": {"value": "Kinase 1"}}},
            "proteinExistence": "Evidence at protein level",
            "dbReferences": [{"type": "Pfam", "id": "PF00069", "properties": {"entry name": "Pkinase"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/QuickGO/services/annotation/search"))
        .and(query_param("geneProductId", "P12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"goId": "GO:0004672"}, {"goId": "GO:0004672"}],
            "pageInfo": {"total": 1, "current": 1}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/QuickGO/services/ontology/go/search"))
        .and(query_param("query", "GO:0004672"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"id": "GO:0004672", "name": "protein kinase activity", "aspect": "molecular_function"}]
        })))
        .mount(&server)
        .await;
    server
}

fn pipeline(server: &MockServer) -> GoPipeline {
    let config = RestConfig {
        reqs_per_sec: 100,
        retries: 0,
        timeout: Duration::from_secs(5),
    };
    GoPipeline {
        client: UniprotClient::new(&server.uri(), config).unwrap(),
        width: 3,
        retries: 0,
    }
}

#[tokio::test]
async fn test_blasttab_annotation_writes_go_and_anno_tables() {
    let server = mock_ebi().await;
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("genes.blasttab");
    std::fs::write(
        &input,
        "g1\tsp|P12345|KIN1_ARATH\t91.2\t300\t10\t2\t1\t300\t1\t300\t1e-50\t500\n\
         g2\tsp|Q99999|UNK_ARATH\t45.0\t120\t40\t3\t1\t120\t5\t125\t1e-5\t80\n",
    )
    .unwrap();

    let outputs = pipeline(&server).run(&input, None, None).await.unwrap();

    let go = std::fs::read_to_string(&outputs.go_file).unwrap();
    assert_eq!(go, "g1\tGO:0004672\n");

    let anno = std::fs::read_to_string(&outputs.anno_file).unwrap();
    let lines: Vec<&str> = anno.lines().collect();
    assert_eq!(
        lines[0],
        "gene_id\tgene_names\tuniprot_id\tprotein_names\tprotein_existence\tgo_id\tgo_term\tpfam_ids\tpfam_names"
    );
    assert_eq!(
        lines[1],
        "g1\tKIN1\tP12345\tKinase 1\tEvidence at protein level\tGO:0004672\tprotein kinase activity\tPF00069\tPkinase"
    );
    assert_eq!(lines[2], "g2\t--\tQ99999\t--\t--\t--\t--\t--\t--");

    // middle files make the second run local
    assert!(dir.path().join("genes.uni_anno.map/P12345.txt").is_file());
    assert!(dir.path().join("genes.uni_go.map").is_file());
    assert!(dir.path().join("genes.go_anno.map").is_file());
    let before = server.received_requests().await.unwrap().len();
    pipeline(&server).run(&input, None, None).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), before);
}

#[tokio::test]
async fn test_gtf_input_needs_division() {
    let server = mock_ebi().await;
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("genes.gtf");
    std::fs::write(&input, "1\tsrc\tgene\t1\t100\t.\t+\t.\tgene_id \"G1\"; gene_biotype \"protein_coding\";\n").unwrap();

    let err = pipeline(&server).run(&input, None, None).await.unwrap_err();
    assert!(err.to_string().contains("species"));
}

#[tokio::test]
async fn test_final_round_error_records_empty_go() {
    let server = mock_ebi().await;
    Mock::given(method("GET"))
        .and(path("/QuickGO/services/annotation/search"))
        .and(query_param("geneProductId", "Q99999"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("genes.blasttab");
    std::fs::write(&input, "g2\tsp|Q99999|UNK_ARATH\t45.0\t120\t40\t3\t1\t120\t5\t125\t1e-5\t80\n").unwrap();

    pipeline(&server).run(&input, None, None).await.unwrap();

    let go_map = std::fs::read_to_string(dir.path().join("genes.uni_go.map")).unwrap();
    assert!(go_map.lines().any(|l| l == "\tQ99999"), "{go_map}");

    // recorded ids are not asked for again
    let before = server.received_requests().await.unwrap().len();
    pipeline(&server).run(&input, None, None).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), before);
}
