//! Download every file linked from an HTML download table

use crate::bounded::{run_bounded, FetchSummary};
use crate::error::{FetchError, Result};
use indicatif::ProgressBar;
use reqwest::Client;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Links inside the download table of the page
pub const LINK_SELECTOR: &str = "table.table-hover a[href]";

const RETRY_DELAY_SECS: u64 = 2;

/// Absolute URLs of the table links, in page order without duplicates
pub fn collect_links(html: &str, base: &Url, selector: &str) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(selector)
        .map_err(|e| FetchError::invalid_input(format!("bad selector '{selector}': {e}")))?;

    let mut links: Vec<Url> = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let url = base.join(href)?;
        if !links.contains(&url) {
            links.push(url);
        }
    }
    Ok(links)
}

/// Local file name of a link: the last path segment
pub fn file_name(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
}

/// `<target>.part`, where a download lands until it is complete
pub fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

pub struct Scraper {
    client: Client,
    retries: u32,
}

impl Scraper {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bwr/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, retries })
    }

    pub async fn page(&self, url: &Url) -> Result<String> {
        Ok(self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    async fn fetch_to(&self, url: &Url, target: &Path) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = async {
                let response = self.client.get(url.clone()).send().await?.error_for_status()?;
                response.bytes().await
            }
            .await;
            match result {
                Ok(body) => {
                    // an interrupted run leaves only the `.part` behind
                    let part = part_path(target);
                    tokio::fs::write(&part, &body).await?;
                    tokio::fs::rename(&part, target).await?;
                    debug!(url = %url, bytes = body.len(), "Downloaded");
                    return Ok(());
                },
                Err(e) if attempt <= self.retries => {
                    debug!(url = %url, attempt, error = %e, "Download failed, retrying");
                    tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS * attempt as u64)).await;
                },
                Err(e) => {
                    return Err(FetchError::RetriesExhausted {
                        what: url.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    })
                },
            }
        }
    }

    /// Download the linked files of `page_url` missing from `out_dir`
    pub async fn download_linked(
        &self,
        page_url: &Url,
        out_dir: &Path,
        width: usize,
        progress: Option<&ProgressBar>,
    ) -> Result<FetchSummary> {
        std::fs::create_dir_all(out_dir)?;
        let html = self.page(page_url).await?;
        let links = collect_links(&html, page_url, LINK_SELECTOR)?;

        let mut todo: Vec<(Url, PathBuf)> = Vec::new();
        for link in links {
            let Some(name) = file_name(&link) else {
                continue;
            };
            let target = out_dir.join(name);
            if target.exists() {
                info!(file = name, "File exists, skip download");
            } else {
                todo.push((link, target));
            }
        }

        if todo.is_empty() {
            info!("All files are downloaded");
            return Ok(FetchSummary::default());
        }
        info!(files = todo.len(), "Downloading linked files");
        if let Some(pb) = progress {
            pb.set_length(todo.len() as u64);
        }
        let results = run_bounded(todo, width, progress, |(url, target)| async move {
            self.fetch_to(&url, &target).await
        })
        .await;
        Ok(FetchSummary::from_results(&results))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
        <a href="/elsewhere.txt">not in table</a>
        <table class="table table-hover">
          <tr><td><a href="files/a.fa">a</a></td></tr>
          <tr><td><a href="files/b.fa">b</a></td><td><a>no href</a></td></tr>
          <tr><td><a href="files/a.fa">again</a></td></tr>
        </table></body></html>"#;

    #[test]
    fn test_collect_links_resolves_table_hrefs() {
        let base = Url::parse("http://example.org/download.php").unwrap();
        let links = collect_links(PAGE, &base, LINK_SELECTOR).unwrap();
        let links: Vec<&str> = links.iter().map(Url::as_str).collect();
        assert_eq!(links, vec!["http://example.org/files/a.fa", "http://example.org/files/b.fa"]);
    }

    #[test]
    fn test_file_name() {
        let url = Url::parse("http://example.org/files/b.fa").unwrap();
        assert_eq!(file_name(&url), Some("b.fa"));
        let dir = Url::parse("http://example.org/files/").unwrap();
        assert_eq!(file_name(&dir), None);
    }

    #[tokio::test]
    async fn test_download_skips_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/b.fa"))
            .respond_with(ResponseTemplate::new(200).set_body_string(">b\nACGT\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.fa"), ">a\nA\n").unwrap();
        // leftover of an interrupted run
        std::fs::write(dir.path().join("b.fa.part"), ">b\nAC").unwrap();

        let scraper = Scraper::new(Duration::from_secs(5), 0).unwrap();
        let page = Url::parse(&format!("{}/download.php", server.uri())).unwrap();
        let summary = scraper.download_linked(&page, dir.path(), 2, None).await.unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("b.fa")).unwrap(), ">b\nACGT\n");
        assert!(!dir.path().join("b.fa.part").exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/b.fa"))
            .respond_with(ResponseTemplate::new(200).set_body_string(">b\nACGT\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/a.fa"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let scraper = Scraper::new(Duration::from_secs(5), 0).unwrap();
        let page = Url::parse(&format!("{}/download.php", server.uri())).unwrap();
        let summary = scraper.download_linked(&page, dir.path(), 2, None).await.unwrap();

        assert_eq!((summary.succeeded, summary.failed), (1, 1));
        assert!(!dir.path().join("a.fa").exists());
        assert!(dir.path().join("b.fa").is_file());
    }

    #[test]
    fn test_part_path() {
        assert_eq!(part_path(Path::new("/data/nt.fa.gz")), PathBuf::from("/data/nt.fa.gz.part"));
    }
}
