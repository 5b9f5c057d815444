//! Rate-limited REST client shared by the Ensembl and UniProt endpoints
//!
//! The client keeps itself under `reqs_per_sec` requests per second, honours
//! `429 Retry-After` and retries transport failures. Any other non-2xx
//! status is logged and surfaces as `Ok(None)` so that batch callers can
//! record the id as failed and move on.

use crate::error::{FetchError, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const JSON: &str = "application/json";
pub const FASTA: &str = "text/x-fasta";

pub const DEFAULT_REQS_PER_SEC: u32 = 15;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound on consecutive `429` waits for one request
const MAX_RATE_LIMITED: u32 = 10;
const RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub reqs_per_sec: u32,
    pub retries: u32,
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            reqs_per_sec: DEFAULT_REQS_PER_SEC,
            retries: crate::ftp::DEFAULT_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug)]
struct RateWindow {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
pub struct RestClient {
    http: Client,
    base: String,
    config: RestConfig,
    window: Mutex<RateWindow>,
}

impl RestClient {
    pub fn new(base: impl Into<String>, config: RestConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("bwr/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            config,
            window: Mutex::new(RateWindow {
                count: 0,
                started: Instant::now(),
            }),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn throttle(&self) {
        let mut window = self.window.lock().await;
        let elapsed = window.started.elapsed();
        if elapsed >= Duration::from_secs(1) {
            window.count = 0;
            window.started = Instant::now();
        } else if window.count >= self.config.reqs_per_sec {
            let wait = Duration::from_secs(1) - elapsed;
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiting ourselves");
            tokio::time::sleep(wait).await;
            window.count = 0;
            window.started = Instant::now();
        }
        window.count += 1;
    }

    /// Send a GET with `mime` as both `Accept` and `Content-Type`
    pub async fn get(&self, endpoint: &str, params: &[(&str, String)], mime: &str) -> Result<Option<Response>> {
        let url = format!("{}{}", self.base, endpoint);
        let attempts = self.config.retries + 1;
        let mut attempt = 0;
        let mut rate_limited = 0;

        loop {
            self.throttle().await;
            let sent = self
                .http
                .get(&url)
                .query(params)
                .header(ACCEPT, mime)
                .header(CONTENT_TYPE, mime)
                .send()
                .await;

            match sent {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    rate_limited += 1;
                    if rate_limited > MAX_RATE_LIMITED {
                        return Err(FetchError::RetriesExhausted {
                            what: format!("GET {endpoint}"),
                            attempts: rate_limited,
                            message: "server kept answering 429".to_string(),
                        });
                    }
                    let wait = retry_after(&response);
                    warn!(endpoint, wait_secs = wait.as_secs_f64(), "Rate limited by server");
                    tokio::time::sleep(wait).await;
                },
                Ok(response) if response.status().is_success() => return Ok(Some(response)),
                Ok(response) => {
                    warn!(endpoint, status = %response.status(), "Request failed");
                    return Ok(None);
                },
                Err(e) => {
                    attempt += 1;
                    let error = FetchError::from(e);
                    if !error.is_transient() || attempt >= attempts {
                        return Err(FetchError::RetriesExhausted {
                            what: format!("GET {endpoint}"),
                            attempts: attempt,
                            message: error.to_string(),
                        });
                    }
                    warn!(endpoint, attempt, attempts, error = %error, "Request error, retrying");
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64)).await;
                },
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Option<T>> {
        match self.get(endpoint, params, JSON).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    pub async fn get_text(&self, endpoint: &str, params: &[(&str, String)], mime: &str) -> Result<Option<String>> {
        match self.get(endpoint, params, mime).await? {
            Some(response) => Ok(Some(response.text().await?)),
            None => Ok(None),
        }
    }
}

fn retry_after(response: &Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, reqs_per_sec: u32) -> RestClient {
        RestClient::new(
            server.uri(),
            RestConfig {
                reqs_per_sec,
                retries: 1,
                timeout: Duration::from_secs(5),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_retry_after_429() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info/ping"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/info/ping"))
            .and(header("Accept", JSON))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ping": 1})))
            .mount(&server)
            .await;

        let value: Option<serde_json::Value> = client(&server, 15).get_json("/info/ping", &[]).await.unwrap();
        assert_eq!(value.unwrap()["ping"], 1);
    }

    #[tokio::test]
    async fn test_error_status_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sequence/id/missing"))
            .and(query_param("type", "genomic"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let text = client(&server, 15)
            .get_text("/sequence/id/missing", &[("type", "genomic".to_string())], FASTA)
            .await
            .unwrap();
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn test_self_rate_limit_spreads_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = client(&server, 2);
        let started = Instant::now();
        for _ in 0..3 {
            client.get_text("/x", &[], "text/plain").await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(900));
    }
}
