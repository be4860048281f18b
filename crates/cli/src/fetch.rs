//! Downloading SDS sheets from manufacturer disclosure pages.

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::{Client, Response, StatusCode, Url, header::CONTENT_TYPE, redirect::Policy};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::retry::RetryPolicy;

static SDS_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s'"]+/pdf/\?productID=\d+"#).unwrap());
static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]").unwrap());
static UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

const ACCEPTED_CONTENT_TYPES: &[&str] = &["application/pdf", "text/html"];

/// All SDS download links in a page, in document order.
pub fn extract_sds_links(html: &str) -> Vec<String> {
    SDS_LINK
        .find_iter(html)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drop repeated URLs, keeping the first occurrence of each.
pub fn dedup_preserving_order(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Only absolute http(s) URLs with a host can be fetched.
pub fn parse_fetchable(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

/// Map a download URL to a safe local `.pdf` file name.
///
/// The lowercased basename has every non `[a-z0-9]` character replaced by
/// `_`, runs collapsed and edges trimmed, and a trailing `_pdf` dropped.
/// URLs without a usable basename fall back to their `productID` query value.
pub fn url_to_file_name(url: &Url) -> String {
    let basename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .to_lowercase();

    let mut safe = sanitize(&basename);
    if let Some(stripped) = safe.strip_suffix("_pdf") {
        safe = stripped.to_string();
    }

    if safe.is_empty() {
        safe = url
            .query_pairs()
            .find(|(key, _)| key.eq_ignore_ascii_case("productid"))
            .map(|(_, value)| sanitize(&format!("product_{}", value.to_lowercase())))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("sds_{}", ingest::hash_bytes(url.as_str().as_bytes())));
    }

    format!("{}.pdf", safe)
}

fn sanitize(raw: &str) -> String {
    let replaced = NON_ALPHANUMERIC.replace_all(raw, "_");
    UNDERSCORES
        .replace_all(&replaced, "_")
        .trim_matches('_')
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Downloaded { url: String, path: PathBuf },
    AlreadyPresent { url: String, path: PathBuf },
    Rejected { url: String, content_type: String },
    Failed { url: String, error: String },
}

impl DownloadOutcome {
    /// The sheet is on disk after this outcome.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Downloaded { .. } | Self::AlreadyPresent { .. })
    }
}

#[derive(Debug, Default, Serialize)]
pub struct FetchReport {
    pub pages_scraped: usize,
    pub links_found: usize,
    pub invalid_urls: Vec<String>,
    pub outcomes: Vec<DownloadOutcome>,
}

impl FetchReport {
    pub fn available(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_available()).count()
    }
}

pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
    page_timeout: Duration,
    output_dir: PathBuf,
}

impl Fetcher {
    pub fn new(config: &FetchConfig, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            retry: RetryPolicy::from_config(&config.retry),
            page_timeout: Duration::from_secs(config.page_timeout_secs),
            output_dir: output_dir.into(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Scrape `pages` for SDS links, then download those plus `direct` URLs.
    pub async fn run(&self, pages: &[String], direct: &[String]) -> Result<FetchReport> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create output directory: {:?}", self.output_dir))?;

        let mut report = FetchReport::default();
        let mut candidates = Vec::new();

        for page in pages {
            match self.fetch_page(page).await {
                Ok(html) => {
                    report.pages_scraped += 1;
                    let links = extract_sds_links(&html);
                    if links.is_empty() {
                        warn!(page = %page, "No SDS links found");
                    }
                    report.links_found += links.len();
                    candidates.extend(links);
                }
                Err(e) => warn!(page = %page, error = %format!("{:#}", e), "Failed to scrape page"),
            }
        }
        candidates.extend(direct.iter().cloned());

        for raw in dedup_preserving_order(candidates) {
            let Some(url) = parse_fetchable(&raw) else {
                warn!(url = %raw, "Skipping invalid URL");
                report.invalid_urls.push(raw);
                continue;
            };

            let outcome = match self.download(&url).await {
                Ok(outcome) => outcome,
                Err(e) => DownloadOutcome::Failed {
                    url: url.to_string(),
                    error: format!("{:#}", e),
                },
            };
            match &outcome {
                DownloadOutcome::Downloaded { path, .. } => info!(url = %url, path = %path.display(), "Downloaded"),
                DownloadOutcome::AlreadyPresent { path, .. } => info!(path = %path.display(), "File already exists, skipping"),
                DownloadOutcome::Rejected { content_type, .. } => warn!(url = %url, content_type = %content_type, "Invalid content type"),
                DownloadOutcome::Failed { error, .. } => warn!(url = %url, error = %error, "Download failed"),
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    async fn fetch_page(&self, page: &str) -> Result<String> {
        info!(page = %page, "Scraping");
        let response = self
            .retry
            .retry("fetch_page", is_transient, || async {
                self.client
                    .get(page)
                    .timeout(self.page_timeout)
                    .send()
                    .await?
                    .error_for_status()
            })
            .await
            .with_context(|| format!("Failed to fetch page: {}", page))?;

        response.text().await.context("Failed to read page body")
    }

    /// Download one sheet. The file name comes from the URL after redirects,
    /// so existence is checked once the response headers arrive.
    pub async fn download(&self, url: &Url) -> Result<DownloadOutcome> {
        let response = self
            .retry
            .retry("download", is_transient, || async {
                self.client.get(url.clone()).send().await?.error_for_status()
            })
            .await
            .with_context(|| format!("Failed to download: {}", url))?;

        let final_url = response.url().clone();
        let path = self.output_dir.join(url_to_file_name(&final_url));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(DownloadOutcome::AlreadyPresent {
                url: final_url.to_string(),
                path,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !ACCEPTED_CONTENT_TYPES.iter().any(|accepted| content_type.contains(accepted)) {
            return Ok(DownloadOutcome::Rejected {
                url: final_url.to_string(),
                content_type,
            });
        }

        let partial = path.with_extension("pdf.part");
        if let Err(e) = save_body(response, &partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        Ok(DownloadOutcome::Downloaded {
            url: final_url.to_string(),
            path,
        })
    }
}

/// Stream the body into `partial` and move it to `path` once complete, so
/// an interrupted download never looks like a finished sheet.
async fn save_body(mut response: Response, partial: &Path, path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::create(partial)
        .await
        .with_context(|| format!("Failed to create {:?}", partial))?;

    while let Some(chunk) = response
        .chunk()
        .await
        .context("Failed to read download body")?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {:?}", partial))?;
    }
    file.sync_all()
        .await
        .with_context(|| format!("Failed to flush {:?}", partial))?;
    drop(file);

    tokio::fs::rename(partial, path)
        .await
        .with_context(|| format!("Failed to move {:?} into place", partial))
}

/// Timeouts, connection failures and 5xx responses are worth another attempt.
fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }
    err.status()
        .map(|status| status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Answer the first connection with `response` verbatim, then hang up.
    async fn serve_once(response: Vec<u8>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{}/files/Foo%20Sheet.pdf", addr)).unwrap()
    }

    fn http_response(content_type: &str, content_length: usize, body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            content_type, content_length
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    fn local_fetcher(dir: &Path) -> Fetcher {
        Fetcher {
            client: Client::builder().no_proxy().build().unwrap(),
            retry: RetryPolicy::new(0, 1, 1),
            page_timeout: Duration::from_secs(5),
            output_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_download_then_skip_existing() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = local_fetcher(dir.path());
        let body = b"%PDF-1.4 sheet";

        let url = serve_once(http_response("application/pdf", body.len(), body)).await;
        let outcome = fetcher.download(&url).await.unwrap();

        let expected = dir.path().join("foo_20sheet.pdf");
        assert!(matches!(&outcome, DownloadOutcome::Downloaded { path, .. } if *path == expected));
        assert_eq!(std::fs::read(&expected).unwrap(), body);
        assert!(!dir.path().join("foo_20sheet.pdf.part").exists());

        let url = serve_once(http_response("application/pdf", body.len(), body)).await;
        let again = fetcher.download(&url).await.unwrap();
        assert!(matches!(again, DownloadOutcome::AlreadyPresent { .. }));
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = local_fetcher(dir.path());

        // Promises 100 bytes, sends 10
        let url = serve_once(http_response("application/pdf", 100, b"%PDF-1.4 x")).await;
        assert!(fetcher.download(&url).await.is_err());

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unexpected_content_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = local_fetcher(dir.path());

        let url = serve_once(http_response("image/png", 4, b"\x89PNG")).await;
        let outcome = fetcher.download(&url).await.unwrap();

        assert!(matches!(outcome, DownloadOutcome::Rejected { ref content_type, .. } if content_type == "image/png"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    fn file_name(raw: &str) -> String {
        url_to_file_name(&Url::parse(raw).unwrap())
    }

    #[test]
    fn test_extract_sds_links() {
        let html = r#"
            <a href="https://sds.example.com/pdf/?productID=42">SDS</a>
            <a href='http://sds.example.com/pdf/?productID=7'>SDS</a>
            <a href="https://example.com/other.pdf">not a sheet</a>"#;

        assert_eq!(
            extract_sds_links(html),
            vec![
                "https://sds.example.com/pdf/?productID=42",
                "http://sds.example.com/pdf/?productID=7",
            ]
        );
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let urls = ["b", "a", "b", "c", "a"].map(String::from);
        assert_eq!(dedup_preserving_order(urls), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_parse_fetchable() {
        assert!(parse_fetchable("https://example.com/a.pdf").is_some());
        assert!(parse_fetchable("ftp://example.com/a.pdf").is_none());
        assert!(parse_fetchable("example.com/a.pdf").is_none());
        assert!(parse_fetchable("").is_none());
    }

    #[test]
    fn test_url_to_file_name() {
        assert_eq!(file_name("https://x.com/files/Arm-Hammer%20SDS.PDF"), "arm_hammer_20sds.pdf");
        assert_eq!(file_name("https://x.com/docs/OxiClean__Max.pdf?v=2"), "oxiclean_max.pdf");
        assert_eq!(file_name("https://x.com/docs/sheet"), "sheet.pdf");
        assert_eq!(file_name("https://x.com/docs/sheet.aspx"), "sheet_aspx.pdf");
    }

    #[test]
    fn test_url_without_basename_uses_product_id() {
        assert_eq!(file_name("https://sds.example.com/pdf/?productID=42"), "product_42.pdf");

        let fallback = file_name("https://sds.example.com/pdf/");
        assert!(fallback.starts_with("sds_"));
        assert!(fallback.ends_with(".pdf"));
    }

    #[test]
    fn test_outcome_availability() {
        let present = DownloadOutcome::AlreadyPresent {
            url: "u".into(),
            path: PathBuf::from("a.pdf"),
        };
        let rejected = DownloadOutcome::Rejected {
            url: "u".into(),
            content_type: "image/png".into(),
        };
        assert!(present.is_available());
        assert!(!rejected.is_available());
    }
}
