// src/scrape.rs
// Article scraping: bounded-redirect fetch with a browser user agent,
// readability extraction for the main text, og:image/author from raw HTML.
// Scraping is inherently unreliable, so the contract is Option, not Result.

use std::io::Cursor;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use url::{Host, Url};

// Many providers block default HTTP clients outright.
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    pub text: Option<String>,
    pub image: Option<String>,
    pub author: Option<String>,
    /// URL after redirects; may differ from the requested one.
    pub final_url: String,
}

#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Option<ScrapeResult>;
}

/// True for URLs the scraper must never fetch: non-HTTP schemes, localhost,
/// and loopback/private/link-local IP literals.
pub fn is_internal_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return true;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return true;
    }
    match url.host() {
        None => true,
        Some(Host::Ipv4(ip)) => is_blocked_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_blocked_ip(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => {
            let d = domain.to_ascii_lowercase();
            d == "localhost" || d.ends_with(".localhost") || d.ends_with(".local")
        }
    }
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique-local, fe80::/10 link-local
                || (seg[0] & 0xfe00) == 0xfc00
                || (seg[0] & 0xffc0) == 0xfe80
        }
    }
}

/// og:image from meta tags; both attribute orders occur in the wild.
pub(crate) fn extract_og_image(html: &str) -> Option<String> {
    static RE_PROP_FIRST: OnceCell<Regex> = OnceCell::new();
    let re = RE_PROP_FIRST.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+property=["']og:image["'][^>]+content=["']([^"']+)["']"#)
            .unwrap()
    });
    if let Some(c) = re.captures(html) {
        return Some(c[1].to_string());
    }

    static RE_CONTENT_FIRST: OnceCell<Regex> = OnceCell::new();
    let re = RE_CONTENT_FIRST.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+content=["']([^"']+)["'][^>]+property=["']og:image["']"#)
            .unwrap()
    });
    re.captures(html).map(|c| c[1].to_string())
}

pub(crate) fn extract_meta_author(html: &str) -> Option<String> {
    static RE_NAME_FIRST: OnceCell<Regex> = OnceCell::new();
    let re = RE_NAME_FIRST.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+name=["']author["'][^>]+content=["']([^"']+)["']"#).unwrap()
    });
    static RE_CONTENT_FIRST: OnceCell<Regex> = OnceCell::new();
    let re2 = RE_CONTENT_FIRST.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+content=["']([^"']+)["'][^>]+name=["']author["']"#).unwrap()
    });

    let raw = re
        .captures(html)
        .or_else(|| re2.captures(html))
        .map(|c| c[1].to_string())?;
    let author = html_escape::decode_html_entities(&raw).trim().to_string();
    (!author.is_empty()).then_some(author)
}

pub struct HttpScraper {
    http: reqwest::Client,
}

impl HttpScraper {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { http }
    }

    async fn scrape_impl(&self, url: &str) -> Option<ScrapeResult> {
        if is_internal_url(url) {
            tracing::warn!(url, "scraper blocked internal url");
            return None;
        }

        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, url, "scrape fetch failed");
                return None;
            }
        };
        let resp = match resp.error_for_status() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, url, "scrape fetch rejected");
                return None;
            }
        };

        let final_url = resp.url().clone();
        let html = resp.text().await.ok()?;

        // Meta passes run on the raw HTML regardless of extractor outcome.
        let image = extract_og_image(&html);
        let author = extract_meta_author(&html);

        // The readability pass is CPU-bound; keep it off the async workers.
        let extract_url = final_url.clone();
        let text = tokio::task::spawn_blocking(move || {
            readability::extractor::extract(&mut Cursor::new(html.into_bytes()), &extract_url)
                .ok()
                .map(|product| product.text)
        })
        .await
        .ok()
        .flatten()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

        Some(ScrapeResult {
            text,
            image,
            author,
            final_url: final_url.to_string(),
        })
    }
}

impl Default for HttpScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Option<ScrapeResult> {
        self.scrape_impl(url).await
    }
}

/// Test scraper: canned results per URL, records every call. A URL with no
/// entry behaves like a scrape failure.
pub struct MockScraper {
    results: Mutex<std::collections::HashMap<String, ScrapeResult>>,
    calls: Mutex<Vec<String>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(std::collections::HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, url: &str, result: ScrapeResult) {
        self.results
            .lock()
            .expect("poisoned results")
            .insert(url.to_string(), result);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("poisoned calls").clone()
    }
}

impl Default for MockScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scraper for MockScraper {
    async fn scrape(&self, url: &str) -> Option<ScrapeResult> {
        self.calls
            .lock()
            .expect("poisoned calls")
            .push(url.to_string());
        self.results.lock().expect("poisoned results").get(url).cloned()
    }
}
