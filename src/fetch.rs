use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use spider_client::shapes::request::{
    RequestType, ReturnFormat, ReturnFormatHandling, Selector, Timeout, WaitFor, WebAutomation,
};
use spider_client::{RequestParams, Spider};
use tracing::debug;
use url::Url;

use crate::config::{Backend, Settings};
use crate::error::ScrapeError;
use crate::parser::plan::SelectorPlan;

/// spider.cloud caps browser waits at one minute.
const MAX_RENDER_WAIT_SECS: u64 = 60;
/// Pause after each expand click so the revealed rows can load.
const EXPAND_SETTLE_MS: u64 = 1000;

/// Gets a product page's HTML. Built once per run and reused for every URL.
pub enum Fetcher {
    Http(reqwest::Client),
    Render { spider: Spider, timeout: Duration },
}

impl Fetcher {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        match settings.backend {
            Backend::Http => {
                let client = reqwest::Client::builder()
                    .default_headers(browser_headers(&settings.user_agent)?)
                    .timeout(timeout)
                    .build()?;
                Ok(Fetcher::Http(client))
            }
            Backend::Render => {
                let api_key = std::env::var("SPIDER_API_KEY")
                    .map_err(|_| anyhow!("SPIDER_API_KEY environment variable must be set"))?;
                let spider = Spider::new(Some(api_key))
                    .map_err(|e| anyhow!("Failed to create Spider client: {}", e))?;
                Ok(Fetcher::Render { spider, timeout })
            }
        }
    }

    /// Page HTML for `url`. The render backend waits for `plan.ready` and clicks
    /// `plan.expand` before returning the DOM.
    pub async fn fetch(&self, url: &Url, plan: &SelectorPlan) -> Result<String, ScrapeError> {
        let start = Instant::now();
        let html = match self {
            Fetcher::Http(client) => fetch_plain(client, url.as_str()).await?,
            Fetcher::Render { spider, timeout } => {
                let params = render_params(url, plan, *timeout);
                tokio::time::timeout(*timeout, fetch_rendered(spider, url.as_str(), params))
                    .await
                    .map_err(|_| {
                        ScrapeError::fetch(url.as_str(), format!("timed out after {:?}", timeout))
                    })??
            }
        };
        debug!("Fetched {} ({} bytes) in {}ms", url, html.len(), start.elapsed().as_millis());
        Ok(html)
    }
}

fn browser_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_str(user_agent)?);
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("uk-UA,uk;q=0.9,en;q=0.8"));
    headers.insert(header::REFERER, HeaderValue::from_static("https://www.google.com/"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    Ok(headers)
}

async fn fetch_plain(client: &reqwest::Client, url: &str) -> Result<String, ScrapeError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ScrapeError::fetch(url, e))?;
    let response = response
        .error_for_status()
        .map_err(|e| ScrapeError::fetch(url, e))?;
    response.text().await.map_err(|e| ScrapeError::fetch(url, e))
}

/// Chrome render returning raw HTML, once the ready selector is present and the
/// expand buttons have been clicked.
fn render_params(url: &Url, plan: &SelectorPlan, timeout: Duration) -> RequestParams {
    let wait = Timeout {
        secs: timeout.as_secs().min(MAX_RENDER_WAIT_SECS),
        nanos: 0,
    };

    let steps: Vec<WebAutomation> = plan
        .expand
        .iter()
        .flat_map(|sel| {
            [
                WebAutomation::WaitForAndClick(sel.clone()),
                WebAutomation::Wait(EXPAND_SETTLE_MS),
            ]
        })
        .collect();
    // Scripts are keyed by the URL path they run on.
    let automation_scripts = if steps.is_empty() {
        None
    } else {
        Some(HashMap::from([(url.path().to_string(), steps)]))
    };

    RequestParams {
        return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
        request: Some(RequestType::Chrome),
        wait_for: Some(WaitFor {
            selector: Some(Selector {
                timeout: wait,
                selector: plan.ready.clone(),
            }),
            ..Default::default()
        }),
        automation_scripts,
        ..Default::default()
    }
}

async fn fetch_rendered(
    spider: &Spider,
    url: &str,
    params: RequestParams,
) -> Result<String, ScrapeError> {
    let value = spider
        .scrape_url(url, Some(params), "application/json")
        .await
        .map_err(|e| ScrapeError::fetch(url, e))?;
    rendered_html(url, value)
}

/// Pull the page body out of a spider.cloud response: `[{content, status, ...}]`,
/// sometimes delivered as a JSON string.
fn rendered_html(url: &str, value: serde_json::Value) -> Result<String, ScrapeError> {
    let parsed: serde_json::Value = match value.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        None => value,
    };
    let first = parsed.as_array().and_then(|arr| arr.first());

    let status = first
        .and_then(|obj| obj.get("status"))
        .and_then(|s| s.as_u64());
    if let Some(code) = status.filter(|c| !(200..300).contains(c)) {
        return Err(ScrapeError::fetch(url, format!("HTTP {}", code)));
    }

    first
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ScrapeError::fetch(url, "no content in render response"))
}
