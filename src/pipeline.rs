use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{error, info, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::fetch::Fetcher;
use crate::parser::{self, plan::SelectorPlan};
use crate::upsert::{upsert, UpsertOutcome};

/// Per-run tallies. `failed` covers fetch, extraction and storage failures alike.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl RunStats {
    fn record(&mut self, outcome: Option<UpsertOutcome>) {
        match outcome {
            Some(UpsertOutcome::Created(_)) => self.created += 1,
            Some(UpsertOutcome::Updated(_)) => self.updated += 1,
            Some(UpsertOutcome::Unchanged(_)) => self.unchanged += 1,
            None => self.failed += 1,
        }
    }
}

/// Scrape `urls` one after another, pausing `delay` between them. A failing
/// URL is logged and skipped; the loop always reaches the end.
pub async fn run(
    conn: &Connection,
    fetcher: &Fetcher,
    urls: &[String],
    plan: &SelectorPlan,
    delay: Duration,
) -> Result<RunStats> {
    let pb = ProgressBar::new(urls.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut stats = RunStats {
        total: urls.len(),
        ..Default::default()
    };

    for (i, raw_url) in urls.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        pb.set_message(raw_url.clone());
        info!("Parsing {}", raw_url);

        let outcome = match Url::parse(raw_url) {
            Err(e) => {
                warn!("{}", ScrapeError::fetch(raw_url, e));
                None
            }
            Ok(url) => match fetcher.fetch(&url, plan).await {
                Err(e) => {
                    warn!("{}", e);
                    None
                }
                Ok(html) => ingest(conn, &url, &html, plan, &pb),
            },
        };
        stats.record(outcome);
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Scraped {} pages ({} created, {} updated, {} unchanged, {} failed)",
        stats.total, stats.created, stats.updated, stats.unchanged, stats.failed
    );
    Ok(stats)
}

/// Extract, print and store one fetched page. `None` when it was skipped.
fn ingest(
    conn: &Connection,
    url: &Url,
    html: &str,
    plan: &SelectorPlan,
    pb: &ProgressBar,
) -> Option<UpsertOutcome> {
    let record = match parser::process_page(html, url, plan) {
        Ok(r) => r,
        Err(e) => {
            warn!("{}", e);
            return None;
        }
    };

    match serde_json::to_string_pretty(&record) {
        Ok(json) => pb.suspend(|| println!("{}", json)),
        Err(e) => warn!("Could not render {} as JSON: {}", url, e),
    }

    match upsert(conn, &record) {
        Ok(outcome) => {
            let code = record.code.as_deref().unwrap_or("-");
            match outcome {
                UpsertOutcome::Created(id) => info!("Created product id={} code={}", id, code),
                UpsertOutcome::Updated(id) => info!("Updated product id={} code={}", id, code),
                UpsertOutcome::Unchanged(id) => {
                    info!("Product id={} code={} unchanged, nothing written", id, code)
                }
            }
            Some(outcome)
        }
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}
