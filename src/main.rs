mod config;
mod db;
mod error;
mod fetch;
mod parser;
mod pipeline;
mod upsert;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use url::Url;

use crate::config::Backend;

#[derive(Parser)]
#[command(name = "catalog_scraper", about = "Product page scraper with upsert into SQLite")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the products table
    Init,
    /// Fetch, extract and store product pages
    Scrape {
        /// Product page URLs (default: `urls` from config)
        urls: Vec<String>,
        /// Render pages in a headless browser via spider.cloud
        #[arg(long)]
        render: bool,
        /// Pause between pages in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Per-page fetch timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Extract from a saved HTML file and print the record (no DB writes)
    Parse {
        file: PathBuf,
        /// URL the page was saved from, used to resolve relative links
        #[arg(long)]
        url: String,
    },
    /// Stored products, newest first
    List {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Only rows with this product code
        #[arg(long)]
        code: Option<String>,
    },
    /// Row counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = config::load()?;

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            println!("Schema ready in {:?}", settings.db_path);
            Ok(())
        }
        Commands::Scrape {
            urls,
            render,
            delay_ms,
            timeout_secs,
        } => {
            if render {
                settings.backend = Backend::Render;
            }
            if let Some(ms) = delay_ms {
                settings.delay_ms = ms;
            }
            if let Some(secs) = timeout_secs {
                settings.timeout_secs = secs;
            }
            let urls = if urls.is_empty() { settings.urls.clone() } else { urls };
            if urls.is_empty() {
                println!("No URLs given. Pass them as arguments or set `urls` in catalog_scraper.toml.");
                return Ok(());
            }

            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let fetcher = fetch::Fetcher::from_settings(&settings)?;
            println!("Scraping {} pages ({:?} backend)...", urls.len(), settings.backend);
            let stats = pipeline::run(
                &conn,
                &fetcher,
                &urls,
                &settings.plan,
                Duration::from_millis(settings.delay_ms),
            )
            .await?;
            println!(
                "Done: {} pages ({} created, {} updated, {} unchanged, {} failed).",
                stats.total, stats.created, stats.updated, stats.unchanged, stats.failed
            );
            Ok(())
        }
        Commands::Parse { file, url } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let url = Url::parse(&url).with_context(|| format!("Invalid URL '{}'", url))?;
            let record = parser::process_page(&html, &url, &settings.plan)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::List { limit, code } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_products(&conn, code.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No products stored.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<10} | {:<40} | {:>10} | {:>10} | {:>4} | {:<19}",
                "id", "Code", "Title", "Price", "Discount", "Revs", "Updated"
            );
            println!("{}", "-".repeat(116));
            for p in &rows {
                let r = &p.row;
                println!(
                    "{:>5} | {:<10} | {:<40} | {:>10} | {:>10} | {:>4} | {:<19}",
                    p.id,
                    truncate(r.code.as_deref().unwrap_or("-"), 10),
                    truncate(r.title.as_deref().unwrap_or("-"), 40),
                    r.price.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                    r.discount_price.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                    r.reviews_count.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                    p.updated_at,
                );
            }
            println!("\n{} products", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Products:       {}", s.total);
            println!("With code:      {}", s.with_code);
            println!("Distinct codes: {}", s.distinct_codes);
            println!("Without code:   {}", s.without_code);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
