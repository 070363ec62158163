use thiserror::Error;

/// Failures that discard a whole URL. Missing fields are not errors.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("no product content on {url}: {reason}")]
    Extraction { url: String, reason: String },
}

impl ScrapeError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        ScrapeError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn extraction(url: &str, reason: impl ToString) -> Self {
        ScrapeError::Extraction {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Storage failure during lookup or save. The record is not persisted.
#[derive(Debug, Error)]
#[error("could not persist product (code={}): {source}", .code.as_deref().unwrap_or("-"))]
pub struct PersistError {
    pub code: Option<String>,
    #[source]
    pub source: rusqlite::Error,
}
