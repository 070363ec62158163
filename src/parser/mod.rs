pub mod dom;
pub mod extract;
pub mod photos;
pub mod plan;
pub mod price;

use url::Url;

use crate::db::ProductRecord;
use crate::error::ScrapeError;
use dom::HtmlPage;
use plan::SelectorPlan;

/// HTML → page tree → readiness check → record.
pub fn process_page(html: &str, url: &Url, plan: &SelectorPlan) -> Result<ProductRecord, ScrapeError> {
    let page = HtmlPage::parse(html);
    extract::check_ready(&page, plan, url.as_str())?;
    Ok(extract::extract(&page, url, plan))
}
