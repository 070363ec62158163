use std::collections::BTreeMap;

use url::Url;

use super::dom::PageTree;
use super::photos::{absolutize, dedup_preserving_order};
use super::plan::{Attribute, SelectorPlan};
use super::price::parse_price;
use crate::db::ProductRecord;
use crate::error::ScrapeError;

/// Fails when the page lacks its primary heading, i.e. product content never loaded.
pub fn check_ready<P: PageTree>(page: &P, plan: &SelectorPlan, url: &str) -> Result<(), ScrapeError> {
    match page.find_one(&plan.ready) {
        Some(_) => Ok(()),
        None => Err(ScrapeError::extraction(
            url,
            format!("nothing matches '{}'", plan.ready),
        )),
    }
}

/// Build a record from a loaded product page. Missing elements leave their
/// field empty; this never fails.
pub fn extract<P: PageTree>(page: &P, url: &Url, plan: &SelectorPlan) -> ProductRecord {
    let title = plan
        .title
        .iter()
        .find_map(|loc| page.find_one(loc))
        .map(|el| page.text_of(el))
        .filter(|t| !t.is_empty());

    let price = first_text(page, &plan.price).and_then(|t| parse_price(&t));
    let discount_price = first_text(page, &plan.discount_price)
        .and_then(|t| parse_price(&t))
        .or(price);

    let mut record = ProductRecord {
        link: url.to_string(),
        full_name: title.clone(),
        title,
        vendor: first_text(page, &plan.vendor),
        price,
        discount_price,
        photos: photos(page, url, plan),
        code: first_text(page, &plan.code),
        reviews_count: first_text(page, &plan.reviews)
            .and_then(|t| t.parse::<u32>().ok())
            .unwrap_or(0),
        specifications: specifications(page, plan),
        ..Default::default()
    };

    for rule in &plan.attributes {
        let value = characteristic(page, plan, &rule.labels);
        let slot = match rule.field {
            Attribute::Color => &mut record.color,
            Attribute::Memory => &mut record.memory,
            Attribute::Article => &mut record.article,
            Attribute::Diagonal => &mut record.diagonal,
            Attribute::Resolution => &mut record.resolution,
        };
        if value.is_some() {
            *slot = value;
        }
    }

    record
}

fn first_text<P: PageTree>(page: &P, locator: &str) -> Option<String> {
    page.find_one(locator)
        .map(|el| page.text_of(el))
        .filter(|t| !t.is_empty())
}

/// Value next to the first label span matching `labels`, exact matches first.
fn characteristic<P: PageTree>(page: &P, plan: &SelectorPlan, labels: &[String]) -> Option<String> {
    let spans: Vec<(String, P::Node<'_>)> = page
        .find_all(&plan.characteristic_item)
        .into_iter()
        .flat_map(|item| page.find_within(item, "span"))
        .map(|span| (page.text_of(span), span))
        .collect();

    let (_, label) = spans
        .iter()
        .find(|(text, _)| labels.iter().any(|l| text == l))
        .or_else(|| {
            spans
                .iter()
                .find(|(text, _)| labels.iter().any(|l| text.contains(l.as_str())))
        })?;

    page.next_sibling(*label, "span")
        .map(|value| page.text_of(value))
        .filter(|t| !t.is_empty())
}

fn photos<P: PageTree>(page: &P, url: &Url, plan: &SelectorPlan) -> Vec<String> {
    let urls = page
        .find_all(&plan.photos)
        .into_iter()
        .filter_map(|img| {
            plan.photo_attributes
                .iter()
                .filter_map(|attr| page.attr_of(img, attr))
                .find(|v| !v.trim().is_empty())
        })
        .filter_map(|src| absolutize(&src, url))
        .collect();
    dedup_preserving_order(urls)
}

fn specifications<P: PageTree>(page: &P, plan: &SelectorPlan) -> BTreeMap<String, String> {
    let mut specs = BTreeMap::new();
    for item in page.find_all(&plan.characteristic_item) {
        for row in page.find_within(item, &plan.characteristic_row) {
            let Some(key_span) = page.find_within(row, "span").into_iter().next() else {
                continue;
            };
            let Some(value_span) = page.next_sibling(key_span, "span") else {
                continue;
            };
            let key = page.text_of(key_span);
            if key.is_empty() {
                continue;
            }

            // Linked values ("OLED", "Super Retina XDR") are listed one per anchor.
            let linked: Vec<String> = page
                .find_within(value_span, "a")
                .into_iter()
                .map(|a| page.text_of(a))
                .filter(|t| !t.is_empty())
                .collect();
            let value = if linked.is_empty() {
                page.text_of(value_span)
            } else {
                linked.join(", ")
            };
            specs.insert(key, value);
        }
    }
    specs
}
