use std::collections::HashSet;

use url::Url;

/// Turn an image `src` into an absolute URL relative to the page it came from.
pub fn absolutize(src: &str, base: &Url) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    if src.starts_with("http://") || src.starts_with("https://") {
        return Some(src.to_string());
    }
    base.join(src).ok().map(String::from)
}

/// Drop repeats, keeping the first occurrence of each URL in place.
pub fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}
