//! Query surface the extractor runs against.
//!
//! Extraction only needs to find elements, read their text and read attributes,
//! so that is all a page backend has to provide. Locators are CSS selectors.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

pub trait PageTree {
    type Node<'a>: Copy
    where
        Self: 'a;

    fn find_one(&self, locator: &str) -> Option<Self::Node<'_>>;
    fn find_all(&self, locator: &str) -> Vec<Self::Node<'_>>;
    fn find_within<'a>(&'a self, scope: Self::Node<'a>, locator: &str) -> Vec<Self::Node<'a>>;
    /// Closest following sibling element with the given tag name.
    fn next_sibling<'a>(&'a self, node: Self::Node<'a>, tag: &str) -> Option<Self::Node<'a>>;
    /// Descendant text with whitespace runs collapsed to single spaces.
    fn text_of(&self, node: Self::Node<'_>) -> String;
    fn attr_of(&self, node: Self::Node<'_>, name: &str) -> Option<String>;
}

/// A fetched page parsed into an HTML tree.
pub struct HtmlPage {
    html: Html,
}

impl HtmlPage {
    pub fn parse(source: &str) -> Self {
        HtmlPage {
            html: Html::parse_document(source),
        }
    }
}

fn compile(locator: &str) -> Option<Selector> {
    match Selector::parse(locator) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!("Invalid selector '{}': {}", locator, e);
            None
        }
    }
}

impl PageTree for HtmlPage {
    type Node<'a> = ElementRef<'a>;

    fn find_one(&self, locator: &str) -> Option<ElementRef<'_>> {
        let sel = compile(locator)?;
        self.html.select(&sel).next()
    }

    fn find_all(&self, locator: &str) -> Vec<ElementRef<'_>> {
        match compile(locator) {
            Some(sel) => self.html.select(&sel).collect(),
            None => Vec::new(),
        }
    }

    fn find_within<'a>(&'a self, scope: ElementRef<'a>, locator: &str) -> Vec<ElementRef<'a>> {
        match compile(locator) {
            Some(sel) => scope.select(&sel).collect(),
            None => Vec::new(),
        }
    }

    fn next_sibling<'a>(&'a self, node: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
        node.next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == tag)
    }

    fn text_of(&self, node: ElementRef<'_>) -> String {
        let raw: String = node.text().collect();
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn attr_of(&self, node: ElementRef<'_>, name: &str) -> Option<String> {
        node.value().attr(name).map(str::to_string)
    }
}
