//! Thin typed layer over `scraper`
//!
//! Lookups return `Option` or an empty `Vec` instead of failing, so the
//! strategies read as plain field pulls.

use scraper::{ElementRef, Html, Selector};

/// Compile selectors in priority order, skipping any that fail to parse
pub(crate) fn compile(patterns: &[&str]) -> Vec<Selector> {
    patterns
        .iter()
        .filter_map(|p| match Selector::parse(p) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("Invalid selector '{}': {:?}", p, e);
                None
            }
        })
        .collect()
}

/// Visible text of an element: text nodes trimmed and joined by single spaces
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip markup from an HTML fragment, keeping one text node per line
pub(crate) fn strip_markup(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    parsed
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) struct Document {
    html: Html,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// All matches of the first selector that matches anything
    pub fn find_all(&self, selectors: &[Selector]) -> Vec<Node<'_>> {
        for selector in selectors {
            let found: Vec<Node<'_>> = self.html.select(selector).map(Node).collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }
}

#[derive(Clone, Copy)]
pub(crate) struct Node<'a>(ElementRef<'a>);

impl<'a> Node<'a> {
    /// First descendant matching the first selector that matches anything
    pub fn find_first(&self, selectors: &[Selector]) -> Option<Node<'a>> {
        selectors
            .iter()
            .find_map(|s| self.0.select(s).next())
            .map(Node)
    }

    /// All descendants matching any of the selectors, in selector order
    pub fn find_all(&self, selectors: &[Selector]) -> Vec<Node<'a>> {
        selectors
            .iter()
            .flat_map(|s| self.0.select(s).map(Node))
            .collect()
    }

    /// Text of the first descendant with non-empty text, trying selectors in order
    pub fn first_text(&self, selectors: &[Selector]) -> Option<String> {
        selectors
            .iter()
            .filter_map(|s| self.0.select(s).next())
            .map(element_text)
            .find(|t| !t.is_empty())
    }

    pub fn contains(&self, selectors: &[Selector]) -> bool {
        self.find_first(selectors).is_some()
    }

    pub fn text(&self) -> String {
        element_text(self.0)
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.0.value().attr(name)
    }
}
