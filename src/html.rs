use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Tags whose text never counts as page content.
pub const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "footer", "header", "aside", "form",
];

/// Tags ignored when counting words for the scorer.
pub const NON_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Navigation containers whose anchors are collected alongside plain `a[href]`.
pub const NAVIGATION_LINK_SELECTORS: &[&str] = &[
    "nav a[href]",
    "header a[href]",
    "[role='navigation'] a[href]",
    ".menu a[href]",
    ".navbar a[href]",
    "footer a[href]",
];

pub fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of the document body, skipping text under any of `skip_tags`.
pub fn visible_text(document: &Html, skip_tags: &[&str]) -> String {
    let root = select(document, "body")
        .into_iter()
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| skip_tags.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        words.extend(text.split_whitespace());
    }
    words.join(" ")
}

pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => input[..idx].to_owned(),
        None => input.to_owned(),
    }
}

/// Absolute http(s) targets of the anchors matched by `selectors`.
pub fn anchor_targets(document: &Html, base: &Url, selectors: &[&str]) -> Vec<Url> {
    let mut targets = Vec::new();
    for css in selectors {
        for element in select(document, css) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if let Some(url) = resolve_href(base, href) {
                targets.push(url);
            }
        }
    }
    targets
}

pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
