use scraper::Html;
use serde::Serialize;

use crate::config::ScoringRules;
use crate::formats::{Heading, Issue};
use crate::html;

pub const SITEMAP_SUGGESTION: &str =
    "Verify that sitemap.xml lists this page and is referenced from robots.txt";
pub const STRUCTURED_DATA_PRESENT_SUGGESTION: &str =
    "Structured data (JSON-LD) is present; keep it in sync with visible content";
pub const STRUCTURED_DATA_MISSING_SUGGESTION: &str =
    "Add JSON-LD structured data (Organization, WebPage, BreadcrumbList) to enable rich results";

/// Structural signals read from a page's HTML.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageSignals {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<Heading>,
    pub h1_count: usize,
    pub image_count: usize,
    pub images_missing_alt: usize,
    pub word_count: usize,
    pub has_structured_data: bool,
    pub has_schema_markup: bool,
}

impl PageSignals {
    pub fn from_document(document: &Html) -> Self {
        let title = html::select(document, "title")
            .first()
            .map(html::element_text)
            .filter(|t| !t.is_empty());

        let meta_description = html::select(document, "meta[name]")
            .into_iter()
            .find(|el| {
                el.value()
                    .attr("name")
                    .is_some_and(|name| name.eq_ignore_ascii_case("description"))
            })
            .and_then(|el| el.value().attr("content").map(html::collapse_whitespace))
            .filter(|d| !d.is_empty());

        let headings = html::select(document, "h1, h2, h3")
            .into_iter()
            .filter_map(|el| {
                let level = el.value().name().strip_prefix('h')?.parse::<u8>().ok()?;
                let text = html::element_text(&el);
                (!text.is_empty()).then_some(Heading { level, text })
            })
            .collect::<Vec<_>>();
        let h1_count = html::select(document, "h1").len();

        let images = html::select(document, "img");
        let images_missing_alt = images
            .iter()
            .filter(|img| img.value().attr("alt").is_none_or(|alt| alt.trim().is_empty()))
            .count();

        let word_count = html::visible_text(document, html::NON_TEXT_TAGS)
            .split_whitespace()
            .count();

        let has_structured_data = !html::select(document, "script[type='application/ld+json']")
            .is_empty();
        let has_schema_markup =
            has_structured_data || !html::select(document, "[itemscope][itemtype]").is_empty();

        Self {
            title,
            meta_description,
            headings,
            h1_count,
            image_count: images.len(),
            images_missing_alt,
            word_count,
            has_structured_data,
            has_schema_markup,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageScore {
    pub score: u8,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub signals: PageSignals,
}

pub fn score_html(html: &str, rules: &ScoringRules) -> PageScore {
    let document = Html::parse_document(html);
    score_document(&document, rules)
}

/// Deterministic quantitative score: 100 minus fixed penalties, clamped to
/// `0..=100`.
pub fn score_document(document: &Html, rules: &ScoringRules) -> PageScore {
    score_signals(PageSignals::from_document(document), rules)
}

pub fn score_signals(signals: PageSignals, rules: &ScoringRules) -> PageScore {
    let mut penalty = 0_u32;
    let mut issues = Vec::new();

    match signals.title.as_deref().map(|t| t.chars().count()) {
        None => {
            penalty += rules.missing_title;
            issues.push(Issue::technical("Missing <title> tag"));
        }
        Some(len) if len > rules.title_max_chars => {
            penalty += rules.long_title;
            issues.push(Issue::technical(format!(
                "Title is too long ({len} chars, max {})",
                rules.title_max_chars
            )));
        }
        Some(len) if len < rules.title_min_chars => {
            penalty += rules.short_title;
            issues.push(Issue::technical(format!(
                "Title is too short ({len} chars, min {})",
                rules.title_min_chars
            )));
        }
        Some(_) => {}
    }

    match signals
        .meta_description
        .as_deref()
        .map(|d| d.chars().count())
    {
        None => {
            penalty += rules.missing_meta_description;
            issues.push(Issue::technical("Missing meta description"));
        }
        Some(len) if len > rules.meta_max_chars => {
            penalty += rules.long_meta_description;
            issues.push(Issue::technical(format!(
                "Meta description is too long ({len} chars, max {})",
                rules.meta_max_chars
            )));
        }
        Some(len) if len < rules.meta_min_chars => {
            penalty += rules.short_meta_description;
            issues.push(Issue::technical(format!(
                "Meta description is too short ({len} chars, min {})",
                rules.meta_min_chars
            )));
        }
        Some(_) => {}
    }

    match signals.h1_count {
        0 => {
            penalty += rules.missing_h1;
            issues.push(Issue::technical("Missing H1 heading"));
        }
        1 => {}
        n => {
            penalty += rules.multiple_h1;
            issues.push(Issue::technical(format!("Multiple H1 headings ({n})")));
        }
    }

    if signals.images_missing_alt > 0 {
        let raw = rules
            .image_without_alt
            .saturating_mul(u32::try_from(signals.images_missing_alt).unwrap_or(u32::MAX));
        penalty += raw.min(rules.image_without_alt_cap);
        issues.push(Issue::content(format!(
            "{} image(s) without alt text",
            signals.images_missing_alt
        )));
    }

    if signals.word_count < rules.thin_content_words {
        penalty += rules.thin_content;
        issues.push(Issue::content(format!(
            "Thin content ({} words, min {})",
            signals.word_count, rules.thin_content_words
        )));
    }

    let mut suggestions = vec![SITEMAP_SUGGESTION.to_owned()];
    if signals.has_structured_data {
        suggestions.push(STRUCTURED_DATA_PRESENT_SUGGESTION.to_owned());
    } else {
        penalty += rules.missing_structured_data;
        issues.push(Issue::technical("No JSON-LD structured data"));
        suggestions.push(STRUCTURED_DATA_MISSING_SUGGESTION.to_owned());
    }

    let score = 100_u32.saturating_sub(penalty).min(100) as u8;
    PageScore {
        score,
        issues,
        suggestions,
        signals,
    }
}
