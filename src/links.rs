use std::collections::HashSet;

use scraper::Html;
use url::Url;

use crate::context::CrawlContext;
use crate::html;
use crate::language::{LanguageBelief, language_of_path};
use crate::normalize::normalize_parsed;

/// Same-site anchors of `document`, normalized and deduplicated in document
/// order. Language pruning is not applied here.
pub fn same_site_links(
    document: &Html,
    page_url: &Url,
    ctx: &CrawlContext,
    selectors: &[&str],
) -> Vec<String> {
    let mut seen = HashSet::new();
    html::anchor_targets(document, page_url, selectors)
        .into_iter()
        .filter(|url| ctx.is_same_site(url))
        .map(|url| normalize_parsed(&url).to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Drops links without a language segment once the site is known to use one,
/// keeping the site root.
pub fn prune_untranslated(links: Vec<String>, belief: &LanguageBelief, ctx: &CrawlContext) -> Vec<String> {
    if !belief.uses_language_in_path {
        return links;
    }
    links
        .into_iter()
        .filter(|link| {
            let Ok(url) = Url::parse(link) else {
                return false;
            };
            let keep = ctx.is_site_root(&url) || language_of_path(url.path()).is_some();
            if !keep {
                tracing::debug!(url = %link, "pruned link without language segment");
            }
            keep
        })
        .collect()
}

/// Unions link lists preserving first occurrence order.
pub fn union_links<I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|link| seen.insert(link.clone()))
        .collect()
}
