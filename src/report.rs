use std::collections::HashMap;

use chrono::Utc;

use crate::formats::{AggregatedReport, IssueCategory, ScoredPage};

pub const NO_PAGES_ISSUE: &str = "No pages could be analyzed";
pub const MANUAL_REVIEW_RECOMMENDATION: &str = "Manual review recommended";
const MAX_FALLBACK_RECOMMENDATIONS: usize = 10;

/// Reduces every page of a finished crawl into one site report.
///
/// The overall score is the mean final score of pages that have one. Issues
/// are rolled up per message, most frequent first. With no scored pages the
/// report still exists with a zero score and an explanatory issue.
pub fn aggregate(pages: &[ScoredPage], strategic: Vec<String>) -> AggregatedReport {
    let scores = pages
        .iter()
        .filter_map(|p| p.final_score)
        .map(u32::from)
        .collect::<Vec<_>>();

    if scores.is_empty() {
        return AggregatedReport {
            overall_score: 0,
            pages_crawled: pages.len(),
            pages_scored: 0,
            technical_issues: vec![NO_PAGES_ISSUE.to_owned()],
            content_issues: Vec::new(),
            recommendations: vec![MANUAL_REVIEW_RECOMMENDATION.to_owned()],
            generated_at: Utc::now(),
        };
    }

    let total = scores.iter().sum::<u32>();
    let overall_score = ((f64::from(total) / scores.len() as f64).round() as u32).min(100) as u8;

    let recommendations = if strategic.is_empty() {
        fallback_recommendations(pages)
    } else {
        strategic
    };

    AggregatedReport {
        overall_score,
        pages_crawled: pages.len(),
        pages_scored: scores.len(),
        technical_issues: rollup(pages, IssueCategory::Technical),
        content_issues: rollup(pages, IssueCategory::Content),
        recommendations,
        generated_at: Utc::now(),
    }
}

/// `"<message> (<n> pages)"`, sorted by page count then message. A message
/// counts once per page.
fn rollup(pages: &[ScoredPage], category: IssueCategory) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for page in pages {
        let mut seen = Vec::new();
        for issue in page.page.issues.iter().filter(|i| i.category == category) {
            if seen.contains(&issue.message.as_str()) {
                continue;
            }
            seen.push(issue.message.as_str());
            *counts.entry(issue.message.as_str()).or_default() += 1;
        }
    }

    let mut counts = counts.into_iter().collect::<Vec<_>>();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    counts
        .into_iter()
        .map(|(message, n)| {
            let unit = if n == 1 { "page" } else { "pages" };
            format!("{message} ({n} {unit})")
        })
        .collect()
}

/// Per-page recommendations and suggestions, most common first.
fn fallback_recommendations(pages: &[ScoredPage]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let items = pages.iter().flat_map(|p| {
        p.recommendations
            .iter()
            .chain(p.page.suggestions.iter())
            .map(String::as_str)
    });
    for (idx, item) in items.enumerate() {
        *counts.entry(item).or_default() += 1;
        first_seen.entry(item).or_insert(idx);
    }

    let mut ranked = counts.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| first_seen.get(a.0).cmp(&first_seen.get(b.0)))
    });
    ranked
        .into_iter()
        .take(MAX_FALLBACK_RECOMMENDATIONS)
        .map(|(item, _)| item.to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{ErrorKind, Issue, PageResult};

    fn scored(url: &str, score: Option<u8>, issues: Vec<Issue>) -> ScoredPage {
        let mut page = PageResult::failed(url, ErrorKind::ConnectionError, "x");
        page.error_kind = None;
        page.issues = issues;
        page.score = score;
        page.suggestions = vec!["Verify sitemap.xml".to_owned()];
        ScoredPage {
            page,
            qualitative_score: None,
            final_score: score,
            recommendations: Vec::new(),
        }
    }

    #[test]
    fn averages_scored_pages_and_rolls_up_issues() {
        let pages = vec![
            scored("https://e.com/", Some(90), vec![Issue::technical("Missing JSON-LD")]),
            scored(
                "https://e.com/a",
                Some(71),
                vec![
                    Issue::technical("Missing JSON-LD"),
                    Issue::technical("Missing H1"),
                    Issue::content("Thin content"),
                ],
            ),
            scored("https://e.com/b", None, Vec::new()),
        ];
        let report = aggregate(&pages, Vec::new());
        assert_eq!(report.overall_score, 81);
        assert_eq!(report.pages_crawled, 3);
        assert_eq!(report.pages_scored, 2);
        assert_eq!(
            report.technical_issues,
            vec!["Missing JSON-LD (2 pages)", "Missing H1 (1 page)"]
        );
        assert_eq!(report.content_issues, vec!["Thin content (1 page)"]);
        assert_eq!(report.recommendations, vec!["Verify sitemap.xml"]);
    }

    #[test]
    fn strategic_recommendations_win() {
        let pages = vec![scored("https://e.com/", Some(50), Vec::new())];
        let report = aggregate(&pages, vec!["Publish a blog".to_owned()]);
        assert_eq!(report.recommendations, vec!["Publish a blog"]);
    }

    #[test]
    fn empty_crawl_still_reports() {
        let pages = vec![scored("https://e.com/", None, Vec::new())];
        let report = aggregate(&pages, vec!["ignored".to_owned()]);
        assert_eq!(report.overall_score, 0);
        assert_eq!(report.technical_issues, vec![NO_PAGES_ISSUE]);
        assert_eq!(report.recommendations, vec![MANUAL_REVIEW_RECOMMENDATION]);

        let report = aggregate(&[], Vec::new());
        assert_eq!(report.pages_crawled, 0);
        assert_eq!(report.overall_score, 0);
    }
}
