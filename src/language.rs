use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// ISO 639-1 codes recognized as a leading path segment.
pub const LANGUAGE_CODES: &[&str] = &[
    "ar", "bg", "bs", "ca", "cs", "cy", "da", "de", "el", "en", "es", "et", "eu", "fa", "fi", "fr",
    "ga", "gl", "he", "hi", "hr", "hu", "hy", "id", "is", "it", "ja", "ka", "kk", "ko", "lt", "lv",
    "mk", "ms", "mt", "nb", "nl", "nn", "no", "pl", "pt", "ro", "ru", "sk", "sl", "sq", "sr", "sv",
    "th", "tr", "uk", "ur", "vi", "zh",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageBelief {
    pub uses_language_in_path: bool,
    pub primary_language: Option<String>,
}

/// Learns whether a site puts a language code in the first path segment.
///
/// Scoped to one crawl run; a detected language is only ever replaced by a
/// newer detection, never cleared, until [`SiteLanguageResolver::reset`].
#[derive(Debug, Clone, Default)]
pub struct SiteLanguageResolver {
    belief: LanguageBelief,
}

impl SiteLanguageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn belief(&self) -> &LanguageBelief {
        &self.belief
    }

    pub fn observe<S: AsRef<str>>(&mut self, urls: &[S]) -> LanguageBelief {
        if urls.is_empty() {
            return self.belief.clone();
        }

        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        let mut tagged = 0_usize;
        for raw in urls {
            if let Some(code) = language_of_url(raw.as_ref()) {
                tagged += 1;
                *counts.entry(code).or_default() += 1;
            }
        }

        if tagged * 2 > urls.len() {
            let primary = counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(code, _)| code.to_owned());
            if let Some(primary) = primary {
                tracing::debug!(language = %primary, tagged, total = urls.len(), "language pattern detected");
                self.belief = LanguageBelief {
                    uses_language_in_path: true,
                    primary_language: Some(primary),
                };
            }
        }

        self.belief.clone()
    }

    /// Feeds back a language confirmed by a live probe.
    pub fn record_language(&mut self, code: &str) {
        let Some(code) = known_code(code) else {
            return;
        };
        if self.belief.primary_language.as_deref() != Some(code) {
            tracing::debug!(language = code, "language confirmed by probe");
        }
        self.belief = LanguageBelief {
            uses_language_in_path: true,
            primary_language: Some(code.to_owned()),
        };
    }

    pub fn build_path(&self, base_path: &str) -> String {
        let trimmed = base_path.trim_start_matches('/');
        match self.belief.primary_language.as_deref() {
            Some(lang) if language_of_path(base_path).is_none() => {
                if trimmed.is_empty() {
                    format!("/{lang}")
                } else {
                    format!("/{lang}/{trimmed}")
                }
            }
            _ => format!("/{trimmed}"),
        }
    }

    pub fn reset(&mut self) {
        self.belief = LanguageBelief::default();
    }
}

fn known_code(code: &str) -> Option<&'static str> {
    let lower = code.to_ascii_lowercase();
    LANGUAGE_CODES.iter().copied().find(|known| *known == lower)
}

/// Language code carried by the first segment of `path`, e.g. `/ro/...` or
/// `/en-us/...`.
pub fn language_of_path(path: &str) -> Option<&'static str> {
    let first = path.trim_start_matches('/').split('/').next()?;
    if first.is_empty() {
        return None;
    }
    let base = match first.split_once(['-', '_']) {
        Some((base, region)) if region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()) => base,
        Some(_) => return None,
        None => first,
    };
    if base.len() != 2 {
        return None;
    }
    known_code(base)
}

pub fn language_of_url(raw: &str) -> Option<&'static str> {
    let url = Url::parse(raw).ok()?;
    language_of_path(url.path())
}

/// Strips a leading language segment, returning the bare path without a
/// leading slash.
pub fn strip_language(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    if language_of_path(trimmed).is_none() {
        return trimmed;
    }
    match trimmed.split_once('/') {
        Some((_, rest)) => rest,
        None => "",
    }
}
