use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub crawl: CrawlSettings,
    pub timeouts: TimeoutSettings,
    pub scoring: ScoringRules,
    pub storage: StorageSettings,
}

impl Settings {
    /// Defaults, then the optional YAML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .with_context(|| format!("read config: {}", path.display()))?;
                serde_yaml::from_str::<Settings>(&yaml)
                    .with_context(|| format!("parse config: {}", path.display()))?
            }
            None => Settings::default(),
        };
        settings
            .crawl
            .apply_env(|key| std::env::var(key).ok())
            .context("apply environment overrides")?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub page_budget: usize,
    pub concurrency: usize,
    pub pattern_cap: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            page_budget: 1000,
            concurrency: 5,
            pattern_cap: 50,
        }
    }
}

impl CrawlSettings {
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        for (key, slot) in [
            ("SITESCORE_PAGE_BUDGET", &mut self.page_budget),
            ("SITESCORE_CONCURRENCY", &mut self.concurrency),
            ("SITESCORE_PATTERN_CAP", &mut self.pattern_cap),
        ] {
            if let Some(raw) = lookup(key) {
                *slot = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid {key}={raw:?}"))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub http_secs: u64,
    pub navigation_secs: u64,
    pub probe_secs: u64,
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            http_secs: 15,
            navigation_secs: 45,
            probe_secs: 10,
            settle_min_ms: 2000,
            settle_max_ms: 5000,
        }
    }
}

impl TimeoutSettings {
    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn settle_min(&self) -> Duration {
        Duration::from_millis(self.settle_min_ms)
    }

    pub fn settle_max(&self) -> Duration {
        Duration::from_millis(self.settle_max_ms.max(self.settle_min_ms))
    }
}

/// Heuristic constants for the page scorer and the score blend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub missing_title: u32,
    pub long_title: u32,
    pub short_title: u32,
    pub title_min_chars: usize,
    pub title_max_chars: usize,

    pub missing_meta_description: u32,
    pub long_meta_description: u32,
    pub short_meta_description: u32,
    pub meta_min_chars: usize,
    pub meta_max_chars: usize,

    pub missing_h1: u32,
    pub multiple_h1: u32,

    pub image_without_alt: u32,
    pub image_without_alt_cap: u32,

    pub thin_content: u32,
    pub thin_content_words: usize,

    pub missing_structured_data: u32,

    pub quantitative_weight: f64,
    pub qualitative_weight: f64,
    pub degraded_floor_score: u8,
    pub neutral_qualitative_score: u8,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            missing_title: 10,
            long_title: 5,
            short_title: 5,
            title_min_chars: 30,
            title_max_chars: 60,

            missing_meta_description: 10,
            long_meta_description: 5,
            short_meta_description: 5,
            meta_min_chars: 70,
            meta_max_chars: 160,

            missing_h1: 15,
            multiple_h1: 10,

            image_without_alt: 2,
            image_without_alt_cap: 10,

            thin_content: 15,
            thin_content_words: 300,

            missing_structured_data: 10,

            quantitative_weight: 0.4,
            qualitative_weight: 0.6,
            degraded_floor_score: 30,
            neutral_qualitative_score: 50,
        }
    }
}

impl ScoringRules {
    pub fn blend(&self, quantitative: u8, qualitative: u8) -> u8 {
        let total = self.quantitative_weight + self.qualitative_weight;
        if total <= 0.0 {
            return quantitative;
        }
        let blended = (f64::from(quantitative) * self.quantitative_weight
            + f64::from(qualitative) * self.qualitative_weight)
            / total;
        blended.round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub page_batch_size: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { page_batch_size: 20 }
    }
}
