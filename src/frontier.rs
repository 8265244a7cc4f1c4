use std::collections::{HashMap, HashSet, VecDeque};

use url::{Host, Url};

use crate::normalize::{normalize_url, strip_www};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Address to fetch, on the crawl root's host.
    pub url: String,
    /// Normalized form used for deduplication and as the result URL.
    pub key: String,
    pub pattern: String,
}

/// FIFO queue of discovered URLs plus the set of every URL ever enqueued.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<String>,
    root_host: Option<String>,
}

impl Frontier {
    pub fn seeded(root: &str) -> Self {
        let mut frontier = Self {
            root_host: Url::parse(root)
                .ok()
                .and_then(|url| url.host_str().map(str::to_owned)),
            ..Self::default()
        };
        frontier.push(root);
        frontier
    }

    /// Enqueues `url` unless its normalized form was seen before.
    pub fn push(&mut self, url: &str) -> bool {
        let key = normalize_url(url);
        if !self.visited.insert(key.clone()) {
            return false;
        }
        let pattern = path_pattern(&key);
        self.queue.push_back(FrontierEntry {
            url: self.on_root_host(&key),
            key,
            pattern,
        });
        true
    }

    /// `www.` is only stripped for comparison; requests go to the host the
    /// crawl started on.
    fn on_root_host(&self, key: &str) -> String {
        let (Some(root_host), Ok(mut url)) = (self.root_host.as_deref(), Url::parse(key)) else {
            return key.to_owned();
        };
        let same_host = url
            .host_str()
            .is_some_and(|host| strip_www(host).eq_ignore_ascii_case(strip_www(root_host)));
        if same_host && url.host_str() != Some(root_host) && url.set_host(Some(root_host)).is_err() {
            return key.to_owned();
        }
        url.to_string()
    }

    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// Per-pattern crawl counts for one run. Counts only grow.
#[derive(Debug)]
pub struct PatternCounter {
    cap: usize,
    counts: HashMap<String, usize>,
}

impl PatternCounter {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            counts: HashMap::new(),
        }
    }

    /// Counts one more URL under `pattern` if it is below the cap.
    pub fn try_admit(&mut self, pattern: &str) -> bool {
        let count = self.counts.entry(pattern.to_owned()).or_default();
        if *count >= self.cap {
            return false;
        }
        *count += 1;
        true
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.counts.get(pattern).copied().unwrap_or(0)
    }
}

/// Path shape of a URL with numeric segments collapsed to `[id]` and opaque
/// slugs (after the first segment) collapsed to `[slug]`.
pub fn path_pattern(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_owned(),
        Err(_) => url.to_owned(),
    };
    let segments = path
        .split('/')
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(idx, segment)| {
            if is_id_segment(segment) {
                "[id]"
            } else if idx > 0 && is_slug_segment(segment) {
                "[slug]"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>();
    format!("/{}", segments.join("/"))
}

fn is_id_segment(segment: &str) -> bool {
    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    // uuid / hash-like
    let hexish = segment.chars().filter(|c| *c != '-').collect::<String>();
    hexish.len() >= 16
        && hexish.chars().all(|c| c.is_ascii_hexdigit())
        && hexish.chars().any(|c| c.is_ascii_digit())
}

fn is_slug_segment(segment: &str) -> bool {
    let words = segment.split(['-', '_']).filter(|w| !w.is_empty()).count();
    words >= 3 || (segment.len() > 24 && segment.chars().any(|c| c.is_ascii_digit()))
}

/// Basic host grammar check applied before a URL is enqueued.
pub fn is_valid_crawl_url(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host() {
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        Some(Host::Domain(domain)) => is_valid_domain(domain),
        None => false,
    }
}

pub fn is_valid_domain(domain: &str) -> bool {
    if domain.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    let labels = domain.split('.').collect::<Vec<_>>();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && (tld.chars().all(|c| c.is_ascii_alphabetic()) || tld.starts_with("xn--")));
    labels_ok && tld_ok
}
