use url::Url;

/// Canonical form of an absolute URL. Returns the input unchanged when it
/// does not parse.
///
/// Leading `www.` labels and trailing slashes are stripped until none remain,
/// so `normalize_url(normalize_url(u)) == normalize_url(u)`.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => normalize_parsed(&url).to_string(),
        Err(_) => raw.to_owned(),
    }
}

pub fn normalize_parsed(url: &Url) -> Url {
    let mut normalized = url.clone();

    if let Some(host) = url.host_str() {
        let bare = strip_www(host);
        if bare.len() != host.len() && !bare.is_empty() {
            // An invalid remainder keeps the original host.
            let _ = normalized.set_host(Some(bare));
        }
    }

    let path = normalized.path().to_owned();
    let trimmed = path.trim_end_matches('/');
    if trimmed.len() != path.len() {
        if trimmed.is_empty() {
            normalized.set_path("/");
        } else {
            normalized.set_path(trimmed);
        }
    }

    normalized.set_fragment(None);

    if normalized.query().is_some() {
        let mut pairs = normalized
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect::<Vec<_>>();
        if pairs.is_empty() {
            normalized.set_query(None);
        } else {
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            normalized.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }

    normalized
}

pub fn strip_www(host: &str) -> &str {
    let mut host = host;
    while let Some(rest) = host.strip_prefix("www.") {
        host = rest;
    }
    host
}
