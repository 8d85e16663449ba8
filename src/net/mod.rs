pub mod client;

/// Result-page hrefs are protocol-relative ("//danbooru.donmai.us/...");
/// normalize them before fetching.
pub fn absolute_url(href: &str) -> String {
    if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    }
}

/// Extract the host portion of a URL without a full URL parser; enough for
/// matching against the no-tags host list.
pub fn host_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("https:")
        .or_else(|| url.strip_prefix("http:"))
        .unwrap_or(url);
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    rest.split('/').next().unwrap_or_default()
}
