//! Link extraction and same-host comparison.
//!
//! Youtube/vimeo links are excluded by checking whether the *host* starts
//! with one of those names, matching the original `(?!youtube|vimeo)`
//! lookahead right after the scheme — that lookahead only ever looks at
//! what comes immediately after `://`, not the whole URL, so
//! `https://www.youtube.com/...` and `https://example.com/?via=youtube`
//! both survive it. The `regex` crate has no lookaround, so this is
//! applied as a post-match check on the parsed host instead of folded
//! into the match itself.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https?://(?:[a-zA-Z0-9$\-_@.&+!*'(),]|%[0-9a-fA-F]{2})+").unwrap()
    })
}

/// Whether `url`'s host starts with `youtube` or `vimeo`, case-insensitively.
fn has_excluded_host(url: &str) -> bool {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    host.starts_with("youtube") || host.starts_with("vimeo")
}

/// Every `http(s)://` URL found in `content`, excluding youtube/vimeo links,
/// in the order they appear.
pub fn links(content: &str) -> Vec<String> {
    url_regex()
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .filter(|url| !has_excluded_host(url))
        .collect()
}

/// The `scheme://host:port` authority of a URL, or `None` if it doesn't
/// parse. Corresponds to `urlparse(url).netloc`.
pub fn netloc(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| {
        let host = u.host_str().unwrap_or_default();
        match u.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    })
}

/// Whether two URLs share the same host (and, if present, port).
pub fn same_domain(url1: &str, url2: &str) -> bool {
    match (netloc(url1), netloc(url2)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_links_in_order() {
        let content = r#"<a href="https://example.com/a">a</a> text <a href="http://example.org/b">b</a>"#;
        assert_eq!(
            links(content),
            vec!["https://example.com/a", "http://example.org/b"]
        );
    }

    #[test]
    fn excludes_only_hosts_that_start_with_youtube_or_vimeo() {
        let content = "https://youtube.com/watch https://vimeo.com/123 \
                        https://www.youtube.com/watch https://example.com/share-youtube";
        assert_eq!(
            links(content),
            vec![
                "https://www.youtube.com/watch",
                "https://example.com/share-youtube",
            ]
        );
    }

    #[test]
    fn same_domain_ignores_path() {
        assert!(same_domain(
            "https://github.com/asd/vsd",
            "https://github.com/jjjd/asd"
        ));
        assert!(!same_domain("https://github.com", "https://gitlab.com"));
    }

    #[test]
    fn netloc_includes_explicit_port() {
        assert_eq!(
            netloc("https://example.com:8080/a"),
            Some("example.com:8080".to_string())
        );
    }
}
