//! Site URL arithmetic: relative links, external detection, closest candidate.

use url::Url;

/// Computes the relative URL to go from page `from` to target `to`.
///
/// Both URLs are site-relative. `to` may carry a fragment, which is kept.
///
/// ```
/// use mdbook_autorefs::relative_url;
///
/// assert_eq!(relative_url("a/b/index.html", "a/b/c/d.html#e"), "c/d.html#e");
/// assert_eq!(relative_url("a/b/", "a/c#d"), "../c#d");
/// ```
#[must_use]
pub fn relative_url(from: &str, to: &str) -> String {
    let (to_path, anchor) = match to.split_once('#') {
        Some((path, anchor)) => (path, Some(anchor)),
        None => (to, None),
    };

    let from_parts: Vec<&str> = from.split('/').collect();
    let to_parts: Vec<&str> = to_path.split('/').collect();

    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    // Go up once per directory left in `from`; its last segment is the page itself.
    let levels = (from_parts.len() - common).saturating_sub(1);
    let mut parts = vec![".."; levels];
    parts.extend_from_slice(&to_parts[common..]);

    let relative = parts.join("/");
    match anchor {
        Some(anchor) => format!("{relative}#{anchor}"),
        None => relative,
    }
}

/// Returns true if the URL has a scheme or a host, i.e. points outside the site.
#[must_use]
pub fn is_external(url: &str) -> bool {
    url.starts_with("//") || Url::parse(url).is_ok()
}

/// Splits a URL into path components the way a POSIX path would be.
fn path_parts(url: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    if url.starts_with('/') {
        parts.push("/");
    }
    parts.extend(url.split('/').filter(|part| !part.is_empty() && *part != "."));
    parts
}

/// Picks the candidate closest to `from_url`.
///
/// Starting from the referring page, walks up one path segment at a time until
/// some candidates live under the current base. Among those, the shallowest wins
/// and ties go to the earliest registered candidate.
///
/// Returns `None` when no candidate lives under any ancestor of `from_url`.
#[must_use]
pub fn closest_url<'a>(from_url: &str, urls: &'a [String]) -> Option<&'a str> {
    let mut base = path_parts(from_url);

    let candidates: Vec<&'a String> = loop {
        let matched: Vec<&'a String> = urls
            .iter()
            .filter(|url| path_parts(url).starts_with(&base))
            .collect();
        if !matched.is_empty() {
            break matched;
        }
        base.pop();
        if base.is_empty() || base == ["/"] {
            break Vec::new();
        }
    };

    let winner = match candidates.as_slice() {
        [] => return None,
        [only] => *only,
        _ => candidates
            .iter()
            .min_by_key(|url| url.matches('/').count())
            .copied()?,
    };
    log::debug!("Closest URL found: {winner} (from {from_url}, candidates: {urls:?})");
    Some(winner.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_relative_url_table() {
        let cases = [
            ("a/", "a#b", "#b"),
            ("a/", "a/b#c", "b#c"),
            ("a/b/", "a/b#c", "#c"),
            ("a/b/", "a/c#d", "../c#d"),
            ("a/b/", "a#c", "..#c"),
            ("a/b/c/", "d#e", "../../../d#e"),
            ("a/b/", "c/d/#e", "../../c/d/#e"),
            ("a/index.html", "a/index.html#b", "#b"),
            ("a/index.html", "a/b.html#c", "b.html#c"),
            ("a/b.html", "a/b.html#c", "#c"),
            ("a/b.html", "a/c.html#d", "c.html#d"),
            ("a/b.html", "a/index.html#c", "index.html#c"),
            ("a/b/c.html", "d.html#e", "../../d.html#e"),
            ("a/b.html", "c/d.html#e", "../c/d.html#e"),
            ("a/b/index.html", "a/b/c/d.html#e", "c/d.html#e"),
            ("", "#x", "#x"),
            ("a/", "#x", "../#x"),
            ("a/b.html", "#x", "../#x"),
            ("", "a/#x", "a/#x"),
            ("", "a/b.html#x", "a/b.html#x"),
        ];
        for (from, to, expected) in cases {
            assert_eq!(relative_url(from, to), expected, "from {from:?} to {to:?}");
        }
    }

    #[test]
    fn test_relative_url_without_fragment() {
        assert_eq!(relative_url("a/b.html", "c/d.html"), "../c/d.html");
    }

    #[test]
    fn test_relative_url_round_trip() {
        let from = "a/b/index.html";
        let to = "a/b/c/d.html#e";
        let relative = relative_url(from, to);

        // Resolve the relative URL against the directory of `from`.
        let mut dir: Vec<&str> = from.split('/').collect();
        dir.pop();
        for part in relative.split('/') {
            if part == ".." {
                dir.pop();
            } else {
                dir.push(part);
            }
        }
        assert_eq!(dir.join("/"), to);
    }

    #[test]
    fn test_is_external() {
        assert!(is_external("https://example.com"));
        assert!(is_external("https://example.org/bar.html#baz"));
        assert!(is_external("//cdn.example.com/x"));
        assert!(!is_external("foo.html#Foo"));
        assert!(!is_external("../foo.html#Foo"));
        assert!(!is_external("#x"));
    }

    #[test]
    fn test_closest_url() {
        let cases = [
            ("", &["x/#b", "#b"][..], "#b"),
            ("a/b", &["x/#e", "a/c/#e", "a/d/#e"][..], "a/c/#e"),
            ("a/b/", &["x/#e", "a/d/#e", "a/c/#e"][..], "a/d/#e"),
            ("a/b", &["x/#e", "a/c/#e", "a/c/d/#e"][..], "a/c/#e"),
            ("a/b/", &["x/#e", "a/c/d/#e", "a/c/#e"][..], "a/c/#e"),
            (
                "a/b/c",
                &["x/#e", "a/#e", "a/b/#e", "a/b/c/#e", "a/b/c/d/#e"][..],
                "a/b/c/#e",
            ),
            (
                "a/b/c/",
                &["x/#e", "a/#e", "a/b/#e", "a/b/c/d/#e", "a/b/c/#e"][..],
                "a/b/c/#e",
            ),
        ];
        for (base, candidates, expected) in cases {
            let candidates = urls(candidates);
            assert_eq!(
                closest_url(base, &candidates),
                Some(expected),
                "base {base:?}"
            );
        }
    }

    #[test]
    fn test_closest_url_not_found() {
        assert_eq!(closest_url("a", &urls(&["b/c/#d", "c/#d"])), None);
        assert_eq!(closest_url("a/", &urls(&["c/#d", "b/c/#d"])), None);
        assert_eq!(
            closest_url("/hello", &urls(&["foo.html#foo", "bar.html#foo"])),
            None
        );
    }
}
