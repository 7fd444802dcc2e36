//! Identifier registry and URL resolution.
//!
//! Every place an identifier can resolve to is collected here while pages are
//! converted. Identifiers map to candidate URLs in two tiers:
//!
//! - a *primary* URL is the definition site of the identifier (a heading, an anchor);
//! - a *secondary* URL is an alias of an identifier, pointing at the same place
//!   as some primary URL.
//!
//! A third table maps identifiers to absolute URLs outside the site. It is only
//! consulted when neither tier knows the identifier.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Diagnostic, ResolveError, Tier};
use crate::urls::{closest_url, is_external, relative_url};

/// Alternate-spelling strategy consulted when an identifier is unknown.
///
/// Compatibility shim for hosts that still supply alternate identifiers. It is
/// slated for removal: register secondary anchors instead.
pub type Fallback = dyn Fn(&str) -> Vec<String> + Send + Sync;

/// How a lookup should pick among candidates.
#[derive(Clone, Copy, Default)]
pub struct ResolveOptions<'a> {
    /// Site-relative URL of the referring page. When set, site-relative results
    /// are made relative to it.
    pub from_url: Option<&'a str>,
    /// Disambiguate multiple primary URLs by proximity instead of taking the first.
    pub resolve_closest: bool,
    /// See [`Fallback`].
    pub fallback: Option<&'a Fallback>,
}

/// A resolved reference target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub url: String,
    /// Title of the anchor the URL points at, if one was registered.
    pub title: Option<String>,
}

#[derive(Debug, Default)]
struct UrlMaps {
    primary: HashMap<String, Vec<String>>,
    secondary: HashMap<String, Vec<String>>,
    titles: HashMap<String, String>,
    absolute: HashMap<String, String>,
}

impl UrlMaps {
    fn tier_mut(&mut self, tier: Tier) -> &mut HashMap<String, Vec<String>> {
        match tier {
            Tier::Primary => &mut self.primary,
            Tier::Secondary => &mut self.secondary,
        }
    }
}

/// Build-wide registry of identifiers.
///
/// Registration and lookup take `&self`; the maps are guarded by a lock so pages
/// may register anchors from several threads.
#[derive(Debug, Default)]
pub struct AnchorRegistry {
    maps: RwLock<UrlMaps>,
}

impl AnchorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, UrlMaps> {
        self.maps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, UrlMaps> {
        self.maps.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers that `identifier` can be found on `page_url`.
    ///
    /// The destination is `page_url#anchor`, or `page_url#identifier` when no
    /// anchor is given. A destination already registered for the identifier in
    /// that tier is not added twice. The first title registered for a
    /// destination wins.
    pub fn register_anchor(
        &self,
        page_url: &str,
        identifier: &str,
        anchor: Option<&str>,
        tier: Tier,
        title: Option<&str>,
    ) {
        let url = format!("{page_url}#{}", anchor.unwrap_or(identifier));
        let mut maps = self.write();

        let urls = maps.tier_mut(tier).entry(identifier.to_string()).or_default();
        if !urls.contains(&url) {
            urls.push(url.clone());
        }

        if let Some(title) = title.filter(|t| !t.is_empty()) {
            maps.titles.entry(url).or_insert_with(|| title.to_string());
        }
    }

    /// Registers an absolute URL for an identifier, replacing any previous one.
    pub fn register_absolute(&self, identifier: &str, url: &str) {
        self.write()
            .absolute
            .insert(identifier.to_string(), url.to_string());
    }

    /// Returns true if the identifier is defined on the site (either tier).
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        let maps = self.read();
        maps.primary.contains_key(identifier) || maps.secondary.contains_key(identifier)
    }

    /// Returns the candidate URLs registered for an identifier in a tier.
    #[must_use]
    pub fn urls(&self, identifier: &str, tier: Tier) -> Vec<String> {
        let maps = self.read();
        let map = match tier {
            Tier::Primary => &maps.primary,
            Tier::Secondary => &maps.secondary,
        };
        map.get(identifier).cloned().unwrap_or_default()
    }

    /// Number of distinct identifiers defined on the site.
    #[must_use]
    pub fn len(&self) -> usize {
        let maps = self.read();
        maps.primary.len()
            + maps
                .secondary
                .keys()
                .filter(|identifier| !maps.primary.contains_key(*identifier))
                .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves an identifier to a URL and the title of its anchor.
    ///
    /// Lookup order is primary tier, secondary tier, absolute table, then the
    /// fallback strategy. Warnings about ambiguous identifiers go to `diagnostics`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] if no lookup step knows the identifier.
    pub fn resolve(
        &self,
        identifier: &str,
        options: &ResolveOptions<'_>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Resolved, ResolveError> {
        let url = self.item_url(identifier, options, diagnostics)?;
        let title = self.read().titles.get(&url).cloned();

        let url = match options.from_url {
            Some(from_url) if !is_external(&url) => relative_url(from_url, &url),
            _ => url,
        };
        Ok(Resolved { url, title })
    }

    fn candidates(&self, identifier: &str) -> Option<(Vec<String>, Tier)> {
        let maps = self.read();
        if let Some(urls) = maps.primary.get(identifier) {
            return Some((urls.clone(), Tier::Primary));
        }
        maps.secondary
            .get(identifier)
            .map(|urls| (urls.clone(), Tier::Secondary))
    }

    fn item_url(
        &self,
        identifier: &str,
        options: &ResolveOptions<'_>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<String, ResolveError> {
        let Some((urls, tier)) = self.candidates(identifier) else {
            if let Some(url) = self.read().absolute.get(identifier) {
                return Ok(url.clone());
            }
            return self.fallback_url(identifier, options, diagnostics);
        };

        let first = urls.first().cloned().ok_or_else(|| not_found(identifier))?;
        if urls.len() == 1 {
            return Ok(first);
        }

        if (options.resolve_closest || tier == Tier::Secondary)
            && let Some(from_url) = options.from_url
        {
            if let Some(url) = closest_url(from_url, &urls) {
                return Ok(url.to_string());
            }
            Diagnostic::ClosestNotFound {
                tier,
                from_url: from_url.to_string(),
                urls,
            }
            .emit(diagnostics);
            return Ok(first);
        }

        Diagnostic::MultipleUrls {
            tier,
            identifier: identifier.to_string(),
            urls,
        }
        .emit(diagnostics);
        Ok(first)
    }

    fn fallback_url(
        &self,
        identifier: &str,
        options: &ResolveOptions<'_>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<String, ResolveError> {
        let Some(fallback) = options.fallback else {
            return Err(not_found(identifier));
        };

        // Alternatives are looked up plainly: no proximity, no further fallback.
        let plain = ResolveOptions {
            resolve_closest: options.resolve_closest,
            ..ResolveOptions::default()
        };
        for alternative in fallback(identifier) {
            if let Ok(url) = self.item_url(&alternative, &plain, diagnostics) {
                self.write()
                    .secondary
                    .insert(identifier.to_string(), vec![url.clone()]);
                return Ok(url);
            }
        }
        Err(not_found(identifier))
    }
}

fn not_found(identifier: &str) -> ResolveError {
    ResolveError::NotFound {
        identifier: identifier.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(registry: &AnchorRegistry, identifier: &str) -> Result<Resolved, ResolveError> {
        registry.resolve(identifier, &ResolveOptions::default(), &mut Vec::new())
    }

    #[test]
    fn test_url_registration() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo1.html", "foo", None, Tier::Primary, None);
        registry.register_absolute("bar", "https://example.org/bar.html");

        assert_eq!(resolve(&registry, "foo").unwrap().url, "foo1.html#foo");
        assert_eq!(
            resolve(&registry, "bar").unwrap().url,
            "https://example.org/bar.html"
        );
        assert_eq!(
            resolve(&registry, "baz"),
            Err(ResolveError::NotFound {
                identifier: "baz".to_string()
            })
        );
    }

    #[test]
    fn test_url_registration_with_from_url() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo1.html", "foo", None, Tier::Primary, None);
        registry.register_absolute("bar", "https://example.org/bar.html");
        let options = ResolveOptions {
            from_url: Some("a/b.html"),
            ..ResolveOptions::default()
        };

        let mut diagnostics = Vec::new();
        assert_eq!(
            registry.resolve("foo", &options, &mut diagnostics).unwrap().url,
            "../foo1.html#foo"
        );
        assert_eq!(
            registry.resolve("bar", &options, &mut diagnostics).unwrap().url,
            "https://example.org/bar.html"
        );
        assert!(registry.resolve("baz", &options, &mut diagnostics).is_err());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo.html", "foo", Some("bar"), Tier::Primary, None);
        registry.register_anchor("foo.html", "foo", Some("bar"), Tier::Primary, None);
        assert_eq!(registry.urls("foo", Tier::Primary), vec!["foo.html#bar"]);
    }

    #[test]
    fn test_register_secondary_url() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo.html", "foo", None, Tier::Secondary, None);
        assert_eq!(registry.urls("foo", Tier::Secondary), vec!["foo.html#foo"]);
        assert!(registry.urls("foo", Tier::Primary).is_empty());
        assert!(registry.contains("foo"));
    }

    #[test]
    fn test_first_title_wins() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo.html", "foo", None, Tier::Primary, Some("Foo"));
        registry.register_anchor("foo.html", "foo", None, Tier::Primary, Some("Other"));
        assert_eq!(
            resolve(&registry, "foo").unwrap().title.as_deref(),
            Some("Foo")
        );
    }

    #[test]
    fn test_primary_wins_over_secondary_without_warning() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("a.html", "foo", None, Tier::Secondary, None);
        registry.register_anchor("b.html", "foo", None, Tier::Secondary, None);
        registry.register_anchor("c.html", "foo", None, Tier::Primary, None);

        let mut diagnostics = Vec::new();
        let resolved = registry
            .resolve("foo", &ResolveOptions::default(), &mut diagnostics)
            .unwrap();
        assert_eq!(resolved.url, "c.html#foo");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_absolute_only_when_no_tier_matches() {
        let registry = AnchorRegistry::new();
        registry.register_absolute("foo", "https://example.org/foo");
        registry.register_anchor("foo.html", "foo", None, Tier::Secondary, None);
        assert_eq!(resolve(&registry, "foo").unwrap().url, "foo.html#foo");
        assert!(!registry.contains("bar"));
    }

    #[test]
    fn test_unique_primary_never_warns() {
        for resolve_closest in [false, true] {
            let registry = AnchorRegistry::new();
            registry.register_anchor("x/y.html", "foo", None, Tier::Primary, None);
            let options = ResolveOptions {
                from_url: Some("a/b.html"),
                resolve_closest,
                fallback: None,
            };
            let mut diagnostics = Vec::new();
            let resolved = registry.resolve("foo", &options, &mut diagnostics).unwrap();
            assert_eq!(resolved.url, "../x/y.html#foo");
            assert!(diagnostics.is_empty());
        }
    }

    #[test]
    fn test_warn_multiple_urls() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo.html", "foo", None, Tier::Primary, None);
        registry.register_anchor("bar.html", "foo", None, Tier::Primary, None);
        let options = ResolveOptions {
            from_url: Some("/hello"),
            ..ResolveOptions::default()
        };

        let mut diagnostics = Vec::new();
        registry.resolve("foo", &options, &mut diagnostics).unwrap();
        assert_eq!(
            diagnostics,
            vec![Diagnostic::MultipleUrls {
                tier: Tier::Primary,
                identifier: "foo".to_string(),
                urls: vec!["foo.html#foo".to_string(), "bar.html#foo".to_string()],
            }]
        );
    }

    #[test]
    fn test_use_closest_url_suppresses_warning() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("x/page.html", "e", None, Tier::Primary, None);
        registry.register_anchor("a/c/page.html", "e", None, Tier::Primary, None);
        registry.register_anchor("a/d/page.html", "e", None, Tier::Primary, None);
        let options = ResolveOptions {
            from_url: Some("a/b/page.html"),
            resolve_closest: true,
            fallback: None,
        };

        let mut diagnostics = Vec::new();
        let resolved = registry.resolve("e", &options, &mut diagnostics).unwrap();
        assert_eq!(resolved.url, "../c/page.html#e");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_closest_not_found_uses_first() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo.html", "foo", None, Tier::Primary, None);
        registry.register_anchor("bar.html", "foo", None, Tier::Primary, None);
        let options = ResolveOptions {
            from_url: Some("/hello"),
            resolve_closest: true,
            fallback: None,
        };

        let mut diagnostics = Vec::new();
        let resolved = registry.resolve("foo", &options, &mut diagnostics).unwrap();
        assert_eq!(resolved.url, "../foo.html#foo");
        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::ClosestNotFound { tier: Tier::Primary, .. }]
        ));
    }

    #[test]
    fn test_secondary_always_uses_closest() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("x/page.html", "foo", None, Tier::Secondary, None);
        registry.register_anchor("a/page.html", "foo", None, Tier::Secondary, None);
        let options = ResolveOptions {
            from_url: Some("a/other.html"),
            ..ResolveOptions::default()
        };

        let mut diagnostics = Vec::new();
        let resolved = registry.resolve("foo", &options, &mut diagnostics).unwrap();
        assert_eq!(resolved.url, "page.html#foo");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_url_registration_with_fallback() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo1.html", "foo", None, Tier::Primary, None);
        registry.register_absolute("bar", "https://example.org/bar.html");

        let to_foo = |_: &str| vec!["foo".to_string()];
        let to_bar = |_: &str| vec!["bar".to_string()];
        let to_nothing = |_: &str| vec!["baaaa".to_string()];
        let lookup = |identifier: &str, fallback: &Fallback| {
            let options = ResolveOptions {
                fallback: Some(fallback),
                ..ResolveOptions::default()
            };
            registry
                .resolve(identifier, &options, &mut Vec::new())
                .map(|resolved| resolved.url)
        };

        assert_eq!(lookup("baz", &to_foo).unwrap(), "foo1.html#foo");
        // Memoized: the fallback is not consulted again.
        assert_eq!(lookup("baz", &to_bar).unwrap(), "foo1.html#foo");
        assert_eq!(registry.urls("baz", Tier::Secondary), vec!["foo1.html#foo"]);
        assert_eq!(lookup("qux", &to_bar).unwrap(), "https://example.org/bar.html");
        assert!(lookup("foobar", &to_nothing).is_err());
        assert!(lookup("foobar", &|_: &str| Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_dont_make_relative_urls_relative_again() {
        let registry = AnchorRegistry::new();
        registry.register_anchor("foo/bar/baz.html", "foo.bar.baz", None, Tier::Primary, None);
        let options = ResolveOptions {
            from_url: Some("baz/bar/foo.html"),
            ..ResolveOptions::default()
        };
        for _ in 0..2 {
            assert_eq!(
                registry
                    .resolve("foo.bar.baz", &options, &mut Vec::new())
                    .unwrap()
                    .url,
                "../../foo/bar/baz.html#foo.bar.baz"
            );
        }
    }

    #[test]
    fn test_len_counts_distinct_identifiers() {
        let registry = AnchorRegistry::new();
        assert!(registry.is_empty());
        registry.register_anchor("a.html", "foo", None, Tier::Primary, None);
        registry.register_anchor("b.html", "foo", None, Tier::Secondary, None);
        registry.register_anchor("b.html", "bar", None, Tier::Secondary, None);
        assert_eq!(registry.len(), 2);
    }
}
