//! Navigation breadcrumbs and the backlink index.
//!
//! Breadcrumbs are created lazily while anchors are registered and memoized by
//! URL. Each one points at its parent through an index into the arena, so a
//! backlink chain is materialized by walking parents up to the site root.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::session::Page;
use crate::urls::relative_url;

/// Backlink kind recorded for plain references.
pub const REFERENCED_BY: &str = "referenced-by";

/// One step of a backlink chain, as handed to page templates.
///
/// Two crumbs are equal, and ordered, by URL alone.
#[derive(Debug, Clone)]
pub struct BacklinkCrumb {
    pub title: String,
    pub url: String,
}

impl PartialEq for BacklinkCrumb {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for BacklinkCrumb {}

impl Hash for BacklinkCrumb {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl PartialOrd for BacklinkCrumb {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BacklinkCrumb {
    fn cmp(&self, other: &Self) -> Ordering {
        self.url.cmp(&other.url)
    }
}

/// A navigation path from the site root down to a referencing anchor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Backlink {
    pub crumbs: Vec<BacklinkCrumb>,
}

/// Handle to a breadcrumb stored in a [`BreadcrumbIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrumbId(usize);

/// A heading as seen by the breadcrumb index.
#[derive(Debug, Clone, Copy)]
pub struct HeadingCrumb<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub level: u8,
}

#[derive(Debug)]
struct Crumb {
    title: String,
    url: String,
    parent: Option<CrumbId>,
}

#[derive(Debug, Default)]
struct Arena {
    crumbs: Vec<Crumb>,
    by_url: HashMap<String, CrumbId>,
}

impl Arena {
    fn insert(&mut self, title: &str, url: String, parent: Option<CrumbId>) -> CrumbId {
        let id = CrumbId(self.crumbs.len());
        self.by_url.insert(url.clone(), id);
        self.crumbs.push(Crumb {
            title: title.to_string(),
            url,
            parent,
        });
        id
    }

    fn page(&mut self, page: &Page) -> CrumbId {
        if let Some(&id) = self.by_url.get(page.url()) {
            return id;
        }
        let parent = page.parent().map(|parent| self.page(parent));
        self.insert(page.title(), page.url().to_string(), parent)
    }

    fn parent_of(&self, id: CrumbId) -> Option<CrumbId> {
        self.crumbs.get(id.0).and_then(|crumb| crumb.parent)
    }
}

/// Memoized breadcrumbs for every page and heading of the build.
#[derive(Debug, Default)]
pub struct BreadcrumbIndex {
    arena: RwLock<Arena>,
}

impl BreadcrumbIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breadcrumb of a page, creating it and its ancestors if needed.
    pub fn page_crumb(&self, page: &Page) -> CrumbId {
        self.arena
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .page(page)
    }

    /// Returns the breadcrumb of a heading on a page.
    ///
    /// `parent` is the breadcrumb of the enclosing heading, if any; otherwise the
    /// page breadcrumb is used. Level-1 headings skip the page breadcrumb so the
    /// chain does not repeat the page title.
    pub fn heading_crumb(
        &self,
        page: &Page,
        heading: HeadingCrumb<'_>,
        parent: Option<CrumbId>,
    ) -> CrumbId {
        let mut arena = self.arena.write().unwrap_or_else(PoisonError::into_inner);
        let url = format!("{}#{}", page.url(), heading.id);
        if let Some(&id) = arena.by_url.get(&url) {
            return id;
        }

        let parent = parent.unwrap_or_else(|| arena.page(page));
        let parent = if heading.level == 1 {
            arena.parent_of(parent)
        } else {
            Some(parent)
        };
        arena.insert(heading.title, url, parent)
    }

    /// Materializes the chain ending at `url`, root first, with URLs relative to `from_url`.
    #[must_use]
    pub fn backlink(&self, url: &str, from_url: &str) -> Option<Backlink> {
        let arena = self.arena.read().unwrap_or_else(PoisonError::into_inner);
        let Some(&start) = arena.by_url.get(url) else {
            log::debug!("No breadcrumb for backlink URL {url}");
            return None;
        };

        let mut crumbs = Vec::new();
        let mut current = Some(start);
        while let Some(crumb) = current.and_then(|id| arena.crumbs.get(id.0)) {
            crumbs.push(BacklinkCrumb {
                title: crumb.title.clone(),
                url: relative_url(from_url, &crumb.url),
            });
            current = crumb.parent;
        }
        crumbs.reverse();
        Some(Backlink { crumbs })
    }
}

/// Incoming references, keyed by target identifier then backlink kind.
///
/// Values are `page_url#anchor` of the referencing location.
#[derive(Debug, Default)]
pub struct BacklinkIndex {
    records: Mutex<HashMap<String, BTreeMap<String, BTreeSet<String>>>>,
}

impl BacklinkIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `page_url#anchor` references `identifier`.
    pub fn record(&self, identifier: &str, kind: &str, page_url: &str, anchor: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(identifier.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default()
            .insert(format!("{page_url}#{anchor}"));
    }

    /// Returns true if any backlink was recorded for the identifier.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identifier)
    }

    /// Collects the backlinks of several identifiers, grouped by kind.
    #[must_use]
    pub fn query(
        &self,
        identifiers: &[&str],
        from_url: &str,
        breadcrumbs: &BreadcrumbIndex,
    ) -> BTreeMap<String, BTreeSet<Backlink>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut backlinks: BTreeMap<String, BTreeSet<Backlink>> = BTreeMap::new();

        for identifier in identifiers {
            let Some(kinds) = records.get(*identifier) else {
                continue;
            };
            for (kind, urls) in kinds {
                for url in urls {
                    if let Some(backlink) = breadcrumbs.backlink(url, from_url) {
                        backlinks.entry(kind.clone()).or_default().insert(backlink);
                    }
                }
            }
        }
        backlinks
    }
}
