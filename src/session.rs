//! Build session.
//!
//! A [`Session`] owns everything that lives for one build: the identifier
//! registry, breadcrumbs, backlinks and diagnostics. Pages go through it twice:
//! [`Session::convert_page`] while the site is converted, then
//! [`Session::fix_page`] once every page has been converted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use html_escape::{encode_double_quoted_attribute, encode_text};
use pulldown_cmark::Event;

use crate::breadcrumbs::{
    Backlink, BacklinkIndex, BreadcrumbIndex, CrumbId, HeadingCrumb, REFERENCED_BY,
};
use crate::detector::{self, AutorefsHook};
use crate::error::{Diagnostic, ResolveError, Tier};
use crate::registry::{AnchorRegistry, Fallback, ResolveOptions, Resolved};
use crate::rewriter::{self, RewriteOptions, Unmapped};
use crate::scanner::{self, Found};

/// A page of the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    url: String,
    title: String,
    parent: Option<Arc<Page>>,
}

impl Page {
    /// Creates a page from its site-relative URL and its title.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            parent: None,
        }
    }

    /// Sets the page this one is nested under in the navigation.
    #[must_use]
    pub fn with_parent(mut self, parent: Arc<Self>) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }
}

/// What [`Session::convert_page`] produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// CommonMark, for hosts that render Markdown themselves.
    #[default]
    Markdown,
    Html,
}

/// Build-wide behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Pick the URL nearest to the referring page when an identifier has several.
    pub resolve_closest: bool,
    /// Record which headings reference which identifiers.
    pub record_backlinks: bool,
    pub rewrite: RewriteOptions,
}

/// State shared by all pages of one build.
pub struct Session {
    options: SessionOptions,
    registry: AnchorRegistry,
    breadcrumbs: BreadcrumbIndex,
    backlinks: BacklinkIndex,
    diagnostics: Mutex<Vec<Diagnostic>>,
    resolved: AtomicUsize,
    hook: Option<Box<dyn AutorefsHook>>,
    fallback: Option<Box<Fallback>>,
}

impl Session {
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            registry: AnchorRegistry::new(),
            breadcrumbs: BreadcrumbIndex::new(),
            backlinks: BacklinkIndex::new(),
            diagnostics: Mutex::new(Vec::new()),
            resolved: AtomicUsize::new(0),
            hook: None,
            fallback: None,
        }
    }

    /// Installs a hook expanding identifiers and attaching context to markers.
    #[must_use]
    pub fn with_hook(mut self, hook: impl AutorefsHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Installs the alternate-spelling strategy, see [`Fallback`].
    #[must_use]
    pub fn with_fallback(
        mut self,
        fallback: impl Fn(&str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    #[must_use]
    pub const fn registry(&self) -> &AnchorRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn breadcrumbs(&self) -> &BreadcrumbIndex {
        &self.breadcrumbs
    }

    /// Converts one page: references become markers, headings get ids, and
    /// every heading and anchor is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be serialized back to Markdown.
    pub fn convert_page(&self, page: &Page, markdown: &str, format: OutputFormat) -> Result<String> {
        let events = self.convert_events(page, markdown);
        let mut output = String::with_capacity(markdown.len() + markdown.len() / 4);
        match format {
            OutputFormat::Markdown => {
                pulldown_cmark_to_cmark::cmark(events.iter(), &mut output)?;
            }
            OutputFormat::Html => pulldown_cmark::html::push_html(&mut output, events.into_iter()),
        }
        Ok(output)
    }

    /// Converts one page straight to HTML.
    #[must_use]
    pub fn render_html(&self, page: &Page, markdown: &str) -> String {
        let mut output = String::new();
        pulldown_cmark::html::push_html(&mut output, self.convert_events(page, markdown).into_iter());
        output
    }

    fn convert_events<'a>(&self, page: &Page, markdown: &'a str) -> Vec<Event<'a>> {
        let mut events = detector::parse(markdown);
        scanner::assign_heading_ids(&mut events);
        let found = scanner::scan_anchors(&events);
        self.register_page(page, &found);
        detector::emit_markers(events, self.hook.as_deref(), self.options.record_backlinks)
    }

    fn register_page(&self, page: &Page, found: &[Found]) {
        self.breadcrumbs.page_crumb(page);
        let mut outline: Vec<(u8, CrumbId)> = Vec::new();

        for item in found {
            match item {
                Found::Heading { id, title, level } => {
                    self.registry
                        .register_anchor(page.url(), id, None, Tier::Primary, Some(title.as_str()));

                    while outline.last().is_some_and(|(l, _)| l >= level) {
                        outline.pop();
                    }
                    let heading = HeadingCrumb {
                        id,
                        title,
                        level: *level,
                    };
                    let parent = outline.last().map(|(_, crumb)| *crumb);
                    let crumb = self.breadcrumbs.heading_crumb(page, heading, parent);
                    outline.push((*level, crumb));
                }
                Found::Anchor {
                    id,
                    alias_of,
                    title,
                } => self.registry.register_anchor(
                    page.url(),
                    id,
                    alias_of.as_deref(),
                    Tier::Primary,
                    title.as_deref(),
                ),
            }
        }
    }

    /// Resolves an identifier, relative to `from_url` when given.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] if the identifier is unknown.
    pub fn resolve(&self, identifier: &str, from_url: Option<&str>) -> Result<Resolved, ResolveError> {
        let mut diagnostics = Vec::new();
        let result = self
            .registry
            .resolve(identifier, &self.resolve_options(from_url), &mut diagnostics);
        self.record_diagnostics(diagnostics);
        result
    }

    fn resolve_options<'a>(&'a self, from_url: Option<&'a str>) -> ResolveOptions<'a> {
        ResolveOptions {
            from_url,
            resolve_closest: self.options.resolve_closest,
            fallback: self.fallback.as_deref(),
        }
    }

    /// Rewrites the markers of a converted page into links.
    ///
    /// Required references that resolve to nothing are logged and recorded as
    /// [`Diagnostic::Unmapped`]; their text is put back as written.
    pub fn fix_page(&self, page: &Page, content: &str) -> String {
        let mut diagnostics = Vec::new();
        let options = self.resolve_options(Some(page.url()));
        let record = |identifier: &str, kind: &str, anchor: &str| {
            self.record_backlink(identifier, kind, page.url(), anchor);
        };
        let record_backlink: Option<&dyn Fn(&str, &str, &str)> = if self.options.record_backlinks {
            Some(&record)
        } else {
            None
        };

        let mut resolved = 0;
        let (fixed, unmapped) = rewriter::fix_refs(
            content,
            |identifier| {
                let result = self.registry.resolve(identifier, &options, &mut diagnostics);
                resolved += usize::from(result.is_ok());
                result
            },
            record_backlink,
            self.options.rewrite,
        );
        self.resolved.fetch_add(resolved, Ordering::Relaxed);

        for Unmapped {
            identifier,
            context,
        } in unmapped
        {
            Diagnostic::Unmapped {
                page: page.url().to_string(),
                identifier,
                context,
            }
            .emit(&mut diagnostics);
        }
        self.record_diagnostics(diagnostics);
        fixed
    }

    /// Records a backlink, if the target is defined on the site.
    pub fn record_backlink(&self, identifier: &str, kind: &str, page_url: &str, anchor: &str) {
        if self.registry.contains(identifier) {
            self.backlinks.record(identifier, kind, page_url, anchor);
        }
    }

    /// Backlinks to any of `identifiers`, grouped by kind, with URLs relative to `from_url`.
    #[must_use]
    pub fn backlinks(&self, identifiers: &[&str], from_url: &str) -> BTreeMap<String, BTreeSet<Backlink>> {
        self.backlinks.query(identifiers, from_url, &self.breadcrumbs)
    }

    /// Renders the backlinks of `identifiers` as an HTML block.
    ///
    /// Returns an empty string when nothing references them.
    #[must_use]
    pub fn render_backlinks(&self, identifiers: &[&str], from_url: &str) -> String {
        if !self.options.record_backlinks {
            log::debug!("Backlinks are not recorded, skipping backlinks of {identifiers:?}");
            return String::new();
        }

        let backlinks = self.backlinks(identifiers, from_url);
        if backlinks.is_empty() {
            return String::new();
        }

        let mut html = String::from("<div class=\"autorefs-backlinks\">\n");
        for (kind, links) in &backlinks {
            html.push_str(&format!("<p><b>{}:</b></p>\n<ul>\n", kind_label(kind)));
            for backlink in links {
                html.push_str("<li>");
                for (i, crumb) in backlink.crumbs.iter().enumerate() {
                    if i > 0 {
                        html.push_str(" › ");
                    }
                    html.push_str(&format!(
                        r#"<a href="{}">{}</a>"#,
                        encode_double_quoted_attribute(&crumb.url),
                        encode_text(&crumb.title)
                    ));
                }
                html.push_str("</li>\n");
            }
            html.push_str("</ul>\n");
        }
        html.push_str("</div>\n");
        html
    }

    /// Number of references resolved by [`Session::fix_page`] so far.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.load(Ordering::Relaxed)
    }

    /// Diagnostics recorded so far, in the order they were emitted.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_diagnostics(&self, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(diagnostics);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

/// "referenced-by" reads "Referenced by".
fn kind_label(kind: &str) -> String {
    if kind == REFERENCED_BY {
        return "Referenced by".to_string();
    }
    let mut label = kind.replace('-', " ");
    if let Some(first) = label.get(..1) {
        let upper = first.to_uppercase();
        label.replace_range(..1, &upper);
    }
    label
}
