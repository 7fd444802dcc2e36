//! # mdbook-autorefs
//!
//! An mdBook preprocessor that resolves cross-references to headings and
//! anchors anywhere in the book.
//!
//! ## Features
//!
//! - `[text][identifier]` links to the heading or anchor `identifier`, on any page
//! - `[identifier][]` and ``[`identifier`][]`` link with the text as identifier
//! - Anchors placed right before a heading (`<a id="alias"></a>`) point at that heading
//! - Identifiers defined on several pages resolve to the closest one, if enabled
//! - Identifiers can be mapped to external URLs in `book.toml`
//! - Optional backlinks: `{{#backlinks identifier}}` lists the sections referencing it
//!
//! ## Usage
//!
//! Add to your `book.toml`:
//!
//! ```toml
//! [preprocessor.autorefs]
//! resolve-closest = false
//! link-titles = "auto"
//! strip-title-tags = "auto"
//! record-backlinks = false
//!
//! [preprocessor.autorefs.urls]
//! "serde::Serialize" = "https://docs.rs/serde/latest/serde/trait.Serialize.html"
//! ```
//!
//! ## How it works
//!
//! Every chapter is converted first: references become `<autoref>` markers,
//! headings get ids, and every heading and anchor is registered. Once the whole
//! book is known, the markers are replaced by links, in parallel.

mod breadcrumbs;
pub mod config;
mod detector;
mod error;
mod marker;
mod registry;
mod rewriter;
mod scanner;
mod session;
mod urls;

pub use breadcrumbs::{
    Backlink, BacklinkCrumb, BacklinkIndex, BreadcrumbIndex, CrumbId, HeadingCrumb, REFERENCED_BY,
};
pub use config::Config;
pub use detector::{AutorefsHook, Reference, slugify};
pub use error::{Diagnostic, ResolveError, Tier};
pub use marker::{Marker, MarkerContext};
pub use registry::{AnchorRegistry, Fallback, ResolveOptions, Resolved};
pub use rewriter::{LinkTitles, RecordBacklink, RewriteOptions, Unmapped, fix_refs};
pub use session::{OutputFormat, Page, Session, SessionOptions};
pub use urls::{is_external, relative_url};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use mdbook_preprocessor::book::{Book, BookItem};
use mdbook_preprocessor::{Preprocessor, PreprocessorContext};
use rayon::prelude::*;
use regex::Regex;

static BACKLINKS_DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{#backlinks\s+(?P<identifiers>[^}]*?)\s*\}\}")
        .expect("backlinks directive pattern is valid")
});

static BACKLINKS_PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<autorefs-backlinks identifiers="(?P<identifiers>[^"]*)"></autorefs-backlinks>"#)
        .expect("backlinks placeholder pattern is valid")
});

/// mdBook preprocessor resolving cross-references throughout the book.
#[derive(Debug)]
pub struct AutorefsPreprocessor {
    config: Config,
}

impl AutorefsPreprocessor {
    /// Creates a new preprocessor instance from the given context.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration in `book.toml` is invalid.
    pub fn new(ctx: &PreprocessorContext) -> Result<Self> {
        let config = Config::from_context(ctx)?;
        Ok(Self { config })
    }

    /// Creates a preprocessor from an already parsed configuration.
    #[must_use]
    pub const fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Resolves every cross-reference of the book.
    ///
    /// # Errors
    ///
    /// Returns an error if a converted chapter cannot be written back as Markdown.
    pub fn process_book(&self, mut book: Book) -> Result<Book> {
        let session = Session::new(self.config.session_options());
        for (identifier, url) in self.config.urls() {
            session.registry().register_absolute(identifier, url);
        }

        // 1. Convert every chapter, registering headings and anchors.
        let mut pages = Vec::new();
        for (path, page, content) in collect_pages(&book) {
            let content = BACKLINKS_DIRECTIVE_RE.replace_all(&content, |caps: &regex::Captures<'_>| {
                format!(
                    r#"<autorefs-backlinks identifiers="{}"></autorefs-backlinks>"#,
                    html_escape::encode_double_quoted_attribute(&caps["identifiers"])
                )
            });
            let converted = session
                .convert_page(&page, &content, OutputFormat::Markdown)
                .with_context(|| format!("Failed to convert chapter {}", path.display()))?;
            pages.push((path, page, converted));
        }
        log::info!(
            "Registered {} identifiers from {} chapters",
            session.registry().len(),
            pages.len()
        );

        // 2. Every page is known: resolve the markers.
        let fixed: HashMap<PathBuf, String> = pages
            .par_iter()
            .map(|(path, page, converted)| {
                let fixed = session.fix_page(page, converted);
                (path.clone(), fixed)
            })
            .collect();

        // 3. Backlinks are complete once every page is fixed.
        let mut fixed: HashMap<PathBuf, String> = fixed
            .into_iter()
            .map(|(path, content)| {
                let url = chapter_url(&path);
                let content = render_backlinks(&session, &url, &content);
                (path, content)
            })
            .collect();

        let unmapped = session
            .diagnostics()
            .iter()
            .filter(|d| matches!(d, Diagnostic::Unmapped { .. }))
            .count();
        log::info!(
            "Resolved {} cross-references, {unmapped} could not be resolved",
            session.resolved_count()
        );

        book.for_each_mut(|item| {
            if let BookItem::Chapter(chapter) = item
                && let Some(path) = chapter.path.as_ref()
                && let Some(content) = fixed.remove(path)
            {
                chapter.content = content;
            }
        });

        Ok(book)
    }
}

impl Preprocessor for AutorefsPreprocessor {
    fn name(&self) -> &'static str {
        "autorefs"
    }

    fn run(&self, _ctx: &PreprocessorContext, book: Book) -> Result<Book> {
        self.process_book(book)
    }
}

/// Site URL of a chapter: its source path with an `.html` extension.
fn chapter_url(path: &Path) -> String {
    path.with_extension("html")
        .to_string_lossy()
        .replace('\\', "/")
}

/// Chapters in book order, each with its page and Markdown source.
///
/// Draft chapters have no page; their children hang under the nearest
/// enclosing chapter that has one.
fn collect_pages(book: &Book) -> Vec<(PathBuf, Arc<Page>, String)> {
    let mut pages = Vec::new();
    let mut ancestors: Vec<Option<Arc<Page>>> = Vec::new();

    for item in book.iter() {
        let BookItem::Chapter(chapter) = item else {
            continue;
        };
        ancestors.truncate(chapter.parent_names.len());
        let parent = ancestors.iter().rev().flatten().next().cloned();

        let Some(path) = chapter.path.as_ref() else {
            log::debug!("Skipping draft chapter: {}", chapter.name);
            ancestors.push(None);
            continue;
        };

        let mut page = Page::new(chapter_url(path), chapter.name.clone());
        if let Some(parent) = parent {
            page = page.with_parent(parent);
        }
        let page = Arc::new(page);
        ancestors.push(Some(Arc::clone(&page)));
        pages.push((path.clone(), page, chapter.content.clone()));
    }

    pages
}

/// Replaces backlink placeholders with the rendered backlinks.
fn render_backlinks(session: &Session, from_url: &str, content: &str) -> String {
    BACKLINKS_PLACEHOLDER_RE
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let identifiers = html_escape::decode_html_entities(&caps["identifiers"]).into_owned();
            let identifiers: Vec<&str> = identifiers.split_whitespace().collect();
            session.render_backlinks(&identifiers, from_url)
        })
        .into_owned()
}
