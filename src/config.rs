//! Configuration parsing for the autorefs preprocessor.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use mdbook_preprocessor::PreprocessorContext;
use serde::Deserialize;

use crate::rewriter::{LinkTitles, RewriteOptions};
use crate::session::SessionOptions;

/// Configuration for the autorefs preprocessor.
///
/// All fields are private to allow future changes without breaking the API.
/// Use the getter methods to access configuration values. It deserializes
/// from the same keys as the `[preprocessor.autorefs]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawConfig")]
pub struct Config {
    /// Whether to pick the closest URL when an identifier has several.
    resolve_closest: bool,
    /// When links get a title attribute.
    link_titles: LinkTitles,
    /// Whether to strip HTML tags from link titles.
    strip_title_tags: bool,
    /// Whether to record backlinks.
    record_backlinks: bool,
    /// Identifiers mapped to absolute URLs outside the book.
    urls: BTreeMap<String, String>,
}

/// A setting that is either a plain boolean or a named mode.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Setting<M> {
    Bool(bool),
    Mode(M),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LinkTitlesMode {
    Auto,
    External,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AutoMode {
    Auto,
}

/// Raw configuration as deserialized from book.toml.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    resolve_closest: Option<bool>,
    link_titles: Option<Setting<LinkTitlesMode>>,
    strip_title_tags: Option<Setting<AutoMode>>,
    record_backlinks: Option<bool>,
    urls: Option<BTreeMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from(RawConfig::default())
    }
}

impl From<RawConfig> for Config {
    /// mdBook has no theme showing rich link previews, so `"auto"` always
    /// resolves to plain titles shown on every link.
    fn from(raw: RawConfig) -> Self {
        let link_titles = match raw.link_titles {
            None | Some(Setting::Bool(true) | Setting::Mode(LinkTitlesMode::Auto)) => {
                LinkTitles::Always
            }
            Some(Setting::Bool(false)) => LinkTitles::Never,
            Some(Setting::Mode(LinkTitlesMode::External)) => LinkTitles::External,
        };
        let strip_title_tags = match raw.strip_title_tags {
            None | Some(Setting::Mode(AutoMode::Auto)) => true,
            Some(Setting::Bool(strip)) => strip,
        };

        Self {
            resolve_closest: raw.resolve_closest.unwrap_or(false),
            link_titles,
            strip_title_tags,
            record_backlinks: raw.record_backlinks.unwrap_or(false),
            urls: raw.urls.unwrap_or_default(),
        }
    }
}

impl Config {
    /// Creates configuration from the preprocessor context.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration in `book.toml` is malformed.
    pub fn from_context(ctx: &PreprocessorContext) -> Result<Self> {
        let preprocessors: BTreeMap<String, RawConfig> = ctx
            .config
            .preprocessors()
            .context("Failed to parse preprocessor configuration")?;

        let raw = preprocessors.get("autorefs").cloned().unwrap_or_default();
        Ok(Self::from(raw))
    }

    /// Returns true if ambiguous identifiers resolve to the closest URL.
    #[must_use]
    pub const fn resolve_closest(&self) -> bool {
        self.resolve_closest
    }

    /// Returns the link title policy.
    #[must_use]
    pub const fn link_titles(&self) -> LinkTitles {
        self.link_titles
    }

    /// Returns true if HTML tags are stripped from link titles.
    #[must_use]
    pub const fn strip_title_tags(&self) -> bool {
        self.strip_title_tags
    }

    /// Returns true if backlinks are recorded.
    #[must_use]
    pub const fn record_backlinks(&self) -> bool {
        self.record_backlinks
    }

    /// Returns the configured absolute URLs, by identifier.
    #[must_use]
    pub const fn urls(&self) -> &BTreeMap<String, String> {
        &self.urls
    }

    /// Returns the session options this configuration asks for.
    #[must_use]
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            resolve_closest: self.resolve_closest,
            record_backlinks: self.record_backlinks,
            rewrite: RewriteOptions {
                link_titles: self.link_titles,
                strip_title_tags: self.strip_title_tags,
            },
        }
    }
}
