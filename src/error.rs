//! Resolution errors and build diagnostics.

use std::fmt;

use thiserror::Error;

use crate::marker::MarkerContext;

/// Error returned when an identifier cannot be turned into a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The identifier is absent from every tier and from the absolute URL table.
    #[error("could not find cross-reference target '{identifier}'")]
    NotFound { identifier: String },
}

/// Which registry tier a set of candidate URLs came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Primary,
    Secondary,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
        }
    }
}

/// A non-fatal problem noticed while resolving references.
///
/// Diagnostics never abort a build. They are logged as warnings when recorded
/// and kept on the session so hosts can report them again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// More than one URL was registered and the policy picked the first one.
    MultipleUrls {
        tier: Tier,
        identifier: String,
        urls: Vec<String>,
    },
    /// The closest-URL search found nothing under the referring page.
    ClosestNotFound {
        tier: Tier,
        from_url: String,
        urls: Vec<String>,
    },
    /// A required reference could not be resolved.
    Unmapped {
        page: String,
        identifier: String,
        context: Option<MarkerContext>,
    },
}

impl Diagnostic {
    /// Logs the diagnostic as a warning and appends it to `sink`.
    pub(crate) fn emit(self, sink: &mut Vec<Self>) {
        log::warn!("{self}");
        sink.push(self);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleUrls {
                tier,
                identifier,
                urls,
            } => write!(
                f,
                "Multiple {tier} URLs found for '{identifier}': {urls:?}. \
                 Make sure to use unique headings, identifiers, or Markdown anchors."
            ),
            Self::ClosestNotFound {
                tier,
                from_url,
                urls,
            } => write!(
                f,
                "Could not find closest {tier} URL (from {from_url}, candidates: {urls:?}). \
                 Make sure to use unique headings, identifiers, or Markdown anchors."
            ),
            Self::Unmapped {
                page,
                identifier,
                context,
            } => {
                write!(f, "{page}: ")?;
                if let Some(context) = context {
                    write!(
                        f,
                        "from {}:{}: ({}) ",
                        context.filepath, context.lineno, context.origin
                    )?;
                }
                write!(f, "Could not find cross-reference target '{identifier}'")
            }
        }
    }
}
