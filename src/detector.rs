//! Reference detection during page conversion.
//!
//! `[text][identifier]` and `[text][]` have no link definition in the page, so
//! pulldown-cmark hands them to the broken-link callback. We accept them there
//! and later swap the resulting link events for `<autoref>` markers. Nothing is
//! resolved here: the marker is resolved once every page has been scanned.

use std::collections::HashMap;

use pulldown_cmark::{BrokenLink, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};

use crate::breadcrumbs::REFERENCED_BY;
use crate::marker::{CLOSE_TAG, Marker, MarkerContext, strip_tags};

/// Extension point for hosts that know more about the references being written.
pub trait AutorefsHook: Send + Sync {
    /// Expands an identifier, e.g. a relative object path, into its full form.
    fn expand_identifier(&self, identifier: &str) -> String;

    /// Returns where the current reference is written, for diagnostics.
    fn context(&self) -> Option<MarkerContext>;
}

/// An identifier found in a Markdown reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub identifier: String,
    /// Set when the identifier was derived from display text; resolution tries
    /// the identifier first and this slug second.
    pub slug: Option<String>,
}

impl Reference {
    /// Derives the identifier of a reference link from its label.
    ///
    /// - `[text][identifier]`: the identifier is used verbatim.
    /// - `[text][]`: the text is used, with a slug as second choice.
    ///
    /// Returns `None` for any other kind of link, and for labels containing
    /// control characters. Labels made of a single code span are handled by
    /// [`Reference::from_code`] once the link body is parsed.
    #[must_use]
    pub fn detect(link_type: LinkType, label: &str) -> Option<Self> {
        if label.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return None;
        }
        match link_type {
            LinkType::Reference | LinkType::ReferenceUnknown => Some(Self {
                identifier: label.to_string(),
                slug: None,
            }),
            LinkType::Collapsed | LinkType::CollapsedUnknown => Some(Self {
                identifier: label.to_string(),
                slug: Some(slugify(label)),
            }),
            _ => None,
        }
    }

    /// ``[`code`][]``: the code's text is used verbatim.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        // Highlighted inline code arrives as markup; keep its text only.
        let identifier = if code.starts_with("<span") && code.ends_with("</span>") {
            strip_tags(code)
        } else {
            code.to_string()
        };
        Self {
            identifier,
            slug: None,
        }
    }

    fn into_marker(self, hook: Option<&dyn AutorefsHook>) -> Marker {
        let mut marker = Marker::new(self.identifier);
        marker.slug = self.slug.filter(|slug| !slug.is_empty());
        if let Some(hook) = hook {
            marker.identifier = hook.expand_identifier(&marker.identifier);
            marker.context = hook.context();
        }
        marker
    }
}

/// Generates a slug: lowercase, alphanumerics kept, runs of anything else
/// collapsed into single hyphens, no leading or trailing hyphen.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_hyphen = true; // Start true to skip leading hyphens

    for c in text.chars() {
        if c.is_alphanumeric() {
            result.extend(c.to_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            result.push('-');
            last_was_hyphen = true;
        }
    }

    if result.ends_with('-') {
        result.pop();
    }

    result
}

/// Broken-link callback: accept reference-style links we can turn into markers.
fn accept_reference<'a>(link: BrokenLink<'a>) -> Option<(CowStr<'a>, CowStr<'a>)> {
    Reference::detect(link.link_type, &link.reference)?;
    Some((CowStr::Borrowed(""), CowStr::Borrowed("")))
}

/// Parser options used for every page.
#[must_use]
pub fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_DEFINITION_LIST);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options
}

/// Parses a page, accepting unresolved references as links to be replaced.
#[must_use]
pub fn parse(markdown: &str) -> Vec<Event<'_>> {
    Parser::new_with_broken_link_callback(markdown, parser_options(), Some(accept_reference))
        .collect()
}

/// Replaces accepted reference links with `<autoref>` markers.
///
/// With `record_backlinks`, each marker also carries the kind of backlink and
/// the id of the nearest preceding heading.
#[must_use]
pub fn emit_markers<'a>(
    events: Vec<Event<'a>>,
    hook: Option<&dyn AutorefsHook>,
    record_backlinks: bool,
) -> Vec<Event<'a>> {
    let mut result = Vec::with_capacity(events.len());
    // One entry per open link: whether it was turned into a marker.
    let mut open_links: Vec<bool> = Vec::new();
    let mut last_heading_id: Option<String> = None;
    // Links whose whole body is one code span, by index of their start.
    let code_bodies: HashMap<usize, String> = events
        .windows(3)
        .enumerate()
        .filter_map(|(index, window)| match window {
            [Event::Start(Tag::Link { .. }), Event::Code(code), Event::End(TagEnd::Link)] => {
                Some((index, code.to_string()))
            }
            _ => None,
        })
        .collect();

    for (index, event) in events.into_iter().enumerate() {
        match &event {
            Event::Start(Tag::Heading { id, .. }) => {
                last_heading_id = id.as_ref().map(ToString::to_string);
                result.push(event);
            }
            Event::Start(Tag::Link { link_type, id, .. }) => {
                let reference = match (link_type, code_bodies.get(&index)) {
                    (LinkType::CollapsedUnknown, Some(code)) => Some(Reference::from_code(code)),
                    (LinkType::ReferenceUnknown | LinkType::CollapsedUnknown, _) => {
                        Reference::detect(*link_type, id)
                    }
                    _ => None,
                };

                if let Some(reference) = reference {
                    let mut marker = reference.into_marker(hook);
                    if record_backlinks {
                        marker.backlink_type = Some(REFERENCED_BY.to_string());
                        marker.backlink_anchor.clone_from(&last_heading_id);
                    }
                    result.push(Event::InlineHtml(marker.open_tag().into()));
                    open_links.push(true);
                } else {
                    open_links.push(false);
                    result.push(event);
                }
            }
            Event::End(TagEnd::Link) => {
                if open_links.pop() == Some(true) {
                    result.push(Event::InlineHtml(CLOSE_TAG.into()));
                } else {
                    result.push(event);
                }
            }
            _ => result.push(event),
        }
    }

    result
}
