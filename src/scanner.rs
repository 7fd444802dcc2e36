//! Anchor scanning.
//!
//! Collects the ids a page exposes: every heading, and every raw `<a id="...">`
//! anchor. Empty anchors directly followed by a heading become aliases of that
//! heading, so a reference to the anchor lands on the heading.

use std::collections::HashSet;
use std::sync::LazyLock;

use pulldown_cmark::{Event, HeadingLevel, Tag, TagEnd};
use regex::Regex;

use crate::detector::slugify;
use crate::marker::{parse_attributes, strip_tags};

static ANCHOR_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a(?:\s(?P<attrs>[^>]*?))?\s*(?P<closed>/)?>").expect("anchor pattern is valid")
});

static ANCHOR_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</a\s*>").expect("anchor close pattern is valid"));

/// Something a page can be linked to, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    Heading {
        id: String,
        title: String,
        level: u8,
    },
    Anchor {
        id: String,
        /// Id of the heading this anchor stands for.
        alias_of: Option<String>,
        /// Title of the nearest preceding heading, or of the aliased heading.
        title: Option<String>,
    },
}

/// Gives every heading without an explicit id a unique slug.
///
/// Empty slugs become `section`; duplicates get `-1`, `-2`, ... suffixes.
pub fn assign_heading_ids(events: &mut [Event<'_>]) {
    let mut used: HashSet<String> = events
        .iter()
        .filter_map(|event| match event {
            Event::Start(Tag::Heading { id: Some(id), .. }) => Some(id.to_string()),
            _ => None,
        })
        .collect();

    for i in 0..events.len() {
        if !matches!(events[i], Event::Start(Tag::Heading { id: None, .. })) {
            continue;
        }

        let mut base = slugify(&heading_text(&events[i + 1..]));
        if base.is_empty() {
            base = "section".to_string();
        }
        let mut slug = base.clone();
        let mut suffix = 1;
        while !used.insert(slug.clone()) {
            slug = format!("{base}-{suffix}");
            suffix += 1;
        }

        if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
            *id = Some(slug.into());
        }
    }
}

/// Plain text of a heading, given the events following its start tag.
#[must_use]
pub fn heading_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

const fn level_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Collects headings and anchors from a parsed page.
///
/// Headings must already have ids, see [`assign_heading_ids`].
#[must_use]
pub fn scan_anchors(events: &[Event<'_>]) -> Vec<Found> {
    let mut scanner = Scanner {
        events,
        pos: 0,
        found: Vec::new(),
    };
    let mut pending = Pending::default();
    scanner.walk(&mut pending);
    scanner.flush(&mut pending);
    scanner.found
}

/// Anchors waiting to learn whether a heading follows them.
#[derive(Default)]
struct Pending {
    ids: Vec<String>,
    last_heading: Option<String>,
}

struct Scanner<'e, 'a> {
    events: &'e [Event<'a>],
    pos: usize,
    found: Vec<Found>,
}

impl Scanner<'_, '_> {
    /// Walks sibling events until the end of the enclosing element.
    fn walk(&mut self, pending: &mut Pending) {
        let events = self.events;
        while let Some(event) = events.get(self.pos) {
            self.pos += 1;
            match event {
                Event::End(_) => return,
                // Paragraphs are transparent: anchors and headings around them chain.
                Event::Start(Tag::Paragraph) => self.walk(pending),
                Event::Start(Tag::Heading { level, id, .. }) => {
                    let title = heading_text(&events[self.pos..]);
                    self.skip_element();
                    if let Some(id) = id {
                        self.found.push(Found::Heading {
                            id: id.to_string(),
                            title: title.clone(),
                            level: level_number(*level),
                        });
                        for alias in pending.ids.drain(..) {
                            self.found.push(Found::Anchor {
                                id: alias,
                                alias_of: Some(id.to_string()),
                                title: Some(title.clone()),
                            });
                        }
                    }
                    pending.last_heading = Some(title);
                }
                // A Markdown link has both text and a target.
                Event::Start(Tag::Link { .. }) => {
                    self.flush(pending);
                    self.skip_element();
                }
                Event::Start(_) => {
                    self.flush(pending);
                    let mut inner = Pending::default();
                    self.walk(&mut inner);
                    self.flush(&mut inner);
                }
                Event::Html(html) | Event::InlineHtml(html) => self.html(html, pending),
                // Text after an anchor, even on the next line, makes it a real anchor.
                Event::Text(text) if !text.trim().is_empty() => self.flush(pending),
                Event::Text(_) | Event::SoftBreak => {}
                _ => self.flush(pending),
            }
        }
    }

    fn skip_element(&mut self) {
        let mut depth = 1usize;
        while let Some(event) = self.events.get(self.pos) {
            self.pos += 1;
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn flush(&mut self, pending: &mut Pending) {
        for id in pending.ids.drain(..) {
            self.found.push(Found::Anchor {
                id,
                alias_of: None,
                title: pending.last_heading.clone(),
            });
        }
    }

    /// Handles the `<a>` tags of a raw HTML chunk.
    fn html(&mut self, chunk: &str, pending: &mut Pending) {
        let mut rest = chunk;
        while let Some(open) = ANCHOR_OPEN_RE.captures(rest) {
            let attrs = open
                .name("attrs")
                .map(|attrs| parse_attributes(attrs.as_str()))
                .unwrap_or_default();
            let attr = |name: &str| {
                attrs
                    .iter()
                    .find(|(n, _)| n == name)
                    .and_then(|(_, value)| value.clone())
                    .filter(|value| !value.is_empty())
            };
            let id = attr("id").or_else(|| attr("name"));
            let has_href = attrs.iter().any(|(name, _)| name == "href");

            let after = &rest[open.get(0).map_or(rest.len(), |m| m.end())..];
            let has_text;
            if open.name("closed").is_some() {
                has_text = false;
                rest = after;
            } else if let Some(close) = ANCHOR_CLOSE_RE.find(after) {
                has_text = !strip_tags(&after[..close.start()]).is_empty();
                rest = &after[close.end()..];
            } else {
                has_text = self.consume_anchor_body();
                rest = "";
            }
            let has_tail = self.has_tail(rest);

            if let Some(id) = id {
                pending.ids.push(id);
            }
            if has_text || has_href || has_tail {
                self.flush(pending);
            }
        }
    }

    /// Skips the events up to the one closing an anchor; returns true if any
    /// of them carry text.
    fn consume_anchor_body(&mut self) -> bool {
        let mut has_text = false;
        while let Some(event) = self.events.get(self.pos) {
            match event {
                Event::Html(html) | Event::InlineHtml(html) if ANCHOR_CLOSE_RE.is_match(html) => {
                    self.pos += 1;
                    break;
                }
                Event::End(_) => break,
                Event::Text(text) | Event::Code(text) => has_text |= !text.is_empty(),
                _ => {}
            }
            self.pos += 1;
        }
        has_text
    }

    /// Whether non-whitespace text follows an anchor, before any other tag.
    fn has_tail(&self, rest: &str) -> bool {
        match rest.find('<') {
            Some(end) => !rest[..end].trim().is_empty(),
            None if !rest.trim().is_empty() => true,
            None => matches!(
                self.events.get(self.pos),
                Some(Event::Text(text)) if !text.trim().is_empty()
            ),
        }
    }
}
