//! Pending reference markers.
//!
//! During page conversion every cross-reference becomes an `<autoref>` element:
//!
//! ```html
//! <autoref identifier="Foo" slug="foo" optional domain="py" role="class"
//!          origin="pkg.Bar" filepath="pkg/bar.py" lineno="12">display text</autoref>
//! ```
//!
//! Only `identifier` is required. Attributes this crate does not handle are kept
//! and copied onto the final link. The marker is parsed once into a [`Marker`].

use std::sync::LazyLock;

use html_escape::{decode_html_entities, encode_double_quoted_attribute};
use regex::Regex;

/// Matches a marker with its raw attributes and its display text.
pub static AUTOREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<autoref (?P<attrs>.*?)>(?P<title>.*?)</autoref>")
        .expect("autoref pattern is valid")
});

/// Where a reference was written, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerContext {
    /// A domain like `py` or `rs`.
    pub domain: String,
    /// A role like `class` or `function`.
    pub role: String,
    /// The object the reference was written in.
    pub origin: String,
    pub filepath: String,
    pub lineno: u32,
}

impl MarkerContext {
    fn attrs(&self) -> [(&'static str, String); 5] {
        [
            ("domain", self.domain.clone()),
            ("role", self.role.clone()),
            ("origin", self.origin.clone()),
            ("filepath", self.filepath.clone()),
            ("lineno", self.lineno.to_string()),
        ]
    }
}

/// A parsed `<autoref>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Marker {
    pub identifier: String,
    /// Normalized spelling tried when `identifier` does not resolve.
    pub slug: Option<String>,
    /// Unresolved optional references degrade silently.
    pub optional: bool,
    pub classes: Vec<String>,
    pub context: Option<MarkerContext>,
    pub backlink_type: Option<String>,
    pub backlink_anchor: Option<String>,
    /// Attributes passed through to the final link, in order.
    pub extra: Vec<(String, Option<String>)>,
}

impl Marker {
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    /// Parses the attribute list of an `<autoref>` start tag.
    ///
    /// Returns `None` when there is no `identifier` attribute.
    #[must_use]
    pub fn parse(attrs: &str) -> Option<Self> {
        let mut marker = Self::default();
        let mut identifier = None;
        let mut context = ContextAttrs::default();

        for (name, value) in parse_attributes(attrs) {
            match name.as_str() {
                "identifier" => identifier = value.or(identifier),
                "slug" => marker.slug = value.filter(|slug| !slug.is_empty()),
                "optional" => marker.optional = true,
                // Legacy flag, implied by `optional`.
                "hover" => {}
                "class" => {
                    marker.classes = value
                        .unwrap_or_default()
                        .split_whitespace()
                        .map(ToString::to_string)
                        .collect();
                }
                "domain" => context.domain = value,
                "role" => context.role = value,
                "origin" => context.origin = value,
                "filepath" => context.filepath = value,
                "lineno" => context.lineno = value,
                "backlink-type" => marker.backlink_type = value,
                "backlink-anchor" => marker.backlink_anchor = value,
                _ => marker.extra.push((name, value)),
            }
        }

        marker.identifier = identifier?;
        marker.context = context.build();
        Some(marker)
    }

    /// Renders the start tag of this marker.
    #[must_use]
    pub fn open_tag(&self) -> String {
        let mut tag = String::from("<autoref");
        if let Some(context) = &self.context {
            for (name, value) in context.attrs() {
                push_attr(&mut tag, name, Some(&value));
            }
        }
        push_attr(&mut tag, "identifier", Some(&self.identifier));
        if let Some(slug) = &self.slug {
            push_attr(&mut tag, "slug", Some(slug));
        }
        if self.optional {
            push_attr(&mut tag, "optional", None);
        }
        if !self.classes.is_empty() {
            push_attr(&mut tag, "class", Some(&self.classes.join(" ")));
        }
        if let Some(kind) = &self.backlink_type {
            push_attr(&mut tag, "backlink-type", Some(kind));
        }
        if let Some(anchor) = &self.backlink_anchor {
            push_attr(&mut tag, "backlink-anchor", Some(anchor));
        }
        for (name, value) in &self.extra {
            push_attr(&mut tag, name, value.as_deref());
        }
        tag.push('>');
        tag
    }

    /// Renders the pass-through attributes, each preceded by a space.
    #[must_use]
    pub fn extra_attrs(&self) -> String {
        let mut attrs = String::new();
        for (name, value) in &self.extra {
            push_attr(&mut attrs, name, value.as_deref());
        }
        attrs
    }
}

/// Closing tag of a marker.
pub const CLOSE_TAG: &str = "</autoref>";

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    match value {
        Some(value) => {
            out.push_str(&format!(r#" {name}="{}""#, encode_double_quoted_attribute(value)));
        }
        None => {
            out.push(' ');
            out.push_str(name);
        }
    }
}

#[derive(Default)]
struct ContextAttrs {
    domain: Option<String>,
    role: Option<String>,
    origin: Option<String>,
    filepath: Option<String>,
    lineno: Option<String>,
}

impl ContextAttrs {
    /// A context is only meaningful when every part of it is present.
    fn build(self) -> Option<MarkerContext> {
        Some(MarkerContext {
            domain: self.domain?,
            role: self.role?,
            origin: self.origin?,
            filepath: self.filepath?,
            lineno: self.lineno?.trim().parse().ok()?,
        })
    }
}

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

/// Removes HTML tags and decodes entities, leaving plain text.
#[must_use]
pub fn strip_tags(html: &str) -> String {
    decode_html_entities(&TAG_RE.replace_all(html, "")).into_owned()
}

/// Splits an HTML attribute list into names and unescaped values.
///
/// Names are lowercased. Values may be double-quoted, single-quoted or bare;
/// attributes without `=` have no value.
#[must_use]
pub fn parse_attributes(input: &str) -> Vec<(String, Option<String>)> {
    let mut attrs = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let mut value = None;
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (raw, remainder) = match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    match body.find(quote) {
                        Some(end) => (&body[..end], &body[end + 1..]),
                        None => (body, ""),
                    }
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            value = Some(decode_html_entities(raw).into_owned());
            rest = remainder;
        }

        if name.is_empty() {
            // Stray `/`, `>` or `=`: skip one character and carry on.
            let mut chars = rest.chars();
            chars.next();
            rest = chars.as_str();
        } else {
            attrs.push((name, value));
        }
        rest = rest.trim_start();
    }

    attrs
}
