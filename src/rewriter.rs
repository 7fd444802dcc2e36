//! Second pass: turning `<autoref>` markers into links.

use html_escape::encode_double_quoted_attribute;

use crate::error::ResolveError;
use crate::marker::{AUTOREF_RE, Marker, MarkerContext, strip_tags};
use crate::registry::Resolved;
use crate::urls::is_external;

/// When resolved links get a `title` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkTitles {
    #[default]
    Always,
    Never,
    /// Only links leaving the site.
    External,
}

/// Rendering options for resolved links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOptions {
    pub link_titles: LinkTitles,
    /// Strip HTML from `title` attributes instead of escaping it.
    pub strip_title_tags: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            link_titles: LinkTitles::Always,
            strip_title_tags: true,
        }
    }
}

/// A required reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmapped {
    pub identifier: String,
    pub context: Option<MarkerContext>,
}

/// Callback recording a backlink: target identifier, backlink kind, anchor.
pub type RecordBacklink<'a> = &'a dyn Fn(&str, &str, &str);

/// Replaces every marker in `html` with a link, a tooltip span, or the
/// original reference text.
///
/// `url_mapper` resolves one identifier. Markers carrying a slug try the
/// identifier first and the slug second. Required references that resolve to
/// nothing are returned alongside the new text, in document order.
pub fn fix_refs<F>(
    html: &str,
    mut url_mapper: F,
    record_backlink: Option<RecordBacklink<'_>>,
    options: RewriteOptions,
) -> (String, Vec<Unmapped>)
where
    F: FnMut(&str) -> Result<Resolved, ResolveError>,
{
    let mut unmapped = Vec::new();
    let fixed = AUTOREF_RE.replace_all(html, |caps: &regex::Captures<'_>| {
        let Some(marker) = Marker::parse(&caps["attrs"]) else {
            return caps[0].to_string();
        };
        fix_ref(
            &marker,
            &caps["title"],
            &mut url_mapper,
            record_backlink,
            options,
            &mut unmapped,
        )
    });
    (fixed.into_owned(), unmapped)
}

fn fix_ref<F>(
    marker: &Marker,
    title: &str,
    url_mapper: &mut F,
    record_backlink: Option<RecordBacklink<'_>>,
    options: RewriteOptions,
    unmapped: &mut Vec<Unmapped>,
) -> String
where
    F: FnMut(&str) -> Result<Resolved, ResolveError>,
{
    let identifier = marker.identifier.as_str();

    if let (Some(record), Some(kind), Some(anchor)) = (
        record_backlink,
        marker.backlink_type.as_deref(),
        marker.backlink_anchor.as_deref(),
    ) {
        record(identifier, kind, anchor);
    }

    let Some(resolved) = find_url(marker, url_mapper) else {
        if marker.optional {
            log::debug!("Unresolved optional cross-reference: {identifier}");
            return format!(
                r#"<span title="{}">{title}</span>"#,
                encode_double_quoted_attribute(identifier)
            );
        }
        unmapped.push(Unmapped {
            identifier: identifier.to_string(),
            context: marker.context.clone(),
        });
        let is_code = title == format!("<code>{identifier}</code>") || title == format!("`{identifier}`");
        if title == identifier {
            return format!("[{identifier}][]");
        }
        if is_code && marker.slug.is_none() {
            return format!("[{title}][]");
        }
        return format!("[{title}][{identifier}]");
    };

    let external = is_external(&resolved.url);
    let mut class_attr = String::from("autorefs ");
    class_attr.push_str(if external {
        "autorefs-external"
    } else {
        "autorefs-internal"
    });
    for class in &marker.classes {
        class_attr.push(' ');
        class_attr.push_str(class);
    }

    let mut title_attr = String::new();
    let wants_title = match options.link_titles {
        LinkTitles::Always => true,
        LinkTitles::Never => false,
        LinkTitles::External => external,
    };
    if wants_title {
        // Optional references usually come from API docs, where the full
        // identifier is worth showing.
        let tooltip = if marker.optional {
            tooltip(identifier, resolved.title.as_deref(), options.strip_title_tags)
        } else {
            resolved.title.clone().unwrap_or_default()
        };
        if !tooltip.is_empty() && !format!("<code>{title}</code>").contains(&tooltip) {
            let text = if options.strip_title_tags {
                strip_tags(&tooltip)
            } else {
                tooltip
            };
            title_attr.push_str(&format!(
                r#" title="{}""#,
                encode_double_quoted_attribute(&text)
            ));
        }
    }

    format!(
        r#"<a class="{class_attr}"{title_attr} href="{}"{}>{title}</a>"#,
        encode_double_quoted_attribute(&resolved.url),
        marker.extra_attrs(),
    )
}

fn find_url<F>(marker: &Marker, url_mapper: &mut F) -> Option<Resolved>
where
    F: FnMut(&str) -> Result<Resolved, ResolveError>,
{
    std::iter::once(marker.identifier.as_str())
        .chain(marker.slug.as_deref())
        .find_map(|identifier| url_mapper(identifier).ok())
}

fn tooltip(identifier: &str, title: Option<&str>, strip_tags: bool) -> String {
    match title.filter(|t| !t.is_empty()) {
        Some(title) if title.contains(identifier) => title.to_string(),
        Some(title) if strip_tags => format!("{title} ({identifier})"),
        Some(title) => format!("{title} (<code>{identifier}</code>)"),
        None if strip_tags => identifier.to_string(),
        None => format!("<code>{identifier}</code>"),
    }
}
