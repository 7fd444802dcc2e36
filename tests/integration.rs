//! Integration tests for the mdbook-autorefs library API.

use pretty_assertions::assert_eq;

use mdbook_autorefs::{
    Diagnostic, LinkTitles, OutputFormat, Page, RewriteOptions, Session, SessionOptions, Tier,
    relative_url,
};

fn session_with(options: SessionOptions) -> Session {
    Session::new(options)
}

#[test]
fn test_reference_to_heading_on_other_page() {
    let session = Session::default();
    let usage = Page::new("guide/usage.html", "Usage");
    let api = Page::new("reference/api.html", "API");

    let usage_html = session.render_html(&usage, "Use [the parser][parser].\n");
    session.render_html(&api, "# API\n\n## Parser\n");

    let fixed = session.fix_page(&usage, &usage_html);
    assert_eq!(
        fixed,
        "<p>Use <a class=\"autorefs autorefs-internal\" title=\"Parser\" href=\"../reference/api.html#parser\">the parser</a>.</p>\n"
    );
}

#[test]
fn test_reference_before_definition_in_same_page() {
    let session = Session::default();
    let page = Page::new("index.html", "Home");
    let html = session.render_html(&page, "See [Details][].\n\n## Details\n");
    let fixed = session.fix_page(&page, &html);
    assert!(fixed.contains(r##"href="#details">Details</a>"##), "{fixed}");
}

#[test]
fn test_markdown_output_keeps_markers_inline() {
    let session = Session::default();
    let page = Page::new("index.html", "Home");
    let markdown = session
        .convert_page(&page, "# Title\n\nSee [`Foo`][].\n", OutputFormat::Markdown)
        .unwrap();
    assert!(markdown.contains("{#title}"), "{markdown}");
    assert!(
        markdown.contains("<autoref identifier=\"Foo\">`Foo`</autoref>"),
        "{markdown}"
    );
}

#[test]
fn test_markdown_output_unresolved_code_reference() {
    let session = Session::default();
    let page = Page::new("index.html", "Home");
    let markdown = session
        .convert_page(&page, "See [`Foo`][].\n", OutputFormat::Markdown)
        .unwrap();
    let fixed = session.fix_page(&page, &markdown);
    assert!(fixed.contains("See [`Foo`][]."), "{fixed}");
}

#[test]
fn test_alias_anchor_resolves_to_heading() {
    let session = Session::default();
    let page = Page::new("changelog.html", "Changelog");
    session.render_html(&page, "<a id=\"latest\"></a>\n\n## Version 2.0\n");

    let resolved = session.resolve("latest", Some("index.html")).unwrap();
    assert_eq!(resolved.url, "changelog.html#version-2-0");
    assert_eq!(resolved.title.as_deref(), Some("Version 2.0"));
}

#[test]
fn test_duplicate_identifier_warns_and_takes_first() {
    let session = Session::default();
    let first = Page::new("a/one.html", "One");
    let second = Page::new("b/two.html", "Two");
    session.render_html(&first, "## Setup\n");
    session.render_html(&second, "## Setup\n");

    let resolved = session.resolve("setup", None).unwrap();
    assert_eq!(resolved.url, "a/one.html#setup");
    assert_eq!(
        session.diagnostics(),
        vec![Diagnostic::MultipleUrls {
            tier: Tier::Primary,
            identifier: "setup".to_string(),
            urls: vec!["a/one.html#setup".to_string(), "b/two.html#setup".to_string()],
        }]
    );
}

#[test]
fn test_resolve_closest() {
    let session = session_with(SessionOptions {
        resolve_closest: true,
        ..SessionOptions::default()
    });
    let first = Page::new("a/one.html", "One");
    let second = Page::new("b/two.html", "Two");
    session.render_html(&first, "## Setup\n");
    session.render_html(&second, "## Setup\n");

    let resolved = session.resolve("setup", Some("b/other.html")).unwrap();
    assert_eq!(resolved.url, "two.html#setup");
    assert!(session.diagnostics().is_empty());
}

#[test]
fn test_optional_reference_from_hook() {
    let session = Session::default();
    let page = Page::new("index.html", "Home");
    let fixed = session.fix_page(
        &page,
        "<p><autoref identifier=\"pkg.Missing\" optional><code>Missing</code></autoref></p>",
    );
    assert_eq!(
        fixed,
        "<p><span title=\"pkg.Missing\"><code>Missing</code></span></p>"
    );
    assert!(session.diagnostics().is_empty());
}

#[test]
fn test_external_titles_only() {
    let session = session_with(SessionOptions {
        rewrite: RewriteOptions {
            link_titles: LinkTitles::External,
            strip_title_tags: true,
        },
        ..SessionOptions::default()
    });
    session
        .registry()
        .register_anchor("api.html", "Foo", None, Tier::Primary, Some("The Foo"));
    let page = Page::new("index.html", "Home");
    let fixed = session.fix_page(&page, "<autoref identifier=\"Foo\">Foo</autoref>");
    assert_eq!(
        fixed,
        "<a class=\"autorefs autorefs-internal\" href=\"api.html#Foo\">Foo</a>"
    );
}

#[test]
fn test_relative_url_reexport() {
    assert_eq!(relative_url("a/b.html", "a/c.html#d"), "c.html#d");
}
