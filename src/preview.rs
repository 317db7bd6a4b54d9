//! Turns a generated `{html, css, js}` bundle into one standalone document.
//!
//! The image rewrite is a best-effort textual pass over the markup, not a DOM
//! transform: it never fails and leaves anything it does not recognize alone.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::PreviewBundle;

/// Sandbox tokens shared by the frame attribute and the CSP header. There is
/// deliberately no `allow-same-origin`: generated scripts get an opaque origin.
pub const SANDBOX_TOKENS: &str = "allow-scripts allow-forms allow-modals allow-popups";

pub fn sandbox_csp() -> String {
    format!("sandbox {SANDBOX_TOKENS}")
}

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<img\b[^>]*?\ssrc\s*=\s*)(?:"/?(images/[^"]*)"|'/?(images/[^']*)')"#)
        .expect("valid img src pattern")
});

/// Points `src` references to `images/...` (with or without one leading slash)
/// at the asset server. Absolute and protocol-relative URLs, other directories
/// and other attributes are untouched.
pub fn rewrite_image_paths<'a>(html: &'a str, base_url: &str) -> Cow<'a, str> {
    let base = base_url.trim_end_matches('/');
    IMG_SRC.replace_all(html, |caps: &Captures| {
        let (quote, path) = match (caps.get(2), caps.get(3)) {
            (Some(path), _) => ('"', path.as_str()),
            (None, Some(path)) => ('\'', path.as_str()),
            (None, None) => unreachable!("one alternative always matches"),
        };
        format!("{}{quote}{base}/{path}{quote}", &caps[1])
    })
}

/// Builds the preview page, or `None` when there is nothing to show.
pub fn build_preview_document(bundle: Option<&PreviewBundle>, base_url: &str) -> Option<String> {
    let bundle = bundle.filter(|b| !b.is_empty())?;
    let html = rewrite_image_paths(&bundle.html, base_url);

    Some(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<style>{css}</style>
</head>
<body>
{html}
<script>{js}</script>
</body>
</html>"#,
        css = bundle.css,
        js = bundle.js,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bundle(html: &str, css: &str, js: &str) -> PreviewBundle {
        PreviewBundle { html: html.into(), css: css.into(), js: js.into() }
    }

    #[test]
    fn nothing_to_show_is_none() {
        assert_eq!(build_preview_document(None, "http://host/"), None);
        assert_eq!(build_preview_document(Some(&PreviewBundle::default()), "http://host/"), None);
    }

    #[test]
    fn leading_slash_image_is_made_absolute_without_double_slash() {
        let out = rewrite_image_paths(r#"<img src="/images/a.png">"#, "http://host/");
        assert_eq!(out, r#"<img src="http://host/images/a.png">"#);
        assert!(!out.contains("host//"));
    }

    #[test]
    fn single_quotes_attributes_and_case_are_handled() {
        let out = rewrite_image_paths(
            "<IMG class='hero' SRC='images/b.jpg' alt=x><img\nsrc=\"/images/c.gif\"/>",
            "http://host",
        );
        assert_eq!(
            out,
            "<IMG class='hero' SRC='http://host/images/b.jpg' alt=x><img\nsrc=\"http://host/images/c.gif\"/>"
        );
    }

    #[test]
    fn protocol_relative_and_data_src_are_not_rewritten() {
        let html = r#"<img src="//images/a.png"><img data-src="images/a.png" src="https://cdn/x.png">"#;
        assert_eq!(rewrite_image_paths(html, "http://host/"), html);

        let out = rewrite_image_paths(r#"<img data-src="images/lazy.png" src="images/a.png">"#, "http://host/");
        assert_eq!(out, r#"<img data-src="images/lazy.png" src="http://host/images/a.png">"#);
    }

    #[test]
    fn other_sources_are_left_alone() {
        let html = concat!(
            r#"<img src="https://cdn.example.com/images/a.png">"#,
            r#"<img src="/assets/logo.svg">"#,
            r#"<a href="/images/a.png">link</a>"#,
            r#"<img alt="no src">"#,
        );
        assert_eq!(rewrite_image_paths(html, "http://host/"), html);
    }

    #[test]
    fn document_inlines_css_and_js_around_markup() {
        let doc = build_preview_document(
            Some(&bundle("<p>hi</p>", "p{color:red}", "console.log(1)")),
            "http://host/",
        )
        .unwrap();

        assert_eq!(doc.matches("<style>").count(), 1);
        assert_eq!(doc.matches("<script>").count(), 1);
        assert!(doc.contains("<style>p{color:red}</style>"));
        assert!(doc.contains("<script>console.log(1)</script>"));
        assert!(doc.contains(r#"<meta charset="utf-8">"#));
        assert!(doc.contains(r#"name="viewport""#));

        let style_end = doc.find("</style>").unwrap();
        let body = doc.find("<p>hi</p>").unwrap();
        let script = doc.find("<script>").unwrap();
        assert!(style_end < body && body < script);
    }

    #[test]
    fn css_only_bundle_still_renders() {
        assert!(build_preview_document(Some(&bundle("", "body{}", "")), "http://host/").is_some());
    }

    #[test]
    fn csp_never_grants_same_origin() {
        assert!(sandbox_csp().starts_with("sandbox "));
        assert!(!sandbox_csp().contains("allow-same-origin"));
    }
}
