//! Syntax highlighting as a service: POST code, get back classed HTML plus
//! the CSS for the `base16-ocean.dark` theme.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use syntect::highlighting::ThemeSet;
use syntect::html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use edgeside::{Worker, WorkerManifest};

const USAGE: &str = "POST /highlight with a JSON body like \
{\"code\": \"fn main() {}\", \"language\": \"rust\"}. \
Omit \"language\" to detect it from the first line.";

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new()
        .route("/", get(usage))
        .route("/highlight", post(highlight));
    Worker::builder().manifest(manifest).router(router).build()
}

#[derive(Debug, Deserialize)]
struct HighlightRequest {
    code: String,
    language: Option<String>,
}

async fn usage() -> &'static str {
    USAGE
}

async fn highlight(Json(request): Json<HighlightRequest>) -> Response {
    let set = syntax_set();
    let syntax = match request.language.as_deref() {
        Some(language) => match set.find_syntax_by_token(language) {
            Some(syntax) => syntax,
            None => {
                return Json(json!({
                    "error": format!("Language '{language}' not found"),
                    "html": format!("<pre>{}</pre>", escape_html(&request.code)),
                    "css": "",
                    "language": "unknown",
                }))
                .into_response();
            }
        },
        None => set
            .find_syntax_by_first_line(request.code.lines().next().unwrap_or(""))
            .unwrap_or_else(|| set.find_syntax_plain_text()),
    };

    match classed_html(&request.code, syntax) {
        Ok(html) => Json(json!({
            "html": format!("<pre class=\"highlight\"><code>{html}</code></pre>"),
            "css": theme_css(),
            "language": syntax.name,
        }))
        .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("highlighting failed: {err}"),
        )
            .into_response(),
    }
}

fn classed_html(code: &str, syntax: &SyntaxReference) -> Result<String, syntect::Error> {
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, syntax_set(), ClassStyle::Spaced);
    for line in LinesWithEndings::from(code) {
        generator.parse_html_for_line_which_includes_newline(line)?;
    }
    Ok(generator.finalize())
}

fn syntax_set() -> &'static SyntaxSet {
    static SET: OnceLock<SyntaxSet> = OnceLock::new();
    SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme_css() -> &'static str {
    static CSS: OnceLock<String> = OnceLock::new();
    CSS.get_or_init(|| {
        ThemeSet::load_defaults()
            .themes
            .get("base16-ocean.dark")
            .and_then(|theme| css_for_theme_with_class_style(theme, ClassStyle::Spaced).ok())
            .unwrap_or_default()
    })
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_is_a_known_token() {
        let syntax = syntax_set().find_syntax_by_token("rust").expect("rust syntax");
        assert_eq!(syntax.name, "Rust");
    }

    #[test]
    fn highlighting_emits_classed_spans() {
        let syntax = syntax_set().find_syntax_by_token("rust").expect("rust syntax");
        let html = classed_html("fn main() {}\n", syntax).expect("highlight");
        assert!(html.contains("<span"));
        assert!(html.contains("main"));
    }

    #[test]
    fn shebangs_drive_first_line_detection() {
        let syntax = syntax_set()
            .find_syntax_by_first_line("#!/usr/bin/env python3")
            .expect("detected syntax");
        assert_eq!(syntax.name, "Python");
    }

    #[test]
    fn theme_css_is_nonempty() {
        assert!(theme_css().contains("color"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>\"a\" & 'b'</b>"),
            "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;"
        );
    }
}
