//! Proxies an origin site and rewrites its social-sharing meta tags.
//!
//! Whatever Open Graph and Twitter tags the origin shipped are stripped and
//! replaced with path-appropriate ones, so shared links always unfurl with
//! current copy.

use axum::Router;
use axum::http::{StatusCode, Uri};
use axum::response::Html;
use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};

use edgeside::{FetchClient, Worker, WorkerContext, WorkerManifest};

pub fn worker() -> edgeside::Result<Worker> {
    worker_with("https://example.com")
}

/// Builds the worker against a specific origin.
pub fn worker_with(origin: &str) -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new().fallback(rewrite_page);
    Worker::builder()
        .manifest(manifest)
        .router(router)
        .var("ORIGIN_URL", origin.trim_end_matches('/'))
        .fetcher(FetchClient::new()?)
        .build()
}

async fn rewrite_page(
    ctx: WorkerContext,
    uri: Uri,
) -> Result<Html<String>, (StatusCode, String)> {
    let origin = ctx.env().var("ORIGIN_URL").map_err(internal_error)?;
    let fetcher = ctx.env().fetcher().map_err(internal_error)?;

    let path = uri.path();
    let page = fetcher
        .get(&format!("{origin}{path}"))
        .await
        .map_err(|err| (StatusCode::BAD_GATEWAY, err.to_string()))?;

    let metadata = PageMetadata::for_path(path);
    let html = inject_meta_tags(&page.body, &metadata).map_err(internal_error)?;
    Ok(Html(html))
}

struct PageMetadata {
    title: String,
    description: String,
    image: String,
    url: String,
    og_type: &'static str,
}

impl PageMetadata {
    /// Per-section metadata keyed off the first path segment.
    fn for_path(path: &str) -> Self {
        let url = format!("https://worker.example.com{path}");
        let mut segments = path.trim_matches('/').splitn(2, '/');
        match (segments.next().unwrap_or(""), segments.next()) {
            ("blog", Some(slug)) => Self {
                title: format!("{} | The Blog", title_case(slug)),
                description: format!("Read our latest post about {}.", title_case(slug)),
                image: "https://images.example.com/covers/blog.jpg".to_owned(),
                url,
                og_type: "article",
            },
            ("blog", None) => Self {
                title: "The Blog".to_owned(),
                description: "Essays and release notes from the team.".to_owned(),
                image: "https://images.example.com/covers/blog.jpg".to_owned(),
                url,
                og_type: "website",
            },
            ("products", _) => Self {
                title: "Products".to_owned(),
                description: "Everything we currently ship, in one place.".to_owned(),
                image: "https://images.example.com/covers/products.jpg".to_owned(),
                url,
                og_type: "website",
            },
            ("about", _) => Self {
                title: "About Us".to_owned(),
                description: "Who we are and why we build this.".to_owned(),
                image: "https://images.example.com/covers/about.jpg".to_owned(),
                url,
                og_type: "website",
            },
            _ => Self {
                title: "Welcome".to_owned(),
                description: "A small site with freshly rewritten share cards.".to_owned(),
                image: "https://images.example.com/covers/default.jpg".to_owned(),
                url,
                og_type: "website",
            },
        }
    }

    fn meta_tags(&self) -> String {
        let mut tags = String::new();
        push_meta(&mut tags, "property", "og:title", &self.title);
        push_meta(&mut tags, "property", "og:description", &self.description);
        push_meta(&mut tags, "property", "og:image", &self.image);
        push_meta(&mut tags, "property", "og:url", &self.url);
        push_meta(&mut tags, "property", "og:type", self.og_type);
        push_meta(&mut tags, "property", "og:site_name", "Edgeside Demo");
        push_meta(&mut tags, "name", "twitter:card", "summary_large_image");
        push_meta(&mut tags, "name", "twitter:title", &self.title);
        push_meta(&mut tags, "name", "twitter:description", &self.description);
        push_meta(&mut tags, "name", "twitter:image", &self.image);
        tags
    }
}

fn inject_meta_tags(
    html: &str,
    metadata: &PageMetadata,
) -> Result<String, lol_html::errors::RewritingError> {
    let tags = metadata.meta_tags();
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("meta[property^='og:']", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("meta[name^='twitter:']", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("head", move |el| {
                    el.prepend(&tags, ContentType::Html);
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
}

fn push_meta(out: &mut String, attr: &str, key: &str, content: &str) {
    out.push_str(&format!(
        "<meta {attr}=\"{key}\" content=\"{}\">",
        escape_attr(content)
    ));
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn title_case(slug: &str) -> String {
    slug.split(['-', '/'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_tags_are_replaced() {
        let origin = r#"<html><head><title>t</title>
            <meta property="og:title" content="Stale">
            <meta name="twitter:card" content="summary">
        </head><body></body></html>"#;

        let rewritten =
            inject_meta_tags(origin, &PageMetadata::for_path("/about")).expect("rewrite");
        assert!(!rewritten.contains("Stale"));
        assert!(!rewritten.contains(r#"content="summary""#));
        assert!(rewritten.contains(r#"<meta property="og:title" content="About Us">"#));
        assert!(rewritten.contains(r#"<meta name="twitter:card" content="summary_large_image">"#));
    }

    #[test]
    fn blog_posts_get_article_metadata() {
        let metadata = PageMetadata::for_path("/blog/shipping-fast");
        assert_eq!(metadata.title, "Shipping Fast | The Blog");
        assert_eq!(metadata.og_type, "article");
        assert_eq!(metadata.url, "https://worker.example.com/blog/shipping-fast");
    }

    #[test]
    fn unknown_paths_fall_back_to_defaults() {
        let metadata = PageMetadata::for_path("/anything/else");
        assert_eq!(metadata.title, "Welcome");
        assert_eq!(metadata.og_type, "website");
    }

    #[test]
    fn attribute_values_are_escaped() {
        assert_eq!(escape_attr(r#"a "b" & <c>"#), "a &quot;b&quot; &amp; &lt;c&gt;");
    }
}
