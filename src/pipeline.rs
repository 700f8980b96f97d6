//! Page resolution: the per-request state machine.
//!
//! Every dynamic request walks the same fixed sequence:
//!
//! ```text
//! Match ──▶ Redirect? ──▶ Published? ──▶ Fetch ──▶ Render
//!   │           │             │            │          │
//!   ▼           ▼             ▼            ▼          ▼
//! NotFound   Redirect      NotFound     Fetch(e)   Rendered / Render(e)
//! ```
//!
//! The publish check runs BEFORE the fetch, so unpublished pages never
//! trigger data-source traffic. Terminal errors carry an HTTP status;
//! the serving layer turns them into responses via [`render_error`],
//! which honors manifest error-page overrides keyed by status (`/404`).

use crate::{
    error::{PageError, status_reason},
    fetch::Fetcher,
    manifest::{Page, Site},
    render::{Engine, RequestMeta, template_for_path},
};
use tera::Context;

/// Default Content-Type when a page declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

// ============================================================================
// Outcome
// ============================================================================

/// Successful terminal states of the pipeline.
#[derive(Debug)]
pub enum PageOutcome {
    /// Client-side redirect; permanent selects 301 over 302.
    Redirect { target: String, permanent: bool },

    /// A fully rendered body with its Content-Type.
    Rendered { body: String, content_type: String },
}

// ============================================================================
// Pipeline
// ============================================================================

/// Resolve a request path to a page outcome.
///
/// `path` is the decoded, query-stripped, trailing-slash-normalized
/// request path. Route matching, publish gating, data-source fan-out and
/// rendering all happen here; the caller only turns the result into an
/// HTTP response.
pub async fn resolve(
    site: &Site,
    engine: &Engine,
    fetcher: &Fetcher,
    path: &str,
    request: &RequestMeta,
) -> Result<PageOutcome, PageError> {
    let matched = site.match_path(path).ok_or(PageError::NotFound)?;
    let page = &matched.route.page;

    if let Some(redirect) = &page.redirect {
        return Ok(PageOutcome::Redirect {
            target: redirect.target.clone(),
            permanent: redirect.permanent,
        });
    }

    if !page.is_published() {
        return Err(PageError::NotFound);
    }

    let data = fetcher.fetch_all(&page.data_sources, &matched.captures).await?;

    let template = page
        .tpl_name
        .clone()
        .unwrap_or_else(|| template_for_path(path));

    let mut context = base_context(site, request);
    context.insert("page", page);
    for (name, value) in &data {
        context.insert(name, value);
    }

    let body = engine.render(&template, &context)?;

    Ok(PageOutcome::Rendered {
        body,
        content_type: page
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
    })
}

/// Context entries shared by page renders and error renders.
fn base_context(site: &Site, request: &RequestMeta) -> Context {
    let mut context = Context::new();
    context.insert("site", &site.meta);
    context.insert("request", request);
    context
}

// ============================================================================
// Error Rendering
// ============================================================================

/// Render the response body for a terminal error status.
///
/// A manifest page keyed by the numeric status (`/404`, `/500`, ...)
/// overrides the built-in body; its template and data sources follow the
/// normal page conventions. Any failure while rendering the override
/// falls back to the built-in minimal body, so error delivery itself
/// cannot fail.
pub async fn render_error(
    site: &Site,
    engine: &Engine,
    fetcher: &Fetcher,
    request: &RequestMeta,
    status: u16,
) -> (String, String) {
    let path = format!("/{status}");

    // a broken override must not mask the original status
    if let Some(matched) = site.match_path(&path) {
        if let Ok(outcome) =
            render_error_page(site, engine, fetcher, request, &matched.route.page, &path, status)
                .await
        {
            return outcome;
        }
    }

    (default_error_body(status), DEFAULT_CONTENT_TYPE.to_string())
}

async fn render_error_page(
    site: &Site,
    engine: &Engine,
    fetcher: &Fetcher,
    request: &RequestMeta,
    page: &Page,
    path: &str,
    status: u16,
) -> Result<(String, String), PageError> {
    let data = fetcher.fetch_all(&page.data_sources, &Default::default()).await?;

    let template = page
        .tpl_name
        .clone()
        .unwrap_or_else(|| template_for_path(path));

    let mut context = base_context(site, request);
    context.insert("page", page);
    context.insert("status", &status);
    context.insert("reason", status_reason(status));
    for (name, value) in &data {
        context.insert(name, value);
    }

    let body = engine.render(&template, &context)?;

    Ok((
        body,
        page.content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
    ))
}

/// Built-in last-resort error body.
fn default_error_body(status: u16) -> String {
    let reason = status_reason(status);
    format!(
        "<!DOCTYPE html>\n<html><head><title>{status} {reason}</title></head>\n\
         <body><h1>{status} {reason}</h1></body></html>\n"
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    struct Fixture {
        site: Site,
        engine: Engine,
        fetcher: Fetcher,
        // tempdirs live as long as the fixture
        _dirs: (tempfile::TempDir, tempfile::TempDir),
    }

    fn fixture(manifest: &str, templates: &[(&str, &str)], data: &[(&str, &str)]) -> Fixture {
        let tpl_dir = tempfile::tempdir().unwrap();
        for (name, body) in templates {
            let path = tpl_dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, body).unwrap();
        }

        let data_dir = tempfile::tempdir().unwrap();
        for (name, body) in data {
            let path = data_dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, body).unwrap();
        }

        let mut config = SiteConfig::default();
        config.paths.templates = tpl_dir.path().to_path_buf();
        config.paths.snippets = tpl_dir.path().join("__no_snippets__");
        config.paths.data = data_dir.path().to_path_buf();

        Fixture {
            site: Site::from_str(manifest).unwrap(),
            engine: Engine::new(&config).unwrap(),
            fetcher: Fetcher::new(&config).unwrap(),
            _dirs: (tpl_dir, data_dir),
        }
    }

    fn request(path: &str) -> RequestMeta {
        RequestMeta {
            host: "localhost:8427".into(),
            path: path.into(),
            method: "GET".into(),
            protocol: "http".into(),
            remote_ip: "127.0.0.1".into(),
        }
    }

    async fn resolve_path(f: &Fixture, path: &str) -> Result<PageOutcome, PageError> {
        resolve(&f.site, &f.engine, &f.fetcher, path, &request(path)).await
    }

    #[tokio::test]
    async fn test_render_root_with_site_meta() {
        let f = fixture(
            "title: Hub\npages:\n  /: {}\n",
            &[("index.html", "<h1>{{ site.title }}</h1>")],
            &[],
        );

        match resolve_path(&f, "/").await.unwrap() {
            PageOutcome::Rendered { body, content_type } => {
                assert_eq!(body, "<h1>Hub</h1>");
                assert_eq!(content_type, DEFAULT_CONTENT_TYPE);
            }
            other => panic!("expected Rendered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_tpl_name_and_content_type() {
        let f = fixture(
            r"
pages:
  /sitemap.xml:
    tpl_name: sitemap.xml
    content-type: application/xml
",
            &[("sitemap.xml", "<urlset></urlset>")],
            &[],
        );

        match resolve_path(&f, "/sitemap.xml").await.unwrap() {
            PageOutcome::Rendered { body, content_type } => {
                assert_eq!(body, "<urlset></urlset>");
                assert_eq!(content_type, "application/xml");
            }
            other => panic!("expected Rendered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redirect_short_circuits() {
        let f = fixture(
            r"
pages:
  /old:
    redirect: { target: /new, permanent: true }
  /temp:
    redirect: { target: / }
",
            &[],
            &[],
        );

        match resolve_path(&f, "/old").await.unwrap() {
            PageOutcome::Redirect { target, permanent } => {
                assert_eq!(target, "/new");
                assert!(permanent);
            }
            other => panic!("expected Redirect, got {other:?}"),
        }

        match resolve_path(&f, "/temp").await.unwrap() {
            PageOutcome::Redirect { permanent, .. } => assert!(!permanent),
            other => panic!("expected Redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_route_is_not_found() {
        let f = fixture("pages:\n  /: {}\n", &[("index.html", "x")], &[]);
        let err = resolve_path(&f, "/missing").await.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_unpublished_page_is_not_found_without_fetching() {
        // the data source does not exist on disk; an attempted fetch
        // would surface as a FetchError instead of NotFound
        let f = fixture(
            r"
pages:
  /draft:
    published: false
    data_sources:
      d: { src: absent.json, format: json }
",
            &[],
            &[],
        );

        let err = resolve_path(&f, "/draft").await.unwrap_err();
        assert!(matches!(err, PageError::NotFound));
    }

    #[tokio::test]
    async fn test_data_sources_exposed_by_name() {
        let f = fixture(
            r"
pages:
  /dashboard:
    data_sources:
      stats: { src: stats.yaml, format: yaml }
",
            &[("dashboard.html", "visits: {{ stats.visits }}")],
            &[("stats.yaml", "visits: 42\n")],
        );

        match resolve_path(&f, "/dashboard").await.unwrap() {
            PageOutcome::Rendered { body, .. } => assert_eq!(body, "visits: 42"),
            other => panic!("expected Rendered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_captures_flow_into_data_sources() {
        let f = fixture(
            r"
pages:
  /posts/(?P<slug>[a-z-]+):
    tpl_name: post.html
    data_sources:
      post: { src: 'posts/{slug}.json', format: json }
",
            &[("post.html", "<h1>{{ post.title }}</h1>")],
            &[("posts/hello.json", r#"{"title": "Hello"}"#)],
        );

        match resolve_path(&f, "/posts/hello").await.unwrap() {
            PageOutcome::Rendered { body, .. } => assert_eq!(body, "<h1>Hello</h1>"),
            other => panic!("expected Rendered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_source_aborts_with_its_status() {
        let f = fixture(
            r"
pages:
  /broken:
    data_sources:
      d: { src: absent.json, format: json }
",
            &[("broken.html", "never rendered")],
            &[],
        );

        let err = resolve_path(&f, "/broken").await.unwrap_err();
        assert!(matches!(err, PageError::Fetch(_)));
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_missing_template_is_render_error() {
        let f = fixture("pages:\n  /about: {}\n", &[("index.html", "x")], &[]);
        let err = resolve_path(&f, "/about").await.unwrap_err();
        assert!(matches!(err, PageError::Render(_)));
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn test_page_extra_attributes_reach_templates() {
        let f = fixture(
            r"
pages:
  /about:
    headline: Who we are
",
            &[("about.html", "{{ page.headline }}")],
            &[],
        );

        match resolve_path(&f, "/about").await.unwrap() {
            PageOutcome::Rendered { body, .. } => assert_eq!(body, "Who we are"),
            other => panic!("expected Rendered, got {other:?}"),
        }
    }

    // ------------------------------------------------------------------------
    // error rendering
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_error_override_page() {
        let f = fixture(
            r"
title: Hub
pages:
  /404: {}
",
            &[("404.html", "{{ site.title }}: {{ status }} {{ reason }}")],
            &[],
        );

        let (body, content_type) =
            render_error(&f.site, &f.engine, &f.fetcher, &request("/nope"), 404).await;

        assert_eq!(body, "Hub: 404 Not Found");
        assert_eq!(content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_error_fallback_when_no_override() {
        let f = fixture("pages: {}\n", &[("index.html", "x")], &[]);

        let (body, _) =
            render_error(&f.site, &f.engine, &f.fetcher, &request("/nope"), 404).await;

        assert!(body.contains("404 Not Found"));
        assert!(body.starts_with("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn test_error_fallback_when_override_template_missing() {
        // /500 is declared but its template does not exist
        let f = fixture("pages:\n  /500: {}\n", &[("index.html", "x")], &[]);

        let (body, _) =
            render_error(&f.site, &f.engine, &f.fetcher, &request("/x"), 500).await;

        assert!(body.contains("500 Internal Server Error"));
    }
}
