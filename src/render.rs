//! Template engine wrapper and manifest-facing template helpers.
//!
//! Rendering goes through tera (Jinja2-style syntax). Templates load
//! from the templates directory plus the snippets directory, and get a
//! fixed helper set:
//!
//! | Helper            | Kind   | Purpose                                 |
//! |-------------------|--------|-----------------------------------------|
//! | `stylesheet_tag`  | filter | `<link>` tag with resolved asset URL    |
//! | `javascript_tag`  | filter | `<script>` tag with resolved asset URL  |
//! | `theme_image_url` | filter | bare resolved asset URL                 |
//! | `strftime`        | filter | chrono-based date formatting            |
//! | `markdown`        | filter | markdown → HTML (optional nested eval)  |
//!
//! Per-request values (host, path, method, ...) are NOT engine state;
//! they are threaded into each render as the `request` context entry.

use crate::config::SiteConfig;
use chrono::{DateTime, FixedOffset, NaiveDate};
use pulldown_cmark::{Options, Parser, html::push_html};
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Filter, Tera, Value};

// ============================================================================
// Request Metadata
// ============================================================================

/// Read-only request view exposed to templates under `request`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMeta {
    pub host: String,
    pub path: String,
    pub method: String,
    pub protocol: String,
    pub remote_ip: String,
}

// ============================================================================
// Engine
// ============================================================================

/// Process-wide template engine. Built once at startup, shared read-only
/// by all request tasks.
pub struct Engine {
    tera: Tera,
}

impl Engine {
    /// Load templates and snippets, register the helper filters.
    pub fn new(config: &SiteConfig) -> anyhow::Result<Self> {
        let glob = format!("{}/**/*", config.paths.templates.display());
        let mut tera = Tera::new(&glob)?;

        if config.paths.snippets.is_dir() {
            let snippets = Tera::new(&format!("{}/**/*", config.paths.snippets.display()))?;
            tera.extend(&snippets)?;
        }

        let static_url = config.serve.static_url.clone();
        tera.register_filter(
            "stylesheet_tag",
            AssetTag {
                template: r#"<link type="text/css" rel="stylesheet" media="screen" href="{url}">"#,
                static_url: static_url.clone(),
            },
        );
        tera.register_filter(
            "javascript_tag",
            AssetTag {
                template: r#"<script type="text/javascript" src="{url}"></script>"#,
                static_url: static_url.clone(),
            },
        );
        tera.register_filter("theme_image_url", ThemeImageUrl { static_url });
        tera.register_filter("strftime", strftime_filter);
        tera.register_filter("markdown", MarkdownFilter);

        Ok(Self { tera })
    }

    /// Render a template by name with the given context.
    pub fn render(&self, name: &str, context: &Context) -> tera::Result<String> {
        self.tera.render(name, context)
    }

    /// Whether a template with this name was loaded.
    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Number of loaded templates (reported by `agora check`).
    pub fn template_count(&self) -> usize {
        self.tera.get_template_names().count()
    }
}

// ============================================================================
// Template Name Derivation
// ============================================================================

/// Derive a template name from a request path.
///
/// Trailing slash means an implicit index document; anything else is the
/// literal path plus the fixed extension. The leading slash is dropped
/// for the template loader.
///
/// | Path        | Template         |
/// |-------------|------------------|
/// | `/`         | `index.html`     |
/// | `/about`    | `about.html`     |
/// | `/a/b`      | `a/b.html`       |
pub fn template_for_path(path: &str) -> String {
    let name = if path.ends_with('/') {
        format!("{path}index.html")
    } else {
        format!("{path}.html")
    };
    name.trim_start_matches('/').to_string()
}

// ============================================================================
// Asset URL Filters
// ============================================================================

/// Absolute URLs pass through; anything else hangs off the static prefix.
fn resolve_asset_url(name: &str, static_url: &str) -> String {
    if name.starts_with("http") {
        name.to_string()
    } else {
        format!("{static_url}{}", name.trim_start_matches('/'))
    }
}

/// Emits an HTML tag pointing at a resolved asset URL.
struct AssetTag {
    template: &'static str,
    static_url: String,
}

impl Filter for AssetTag {
    fn filter(&self, value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = value
            .as_str()
            .ok_or_else(|| tera::Error::msg("asset tag filter expects a string"))?;
        let url = resolve_asset_url(name, &self.static_url);
        Ok(Value::String(self.template.replace("{url}", &url)))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

/// Bare asset URL, for use inside `src`/`href` attributes.
struct ThemeImageUrl {
    static_url: String,
}

impl Filter for ThemeImageUrl {
    fn filter(&self, value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = value
            .as_str()
            .ok_or_else(|| tera::Error::msg("theme_image_url expects a string"))?;
        Ok(Value::String(resolve_asset_url(name, &self.static_url)))
    }
}

// ============================================================================
// Date Formatting
// ============================================================================

/// Accepts RFC 3339, RFC 2822 or plain `%Y-%m-%d` input.
fn parse_datetime(input: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc().fixed_offset())
}

/// `{{ page.date | strftime(format="%B %e, %Y") }}`
fn strftime_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let input = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("strftime expects a string"))?;
    let format = args
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("%Y-%m-%d");

    let parsed = parse_datetime(input)
        .ok_or_else(|| tera::Error::msg(format!("unrecognized datetime `{input}`")))?;

    Ok(Value::String(parsed.format(format).to_string()))
}

// ============================================================================
// Markdown
// ============================================================================

/// Markdown → HTML with GFM tables, strikethrough and footnotes.
///
/// With `inline_templates=true` the markdown source is evaluated as a
/// one-off template first, so data-driven markdown can use template
/// syntax before conversion.
struct MarkdownFilter;

impl Filter for MarkdownFilter {
    fn filter(&self, value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let text = value
            .as_str()
            .ok_or_else(|| tera::Error::msg("markdown expects a string"))?;

        let text = if args
            .get("inline_templates")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            Tera::one_off(text, &Context::new(), false)?
        } else {
            text.to_string()
        };

        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_FOOTNOTES);

        let mut html = String::new();
        push_html(&mut html, Parser::new_ext(&text, options));

        Ok(Value::String(html))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
