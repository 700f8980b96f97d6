//! Site manifest loading for `site.yaml`.
//!
//! The manifest is the declarative description of the whole site: a
//! `pages` mapping of path-pattern → page definition, plus arbitrary
//! site-wide metadata passed to templates verbatim.
//!
//! # Example
//!
//! ```yaml
//! title: My Hub
//! tagline: aggregated content, one manifest
//!
//! pages:
//!   /: {}
//!   /about: { tpl_name: about.html }
//!   /old-blog:
//!     redirect: { target: /blog, permanent: true }
//!   /drafts/secret: { published: false }
//!   /posts/(?P<slug>[a-z0-9-]+):
//!     data_sources:
//!       post: { src: "posts/{slug}.json", format: json }
//!   /feeds/*: { tpl_name: feed.html }
//! ```
//!
//! Before YAML parsing, the raw text goes through an environment-variable
//! substitution pass (`${VAR}` / `$VAR`), so manifests can reference the
//! process environment.
//!
//! Declaration order of `pages` is significant: the route matcher returns
//! the first full match. The manifest is immutable after load; hot reload
//! swaps the whole `Site` atomically (see `handle`).

mod handle;

pub use handle::{init_site, reload_site, site};

use crate::{error::LoadError, router::RoutePattern};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fmt, fs,
    path::Path,
};

// ============================================================================
// Data Model
// ============================================================================

/// The loaded site: ordered route table plus site-wide metadata.
///
/// Built once at startup (or on reload) and shared read-only across all
/// concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct Site {
    /// Everything in the manifest that is not `pages`, passed to
    /// templates verbatim under the `site` key.
    pub meta: serde_json::Map<String, serde_json::Value>,

    /// Routes in declaration order. Order is the precedence contract.
    pub routes: Vec<PageRoute>,
}

/// One route table entry: the raw manifest key, its compiled pattern and
/// the page it maps to.
#[derive(Debug, Clone)]
pub struct PageRoute {
    pub key: String,
    pub pattern: RoutePattern,
    pub page: Page,
}

/// A page definition as declared in the manifest.
///
/// Unknown attributes are preserved in `extra` and exposed to templates,
/// so manifests can carry per-page values the templates understand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    /// Redirect instead of rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,

    /// Publish flag; absent means published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,

    /// Explicit Content-Type response header.
    #[serde(
        rename = "content-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<String>,

    /// Explicit template name; falls back to a path-derived name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpl_name: Option<String>,

    /// Named auxiliary data sources fetched per request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_sources: BTreeMap<String, DataSourceSpec>,

    /// Any other page attribute, passed through to templates.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Page {
    /// `published` defaults to true; only an explicit `false` hides a page.
    pub fn is_published(&self) -> bool {
        self.published.unwrap_or(true)
    }
}

/// Redirect declaration on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redirect {
    pub target: String,
    /// `true` → 301, absent/`false` → 302.
    #[serde(default)]
    pub permanent: bool,
}

/// A named auxiliary data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceSpec {
    /// Local path relative to the data root, or an absolute URL.
    /// May contain `{name}` placeholders filled from route captures.
    pub src: String,
    pub format: SourceFormat,
}

/// Fixed enumeration of data source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Json,
    Yaml,
    #[serde(alias = "rss-feed")]
    Rss,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
            Self::Rss => write!(f, "rss"),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Site {
    /// Load and compile the manifest from a file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let raw =
            fs::read_to_string(path).map_err(|err| LoadError::Io(path.to_path_buf(), err))?;
        Self::from_str(&raw)
    }

    /// Parse manifest text: env substitution, YAML parse, pattern
    /// compilation. Any failure here is fatal at startup.
    pub fn from_str(raw: &str) -> Result<Self, LoadError> {
        let expanded = shellexpand::env(raw).map_err(|err| LoadError::Env(err.to_string()))?;
        let doc: serde_yaml_ng::Value = serde_yaml_ng::from_str(&expanded)?;
        let mapping = doc.as_mapping().ok_or(LoadError::NotAMapping)?;

        let mut meta = serde_json::Map::new();
        let mut routes = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (key, value) in mapping {
            let key = key
                .as_str()
                .ok_or_else(|| LoadError::NonStringKey(format!("{key:?}")))?;

            if key == "pages" {
                let pages = value.as_mapping().ok_or(LoadError::PagesNotAMapping)?;
                for (page_key, page_value) in pages {
                    let page_key = page_key
                        .as_str()
                        .ok_or_else(|| LoadError::NonStringKey(format!("{page_key:?}")))?;

                    if !seen.insert(page_key.to_string()) {
                        return Err(LoadError::DuplicateRoute(page_key.to_string()));
                    }

                    let pattern = RoutePattern::compile(page_key)?;
                    let page: Page = serde_yaml_ng::from_value(page_value.clone()).map_err(
                        |source| LoadError::Page {
                            key: page_key.to_string(),
                            source,
                        },
                    )?;

                    routes.push(PageRoute {
                        key: page_key.to_string(),
                        pattern,
                        page,
                    });
                }
            } else {
                let value = serde_json::to_value(value).map_err(|source| LoadError::Meta {
                    key: key.to_string(),
                    source,
                })?;
                meta.insert(key.to_string(), value);
            }
        }

        Ok(Self { meta, routes })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_passthrough() {
        let site = Site::from_str(
            r"
title: Test Hub
tagline: all the content
pages: {}
",
        )
        .unwrap();

        assert_eq!(
            site.meta.get("title").and_then(|v| v.as_str()),
            Some("Test Hub")
        );
        assert_eq!(
            site.meta.get("tagline").and_then(|v| v.as_str()),
            Some("all the content")
        );
        assert!(site.routes.is_empty());
    }

    #[test]
    fn test_routes_keep_declaration_order() {
        let site = Site::from_str(
            r"
pages:
  /first: {}
  /second: {}
  /third: {}
",
        )
        .unwrap();

        let keys: Vec<_> = site.routes.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["/first", "/second", "/third"]);
    }

    #[test]
    fn test_page_attributes() {
        let site = Site::from_str(
            r"
pages:
  /sitemap.xml:
    tpl_name: sitemap.xml
    content-type: application/xml
  /drafts/wip:
    published: false
  /old:
    redirect: { target: /new, permanent: true }
",
        )
        .unwrap();

        let sitemap = &site.routes[0].page;
        assert_eq!(sitemap.tpl_name.as_deref(), Some("sitemap.xml"));
        assert_eq!(sitemap.content_type.as_deref(), Some("application/xml"));
        assert!(sitemap.is_published());

        let draft = &site.routes[1].page;
        assert!(!draft.is_published());

        let old = &site.routes[2].page;
        let redirect = old.redirect.as_ref().unwrap();
        assert_eq!(redirect.target, "/new");
        assert!(redirect.permanent);
    }

    #[test]
    fn test_redirect_permanent_defaults_false() {
        let site = Site::from_str(
            r"
pages:
  /moved:
    redirect: { target: / }
",
        )
        .unwrap();

        let redirect = site.routes[0].page.redirect.as_ref().unwrap();
        assert!(!redirect.permanent);
    }

    #[test]
    fn test_data_sources_parse() {
        let site = Site::from_str(
            r"
pages:
  /dashboard:
    data_sources:
      stats: { src: stats.yaml, format: yaml }
      news: { src: 'https://example.com/news.json', format: json }
      feed: { src: 'https://example.com/rss.xml', format: rss }
",
        )
        .unwrap();

        let sources = &site.routes[0].page.data_sources;
        assert_eq!(sources.len(), 3);
        assert_eq!(sources["stats"].format, SourceFormat::Yaml);
        assert_eq!(sources["news"].format, SourceFormat::Json);
        assert_eq!(sources["feed"].format, SourceFormat::Rss);
    }

    #[test]
    fn test_rss_feed_format_alias() {
        let site = Site::from_str(
            r"
pages:
  /news:
    data_sources:
      feed: { src: 'https://example.com/rss.xml', format: rss-feed }
",
        )
        .unwrap();

        assert_eq!(
            site.routes[0].page.data_sources["feed"].format,
            SourceFormat::Rss
        );
    }

    #[test]
    fn test_extra_page_attributes_preserved() {
        let site = Site::from_str(
            r"
pages:
  /about:
    headline: Who we are
    weight: 3
",
        )
        .unwrap();

        let extra = &site.routes[0].page.extra;
        assert_eq!(
            extra.get("headline").and_then(|v| v.as_str()),
            Some("Who we are")
        );
        assert_eq!(extra.get("weight").and_then(|v| v.as_i64()), Some(3));
    }

    #[test]
    fn test_env_substitution() {
        // set_var is unsafe in edition 2024; tests run single-purpose here
        unsafe { std::env::set_var("AGORA_TEST_TITLE", "From Env") };

        let site = Site::from_str(
            r"
title: ${AGORA_TEST_TITLE}
pages: {}
",
        )
        .unwrap();

        assert_eq!(
            site.meta.get("title").and_then(|v| v.as_str()),
            Some("From Env")
        );
    }

    #[test]
    fn test_env_substitution_undefined_var_fails() {
        let result = Site::from_str(
            r"
title: ${AGORA_TEST_SURELY_UNDEFINED_VAR}
pages: {}
",
        );

        assert!(matches!(result, Err(LoadError::Env(_))));
    }

    #[test]
    fn test_bad_pattern_is_fatal() {
        let result = Site::from_str(
            r"
pages:
  /broken/(?P<x>[: {}
",
        );

        // either YAML or pattern error depending on quoting, both fatal
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_yaml_is_fatal() {
        assert!(Site::from_str("pages: [not: a: mapping").is_err());
    }

    #[test]
    fn test_non_mapping_root_rejected() {
        assert!(matches!(
            Site::from_str("- just\n- a\n- list\n"),
            Err(LoadError::NotAMapping)
        ));
    }

    #[test]
    fn test_pages_must_be_mapping() {
        assert!(matches!(
            Site::from_str("pages: [a, b]\n"),
            Err(LoadError::PagesNotAMapping)
        ));
    }

    #[test]
    fn test_duplicate_route_keys_fail_load() {
        // serde_yaml_ng rejects duplicate mapping keys itself; the
        // explicit DuplicateRoute check covers deserializers that don't
        let result = Site::from_str(
            r"
pages:
  /twice: {}
  /twice: { published: false }
",
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = Site::from_str(
            r"
pages:
  /x:
    data_sources:
      d: { src: d.csv, format: csv }
",
        );

        assert!(matches!(result, Err(LoadError::Page { .. })));
    }
}
