//! Route matching over the manifest's declarative path patterns.
//!
//! Every page key in the manifest compiles into a [`RoutePattern`] at load
//! time. Matching walks the route table in declaration order and returns
//! the FIRST full match; operators must declare more specific wildcard
//! patterns before broader ones. This ordering is a contract, not an
//! implementation detail.
//!
//! Three pattern forms:
//!
//! | Form     | Example                         | Captures            |
//! |----------|---------------------------------|---------------------|
//! | Literal  | `/about`                        | none                |
//! | Wildcard | `/docs/*`                       | none (discarded)    |
//! | Named    | `/posts/(?P<slug>[a-z0-9-]+)`   | named groups        |

use crate::{
    error::LoadError,
    manifest::{PageRoute, Site},
};
use regex::Regex;
use std::collections::BTreeMap;

// ============================================================================
// Route Patterns
// ============================================================================

/// A compiled path-matching pattern.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// Exact path match only.
    Literal(String),

    /// `prefix/*` - matches any deeper path under the fixed prefix.
    /// The remainder is discarded, no captures are produced.
    Wildcard { prefix: String },

    /// Anchored regular expression with named capture groups.
    /// Fullmatch semantics: the entire path must match.
    Named(Regex),
}

impl RoutePattern {
    /// Compile a manifest page key into a pattern.
    ///
    /// A key containing regex group syntax (`(?P<` or `(?:`) compiles as
    /// an anchored regex; a key ending in `/*` becomes a wildcard;
    /// anything else matches literally. The named-capture form wins when
    /// a key could be read both ways.
    pub fn compile(key: &str) -> Result<Self, LoadError> {
        if key.contains("(?P<") || key.contains("(?:") {
            let anchored = format!(r"\A(?:{key})\z");
            let regex = Regex::new(&anchored).map_err(|source| LoadError::Pattern {
                pattern: key.to_string(),
                source,
            })?;
            return Ok(Self::Named(regex));
        }

        if let Some(prefix) = key.strip_suffix("/*") {
            return Ok(Self::Wildcard {
                prefix: prefix.to_string(),
            });
        }

        Ok(Self::Literal(key.to_string()))
    }

    /// Test a request path against this pattern.
    ///
    /// Returns the named-capture mapping on a full match (empty for
    /// literal and wildcard patterns), `None` otherwise.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        match self {
            Self::Literal(key) => (path == key).then(BTreeMap::new),

            Self::Wildcard { prefix } => {
                // The remainder must begin a new segment: `/docs/*`
                // matches `/docs/a/b` but not `/docs` or `/docsfoo`.
                let rest = path.strip_prefix(prefix.as_str())?;
                rest.starts_with('/').then(BTreeMap::new)
            }

            Self::Named(regex) => {
                let caps = regex.captures(path)?;
                let named = regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.to_string(), m.as_str().to_string()))
                    })
                    .collect();
                Some(named)
            }
        }
    }
}

// ============================================================================
// Route Matching
// ============================================================================

/// Ephemeral per-request match result. Never persisted.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    /// The first route whose pattern fully matched.
    pub route: &'a PageRoute,
    /// Capture-group name → matched substring.
    pub captures: BTreeMap<String, String>,
}

impl Site {
    /// Map a request path to a page definition.
    ///
    /// First full match in declaration order wins; `None` signals a
    /// not-found condition to the page resolution pipeline.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            route
                .pattern
                .matches(path)
                .map(|captures| RouteMatch { route, captures })
        })
    }
}

// ============================================================================
// Path Normalization
// ============================================================================

/// Trailing-slash normalization target, if the path needs one.
///
/// Any non-root path ending in `/` is permanently redirected to the
/// slash-stripped form before route matching runs. Root itself is left
/// alone.
pub fn trailing_slash_redirect(path: &str) -> Option<String> {
    if path.len() > 1 && path.ends_with('/') {
        let stripped = path.trim_end_matches('/');
        if stripped.is_empty() {
            Some("/".to_string())
        } else {
            Some(stripped.to_string())
        }
    } else {
        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Site;

    fn site_from(yaml: &str) -> Site {
        Site::from_str(yaml).unwrap()
    }

    #[test]
    fn test_literal_pattern_exact_match_only() {
        let p = RoutePattern::compile("/about").unwrap();

        assert!(p.matches("/about").is_some());
        assert!(p.matches("/about/team").is_none());
        assert!(p.matches("/abou").is_none());
        assert!(p.matches("/about/").is_none());
    }

    #[test]
    fn test_wildcard_pattern_requires_deeper_segment() {
        let p = RoutePattern::compile("/docs/*").unwrap();

        assert!(p.matches("/docs/intro").is_some());
        assert!(p.matches("/docs/a/b/c").is_some());
        assert!(p.matches("/docs").is_none());
        assert!(p.matches("/docsfoo/intro").is_none());
    }

    #[test]
    fn test_wildcard_pattern_discards_captures() {
        let p = RoutePattern::compile("/docs/*").unwrap();
        let caps = p.matches("/docs/a/b").unwrap();
        assert!(caps.is_empty());
    }

    #[test]
    fn test_named_pattern_extracts_captures() {
        let p = RoutePattern::compile("/posts/(?P<slug>[a-z0-9-]+)").unwrap();
        let caps = p.matches("/posts/hello-world").unwrap();

        assert_eq!(caps.get("slug").map(String::as_str), Some("hello-world"));
    }

    #[test]
    fn test_named_pattern_fullmatch_semantics() {
        let p = RoutePattern::compile("/posts/(?P<slug>[a-z]+)").unwrap();

        // a partial match anywhere in the path is not enough
        assert!(p.matches("/posts/hello/extra").is_none());
        assert!(p.matches("/x/posts/hello").is_none());
    }

    #[test]
    fn test_named_pattern_multiple_groups() {
        let p =
            RoutePattern::compile("/archive/(?P<year>[0-9]{4})/(?P<month>[0-9]{2})").unwrap();
        let caps = p.matches("/archive/2024/03").unwrap();

        assert_eq!(caps.get("year").map(String::as_str), Some("2024"));
        assert_eq!(caps.get("month").map(String::as_str), Some("03"));
    }

    #[test]
    fn test_bad_pattern_fails_compile() {
        let result = RoutePattern::compile("/broken/(?P<slug>[a-z");
        assert!(matches!(result, Err(LoadError::Pattern { .. })));
    }

    #[test]
    fn test_match_path_declaration_order_wins() {
        // the narrower wildcard is declared first, so it wins for its
        // subtree even though the broad one would also match
        let site = site_from(
            r"
pages:
  /docs/api/*: { tpl_name: api.html }
  /docs/*: { tpl_name: docs.html }
",
        );

        let m = site.match_path("/docs/api/v2").unwrap();
        assert_eq!(m.route.page.tpl_name.as_deref(), Some("api.html"));

        let m = site.match_path("/docs/guide").unwrap();
        assert_eq!(m.route.page.tpl_name.as_deref(), Some("docs.html"));
    }

    #[test]
    fn test_match_path_literal_before_wildcard() {
        let site = site_from(
            r"
pages:
  /docs/special: { tpl_name: special.html }
  /docs/*: {}
",
        );

        let m = site.match_path("/docs/special").unwrap();
        assert_eq!(m.route.page.tpl_name.as_deref(), Some("special.html"));
    }

    #[test]
    fn test_match_path_no_match() {
        let site = site_from("pages:\n  /: {}\n");
        assert!(site.match_path("/missing").is_none());
    }

    #[test]
    fn test_match_path_returns_captures() {
        let site = site_from(
            r"
pages:
  /items/(?P<id>[0-9]+): {}
",
        );

        let m = site.match_path("/items/42").unwrap();
        assert_eq!(m.captures.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_trailing_slash_redirect() {
        assert_eq!(trailing_slash_redirect("/somepath/").as_deref(), Some("/somepath"));
        assert_eq!(trailing_slash_redirect("/a/b///").as_deref(), Some("/a/b"));
        assert_eq!(trailing_slash_redirect("/somepath"), None);
        // root is never redirected
        assert_eq!(trailing_slash_redirect("/"), None);
    }
}
