//! Error taxonomy for configuration, manifest loading and request
//! handling.
//!
//! Four layers, matching how errors propagate:
//!
//! | Type          | Scope            | Effect                                |
//! |---------------|------------------|---------------------------------------|
//! | `ConfigError` | startup          | fatal, process does not start         |
//! | `LoadError`   | startup/reload   | fatal at startup, logged on reload    |
//! | `FetchError`  | one data source  | aborts the page render, maps to HTTP  |
//! | `PageError`   | one request      | converted to an HTTP response         |
//!
//! Per-request errors never escape the serving loop; only the startup
//! layers propagate to process exit.

use crate::manifest::SourceFormat;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// ConfigError - agora.toml problems
// ============================================================================

/// Errors raised while loading and validating `agora.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

// ============================================================================
// LoadError - fatal manifest problems
// ============================================================================

/// Errors raised while loading and compiling the site manifest.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("environment substitution failed: {0}")]
    Env(String),

    #[error("manifest parsing error")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("manifest root must be a mapping")]
    NotAMapping,

    #[error("`pages` must be a mapping of path patterns")]
    PagesNotAMapping,

    #[error("route key must be a string, got `{0}`")]
    NonStringKey(String),

    #[error("invalid route pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate route key `{0}`")]
    DuplicateRoute(String),

    #[error("invalid page definition for `{key}`")]
    Page {
        key: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("site metadata `{key}` is not representable")]
    Meta {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// FetchError - data source failures
// ============================================================================

/// Errors raised while resolving a single data source.
///
/// Each variant maps to an HTTP status through [`FetchError::status`];
/// the page render is aborted with that status, no partial render happens.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unresolved placeholder `{{{name}}}` in `{src}`")]
    Placeholder { name: String, src: String },

    #[error("upstream `{url}` returned status {status}")]
    Upstream { url: String, status: u16 },

    #[error("request to `{url}` failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("data file not found: `{0}`")]
    Missing(PathBuf),

    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse `{src}` as {format}: {message}")]
    Parse {
        src: String,
        format: SourceFormat,
        message: String,
    },
}

impl FetchError {
    /// HTTP status this failure surfaces as.
    ///
    /// Upstream statuses pass through; failures with no upstream status
    /// map to a derived code (404 for missing files, 502 for bad
    /// gateways, 500 for configuration errors).
    pub fn status(&self) -> u16 {
        match self {
            Self::Placeholder { .. } | Self::Io(..) => 500,
            Self::Upstream { status, .. } => *status,
            Self::Network { .. } | Self::Parse { .. } => 502,
            Self::Missing(_) => 404,
        }
    }
}

// ============================================================================
// PageError - per-request terminal errors
// ============================================================================

/// Terminal error states of the page resolution pipeline.
#[derive(Debug, Error)]
pub enum PageError {
    /// No route matched, or the matched page is unpublished.
    #[error("no page matches the requested path")]
    NotFound,

    /// A declared data source failed; carries the upstream status.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Template missing or render failure.
    #[error("template error: {0}")]
    Render(#[from] tera::Error),
}

impl PageError {
    /// HTTP status code for the response.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Fetch(e) => e.status(),
            Self::Render(_) => 500,
        }
    }
}

/// Reason phrase for the status codes this server produces.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Error",
    }
}
