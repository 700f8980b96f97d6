//! `[security]` section configuration.
//!
//! HTTPS enforcement and security response headers. These wrap the page
//! pipeline's entry point; the core pipeline runs only after they pass.

use super::defaults::security::{DEFAULT_HEADERS, HSTS};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `[security]` section in agora.toml.
///
/// # Example
/// ```toml
/// [security]
/// force_https = true
///
/// [security.headers]
/// X-Frame-Options = "DENY"
/// X-Custom-Header = "value"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Redirect plain-HTTP requests to HTTPS (301).
    /// Requests to `localhost:*` are exempt.
    #[serde(default)]
    pub force_https: bool,

    /// Header overrides and additions, merged over the built-in
    /// defaults. Setting a default header name replaces its value.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl SecurityConfig {
    /// Resolve the full header set for one response.
    ///
    /// Built-in defaults first, then config overrides/additions, then
    /// Strict-Transport-Security when the request came over HTTPS and
    /// the config did not already set it.
    pub fn response_headers(&self, https: bool) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = DEFAULT_HEADERS
            .iter()
            .filter(|(name, _)| !self.headers.contains_key(*name))
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();

        for (name, value) in &self.headers {
            merged.push((name.clone(), value.clone()));
        }

        if https && !self.headers.contains_key(HSTS.0) {
            merged.push((HSTS.0.to_string(), HSTS.1.to_string()));
        }

        merged
    }
}
