//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [paths] Section Defaults
// ============================================================================

pub mod paths {
    use std::path::PathBuf;

    pub fn manifest() -> PathBuf {
        "site.yaml".into()
    }

    pub fn templates() -> PathBuf {
        "templates".into()
    }

    pub fn snippets() -> PathBuf {
        "snippets".into()
    }

    pub fn assets() -> PathBuf {
        "assets".into()
    }

    pub fn data() -> PathBuf {
        "data".into()
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        8427
    }

    pub fn static_url() -> String {
        "/assets/".into()
    }
}

// ============================================================================
// [security] Section Defaults
// ============================================================================

pub mod security {
    /// Built-in security response headers, applied unless the config
    /// overrides the same header name.
    pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
        ("X-Frame-Options", "SAMEORIGIN"),
        ("X-XSS-Protection", "1; mode=block"),
        ("X-Content-Type-Options", "nosniff"),
        ("X-Permitted-Cross-Domain-Policies", "none"),
    ];

    /// max-age 20 years
    pub const HSTS: (&str, &str) = (
        "Strict-Transport-Security",
        "max-age=631152000; includeSubdomains",
    );
}

// ============================================================================
// [fetch] Section Defaults
// ============================================================================

pub mod fetch {
    pub fn timeout_secs() -> u64 {
        10
    }
}
