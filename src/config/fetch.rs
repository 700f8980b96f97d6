//! `[fetch]` section configuration.
//!
//! Settings for the remote data-source HTTP client.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[fetch]` section in agora.toml - remote data source settings.
///
/// # Example
/// ```toml
/// [fetch]
/// timeout_secs = 5
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// Request timeout for remote data sources, in seconds.
    /// A timed-out fetch surfaces as a fetch failure, it never blocks
    /// the request indefinitely.
    #[serde(default = "defaults::fetch::timeout_secs")]
    #[educe(Default = defaults::fetch::timeout_secs())]
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;

    #[test]
    fn test_fetch_config_default() {
        let config: SiteConfig = toml::from_str("").unwrap();
        assert_eq!(config.fetch.timeout_secs, 10);
    }

    #[test]
    fn test_fetch_config_override() {
        let config = r#"
            [fetch]
            timeout_secs = 3
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();
        assert_eq!(config.fetch.timeout_secs, 3);
    }
}
