//! Data source resolution: fetch, parse, fan-out.
//!
//! Each page may declare named data sources; per request they are all
//! fetched CONCURRENTLY and the pipeline joins them before rendering.
//! Resolution of one source, each step failing fast:
//!
//! 1. Substitute `{name}` placeholders in `src` from route captures
//! 2. `http(s)://` source → GET with a bounded timeout; anything else →
//!    read relative to the configured data root
//! 3. Parse raw bytes by declared format (json | yaml | rss)
//!
//! A single failing source aborts the whole page render with that
//! source's error; a later-completing sibling never masks it, because
//! the join is fail-fast and drops the remaining in-flight fetches.
//!
//! Successful fetches are timed and reported to a [`FetchObserver`];
//! that is a side channel only, no core logic depends on it.

use crate::{
    config::SiteConfig,
    error::FetchError,
    log,
    manifest::{DataSourceSpec, SourceFormat},
};
use regex::Regex;
use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
    sync::{Arc, LazyLock},
    time::{Duration, Instant},
};

// ============================================================================
// Observability Hook
// ============================================================================

/// Receives fetch duration samples keyed by source identity and format.
pub trait FetchObserver: Send + Sync {
    fn record(&self, source: &str, format: SourceFormat, elapsed: Duration);
}

/// Default observer: one log line per successful fetch.
pub struct LogObserver;

impl FetchObserver for LogObserver {
    fn record(&self, source: &str, format: SourceFormat, elapsed: Duration) {
        log!("fetch"; "{source} ({format}) resolved in {elapsed:.2?}");
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Resolves data sources for pages. One instance per serving process,
/// shared across request tasks; the inner reqwest client pools
/// connections.
pub struct Fetcher {
    client: reqwest::Client,
    data_root: PathBuf,
    observer: Arc<dyn FetchObserver>,
}

impl Fetcher {
    /// Build a fetcher from config: bounded-timeout HTTP client plus the
    /// local data root.
    pub fn new(config: &SiteConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            data_root: config.paths.data.clone(),
            observer: Arc::new(LogObserver),
        })
    }

    /// Replace the observer (used by tests and alternative sinks).
    pub fn with_observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Fetch every declared source concurrently (fan-out), join before
    /// returning (fan-in). First failure wins; remaining futures are
    /// dropped, cancelling their in-flight work.
    pub async fn fetch_all(
        &self,
        sources: &BTreeMap<String, DataSourceSpec>,
        captures: &BTreeMap<String, String>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, FetchError> {
        let tasks = sources.iter().map(|(name, spec)| async move {
            let value = self.fetch_source(spec, captures).await?;
            Ok::<_, FetchError>((name.clone(), value))
        });

        let resolved = futures::future::try_join_all(tasks).await?;
        Ok(resolved.into_iter().collect())
    }

    /// Resolve a single source to a parsed value.
    pub async fn fetch_source(
        &self,
        spec: &DataSourceSpec,
        captures: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, FetchError> {
        let src = substitute(&spec.src, captures)?;
        let started = Instant::now();

        let bytes = if src.starts_with("http://") || src.starts_with("https://") {
            self.fetch_remote(&src).await?
        } else {
            self.read_local(&src).await?
        };

        let value = parse_payload(&bytes, spec.format, &src)?;
        self.observer.record(&spec.src, spec.format, started.elapsed());

        Ok(value)
    }

    /// GET a remote source. Non-2xx carries the upstream status through;
    /// timeouts and connection failures map to a generic gateway error.
    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|source| FetchError::Network {
                    url: url.to_string(),
                    source,
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Upstream {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;

        Ok(body.to_vec())
    }

    /// Read a local source relative to the data root.
    ///
    /// `src` has already been through capture substitution, so it is
    /// request-controlled. Absolute paths and parent-directory
    /// components are rejected as not-found; a crafted capture can
    /// never read outside the data root.
    async fn read_local(&self, src: &str) -> Result<Vec<u8>, FetchError> {
        let rel = Path::new(src);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(FetchError::Missing(self.data_root.join(src)));
        }

        let path = self.data_root.join(rel);

        tokio::fs::read(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                FetchError::Missing(path.clone())
            } else {
                FetchError::Io(path.clone(), err)
            }
        })
    }
}

// ============================================================================
// Placeholder Substitution
// ============================================================================

/// `{name}` placeholders accepted in `src` values.
static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Substitute route captures into a source template.
///
/// Every placeholder must resolve; an unresolved one is a configuration
/// error, not a not-found condition.
fn substitute(src: &str, captures: &BTreeMap<String, String>) -> Result<String, FetchError> {
    let mut result = String::with_capacity(src.len());
    let mut last = 0;

    for caps in RE_PLACEHOLDER.captures_iter(src) {
        let whole = caps.get(0).unwrap();
        let name = &caps[1];

        let value = captures.get(name).ok_or_else(|| FetchError::Placeholder {
            name: name.to_string(),
            src: src.to_string(),
        })?;

        result.push_str(&src[last..whole.start()]);
        result.push_str(value);
        last = whole.end();
    }
    result.push_str(&src[last..]);

    Ok(result)
}

// ============================================================================
// Payload Parsing
// ============================================================================

/// Parse raw bytes according to the declared format.
fn parse_payload(
    bytes: &[u8],
    format: SourceFormat,
    src: &str,
) -> Result<serde_json::Value, FetchError> {
    let parse_err = |message: String| FetchError::Parse {
        src: src.to_string(),
        format,
        message,
    };

    match format {
        SourceFormat::Json => serde_json::from_slice(bytes).map_err(|e| parse_err(e.to_string())),

        // serde_yaml_ng only builds plain values, it never runs
        // constructors the way unsafe YAML loaders can
        SourceFormat::Yaml => {
            let value: serde_yaml_ng::Value =
                serde_yaml_ng::from_slice(bytes).map_err(|e| parse_err(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| parse_err(e.to_string()))
        }

        SourceFormat::Rss => {
            let channel =
                rss::Channel::read_from(bytes).map_err(|e| parse_err(e.to_string()))?;
            Ok(feed_to_value(&channel))
        }
    }
}

/// Flatten a feed into a plain value: channel fields plus an `items`
/// sequence, so templates can iterate entries without knowing rss types.
fn feed_to_value(channel: &rss::Channel) -> serde_json::Value {
    let items: Vec<serde_json::Value> = channel
        .items()
        .iter()
        .map(|item| {
            serde_json::json!({
                "title": item.title(),
                "link": item.link(),
                "description": item.description(),
                "author": item.author(),
                "pub_date": item.pub_date(),
                "guid": item.guid().map(rss::Guid::value),
                "categories": item
                    .categories()
                    .iter()
                    .map(rss::Category::name)
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    serde_json::json!({
        "title": channel.title(),
        "link": channel.link(),
        "description": channel.description(),
        "language": channel.language(),
        "pub_date": channel.pub_date(),
        "items": items,
    })
}

// ============================================================================
// Tests
// ============================================================================
