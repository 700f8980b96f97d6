//! HTTP server for the manifest-driven site.
//!
//! Built on `tiny_http` with the following responsibilities:
//!
//! - HTTPS enforcement and security response headers on every response
//! - Static asset serving under the configured URL prefix
//! - Trailing-slash normalization (301) before route matching
//! - Page resolution through the pipeline, error pages included
//! - Manifest watching and hot reload (via `watch` module)
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │
//! │ (accept loop)   │     │ (manifest file)  │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//!   spawn request task       reload_site()
//!   on tokio runtime        (atomic swap)
//! └─────────────────────────────────────────────┘
//!                    │
//!                    ▼
//!          pipeline::resolve / render_error
//! ```
//!
//! The accept loop is blocking; each accepted request is moved onto the
//! tokio runtime so data-source fan-out can run concurrently without
//! stalling other requests.

use crate::{
    config::{SiteConfig, cfg},
    fetch::Fetcher,
    log,
    manifest::site,
    pipeline::{self, PageOutcome},
    render::{Engine, RequestMeta},
    router::trailing_slash_redirect,
    watch::watch_manifest_blocking,
};
use anyhow::{Context, Result};
use std::{
    fs,
    net::SocketAddr,
    path::{Component, Path},
    sync::Arc,
};
use tiny_http::{Header, Request, Response, Server};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the server.
///
/// This function:
/// 1. Binds to the configured interface and port (with auto-retry on port conflict)
/// 2. Sets up Ctrl+C handler for graceful shutdown
/// 3. Spawns the manifest watcher thread (if enabled)
/// 4. Enters the accept loop, spawning one task per request
///
/// The server blocks until Ctrl+C is received.
pub fn serve_site() -> Result<()> {
    let c = cfg();
    let interface = c.interface()?;
    let base_port = c.serve.port;

    let (server, addr) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    // Spawn manifest watcher thread
    if c.serve.watch {
        std::thread::spawn(move || {
            if let Err(err) = watch_manifest_blocking() {
                log!("watch"; "{err}");
            }
        });
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let engine = Arc::new(Engine::new(&c)?);
    let fetcher = Arc::new(Fetcher::new(&c)?);

    // Accept in main thread (blocks until Ctrl+C), handle per-request
    // on the runtime so slow data sources never stall the accept loop
    for request in server.incoming_requests() {
        let engine = Arc::clone(&engine);
        let fetcher = Arc::clone(&fetcher);

        runtime.spawn(async move {
            if let Err(e) = handle_request(request, &cfg(), &engine, &fetcher).await {
                log!("serve"; "request error: {e}");
            }
        });
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: std::net::IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < max_retries => {
                // Will retry silently
                continue;
            }
            Err(e) => {
                // Last attempt failed
                return Err(anyhow::anyhow!(
                    "Failed to bind after {} attempts (ports {}-{}): {}",
                    max_retries,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single HTTP request.
///
/// Resolution order:
/// 1. HTTPS enforcement (301 to https, localhost exempt)
/// 2. Static asset prefix → serve from the asset directory
/// 3. Trailing slash → 301 to the stripped path
/// 4. Page pipeline → rendered page, redirect, or error page
async fn handle_request(
    request: Request,
    config: &SiteConfig,
    engine: &Engine,
    fetcher: &Fetcher,
) -> Result<()> {
    // Decode URL-encoded characters (e.g., %20 → space)
    let url_path = urlencoding::decode(request.url())
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| request.url().to_string());

    // Strip query string (e.g., ?t=123456) before matching, but keep it
    // around so redirects can carry it through
    let (path, query) = match url_path.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (url_path, None),
    };

    let https = is_https(&request);
    let host = header_value(&request, "Host").unwrap_or_default().to_string();

    if config.security.force_https && !https && !is_localhost(&host) {
        let target = with_query(&format!("https://{host}{path}"), query.as_deref());
        return respond_redirect(request, config, &target, true, https);
    }

    let meta = RequestMeta {
        host,
        path: path.clone(),
        method: request.method().to_string(),
        protocol: if https { "https" } else { "http" }.to_string(),
        remote_ip: request
            .remote_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_default(),
    };

    // Static assets bypass the pipeline entirely
    if let Some(rest) = path.strip_prefix(config.serve.static_url.as_str()) {
        return match load_asset(config, rest) {
            Some((content, content_type)) => {
                respond_body(request, config, 200, content_type, content, https)
            }
            None => {
                let (body, content_type) =
                    pipeline::render_error(&site(), engine, fetcher, &meta, 404).await;
                respond_body(request, config, 404, &content_type, body.into_bytes(), https)
            }
        };
    }

    if let Some(target) = trailing_slash_redirect(&path) {
        let target = with_query(&target, query.as_deref());
        return respond_redirect(request, config, &target, true, https);
    }

    // Snapshot the manifest once; a concurrent reload must not change
    // routing halfway through this request
    let snapshot = site();

    match pipeline::resolve(&snapshot, engine, fetcher, &path, &meta).await {
        Ok(PageOutcome::Redirect { target, permanent }) => {
            respond_redirect(request, config, &target, permanent, https)
        }
        Ok(PageOutcome::Rendered { body, content_type }) => {
            respond_body(request, config, 200, &content_type, body.into_bytes(), https)
        }
        Err(err) => {
            let status = err.status();
            if status >= 500 {
                log!("error"; "{path}: {err}");
            }

            let (body, content_type) =
                pipeline::render_error(&snapshot, engine, fetcher, &meta, status).await;
            respond_body(request, config, status, &content_type, body.into_bytes(), https)
        }
    }
}

// ============================================================================
// Request Introspection
// ============================================================================

/// First header value matching `name`, case-insensitive.
fn header_value<'a>(request: &'a Request, name: &'static str) -> Option<&'a str> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str())
}

/// Whether the request arrived over HTTPS, judged by the proxy header.
/// The server itself only speaks plain HTTP; TLS terminates upstream.
fn is_https(request: &Request) -> bool {
    header_value(request, "X-Forwarded-Proto")
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

/// Re-attach the original query string to a redirect target.
fn with_query(target: &str, query: Option<&str>) -> String {
    match query {
        Some(query) => format!("{target}?{query}"),
        None => target.to_string(),
    }
}

/// Local development hosts are exempt from HTTPS enforcement.
fn is_localhost(host: &str) -> bool {
    if host.starts_with('[') {
        return host.strip_prefix('[').and_then(|h| h.split(']').next()) == Some("::1");
    }
    let name = host.split(':').next().unwrap_or(host);
    matches!(name, "localhost" | "127.0.0.1")
}

// ============================================================================
// Response Helpers
// ============================================================================

/// Send a body response with security headers applied.
fn respond_body(
    request: Request,
    config: &SiteConfig,
    status: u16,
    content_type: &str,
    body: Vec<u8>,
    https: bool,
) -> Result<()> {
    let mut response = Response::from_data(body)
        .with_status_code(status)
        .with_header(
            Header::from_bytes("Content-Type", content_type)
                .map_err(|()| anyhow::anyhow!("invalid content type `{content_type}`"))?,
        );

    for (name, value) in config.security.response_headers(https) {
        response = response.with_header(
            Header::from_bytes(name.as_bytes(), value.as_bytes())
                .map_err(|()| anyhow::anyhow!("invalid response header `{name}`"))?,
        );
    }

    request.respond(response)?;
    Ok(())
}

/// Send a redirect; `permanent` selects 301 over 302.
fn respond_redirect(
    request: Request,
    config: &SiteConfig,
    target: &str,
    permanent: bool,
    https: bool,
) -> Result<()> {
    let status = if permanent { 301 } else { 302 };

    let mut response = Response::from_data(Vec::new())
        .with_status_code(status)
        .with_header(
            Header::from_bytes("Location", target)
                .map_err(|()| anyhow::anyhow!("invalid redirect target `{target}`"))?,
        );

    for (name, value) in config.security.response_headers(https) {
        response = response.with_header(
            Header::from_bytes(name.as_bytes(), value.as_bytes())
                .map_err(|()| anyhow::anyhow!("invalid response header `{name}`"))?,
        );
    }

    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Static Assets
// ============================================================================

/// Load a static asset from the asset directory.
///
/// Parent-directory components are rejected so a crafted path can never
/// escape the asset root. Returns `None` for misses; the caller turns
/// that into a 404.
fn load_asset(config: &SiteConfig, rest: &str) -> Option<(Vec<u8>, &'static str)> {
    let rest = rest.trim_start_matches('/');
    if Path::new(rest)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }

    let path = config.paths.assets.join(rest);
    if !path.is_file() {
        return None;
    }

    let content = fs::read(&path).ok()?;
    Some((content, guess_content_type(&path)))
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Tests
// ============================================================================
