//! Agora - a content-aggregation web hub driven by a YAML site manifest.

mod cli;
mod config;
mod error;
mod fetch;
mod logger;
mod manifest;
mod pipeline;
mod render;
mod router;
mod serve;
mod watch;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use config::{SiteConfig, cfg, init_config};
use manifest::{Site, init_site, site};
use render::{Engine, template_for_path};
use router::RoutePattern;
use serve::serve_site;
use std::path::Path;

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    init_config(load_config(cli)?);

    let c = cfg();
    let loaded = Site::load(&c.paths.manifest)
        .with_context(|| format!("Failed to load manifest `{}`", c.paths.manifest.display()))?;
    init_site(loaded);

    match &cli.command {
        Commands::Serve { .. } => serve_site(),
        Commands::Check => check(),
    }
}

/// Load and validate configuration from CLI arguments.
///
/// A missing config file is not an error; everything has a default and
/// `validate` still insists on the manifest being present.
fn load_config(cli: &'static Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        SiteConfig::from_path(&config_path)?
    } else {
        SiteConfig::default()
    };
    config.update_with_cli(cli);
    config.validate()?;

    Ok(config)
}

/// `agora check`: load everything a `serve` would, report, exit.
///
/// Catches what is statically checkable before deploy: manifest parse
/// and pattern errors (already fatal above), plus missing templates for
/// literal routes. Pattern routes derive their template per request, so
/// only an explicit `tpl_name` is checkable for them.
fn check() -> Result<()> {
    let c = cfg();
    let engine = Engine::new(&c)?;
    let snapshot = site();

    log!("check"; "manifest: {} routes", snapshot.routes.len());
    log!("check"; "templates: {} loaded", engine.template_count());

    let mut problems = 0usize;
    for route in &snapshot.routes {
        let page = &route.page;
        if page.redirect.is_some() || !page.is_published() {
            continue;
        }

        let template = match (&page.tpl_name, &route.pattern) {
            (Some(name), _) => name.clone(),
            (None, RoutePattern::Literal(path)) => template_for_path(path),
            (None, _) => continue,
        };

        if !engine.has_template(&template) {
            log!("error"; "route `{}`: template `{}` not found", route.key, template);
            problems += 1;
        }
    }

    if problems > 0 {
        bail!("check found {problems} problem(s)");
    }

    log!("check"; "ok");
    Ok(())
}
