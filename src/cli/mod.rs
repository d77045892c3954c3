//! Command-line interface module.

mod args;
pub mod inspect;
pub mod replay;
pub mod serve;

pub use args::{Cli, Commands, SessionArgs};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::BindConfig;
use crate::dom::Document;
use crate::driver::Registry;
use crate::session::SessionOptions;

/// Read and parse an HTML page.
fn load_page(path: &Path) -> Result<Document> {
    let markup = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read page `{}`", path.display()))?;
    Document::from_html(&markup).with_context(|| format!("failed to parse `{}`", path.display()))
}

/// Registry with the reference drivers, checked against `[rate.*]` names.
fn registry_for(config: &BindConfig) -> Arc<Registry> {
    let registry = Registry::with_builtin();
    for name in config.rate.keys() {
        if !registry.contains(name) {
            crate::log!("warning"; "[rate.{}] names no registered driver", name);
        }
    }
    Arc::new(registry)
}

/// Config options with command-line overrides applied.
fn session_options(config: &BindConfig, args: &SessionArgs) -> Result<SessionOptions> {
    let mut options = config.session_options()?;
    if let Some(echo) = args.echo {
        options.echo = echo;
    }
    if let Some(defer) = args.defer {
        options.defer = defer;
    }
    Ok(options)
}
