//! `inspect`: show how a page's controls bind.

use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;

use super::{load_page, registry_for};
use crate::channel::RecordingChannel;
use crate::config::{BindConfig, RateEntry};
use crate::core::Value;
use crate::log;
use crate::session::{BindingInfo, BindingSession};

/// One row of `inspect --json`.
#[derive(Debug, Serialize)]
struct Row<'a> {
    id: &'a str,
    driver: &'a str,
    #[serde(flatten)]
    policy: RateEntry,
    initial: Option<&'a Value>,
    subscribed: bool,
}

impl<'a> From<&'a BindingInfo> for Row<'a> {
    fn from(info: &'a BindingInfo) -> Self {
        Self {
            id: info.id.as_str(),
            driver: &info.driver,
            policy: RateEntry::from(info.policy),
            initial: info.initial.as_ref(),
            subscribed: info.subscribed,
        }
    }
}

/// Bind `page` without a peer and report the result.
pub fn inspect_page(config: &BindConfig, page: &Path, json: bool) -> Result<()> {
    let doc = load_page(page)?;
    let options = config.session_options()?;
    let mut session = BindingSession::new(registry_for(config), RecordingChannel::new())
        .with_options(options);

    let report = session.bind_all(doc.root());
    let bindings = session.bindings();

    if json {
        let rows: Vec<Row<'_>> = bindings.iter().map(Row::from).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for info in &bindings {
        println!("{}", format_row(info));
    }
    for skipped in &report.skipped {
        println!("{} {}", "skip".yellow(), skipped);
    }
    log!(
        "inspect";
        "{} bound, {} skipped",
        report.bound.len(),
        report.skipped.len()
    );
    Ok(())
}

fn format_row(info: &BindingInfo) -> String {
    let initial = info
        .initial
        .as_ref()
        .map_or_else(|| "-".to_string(), Value::to_string);
    let mut row = format!(
        "{:<16} {:<10} {:<14} {}",
        info.id.as_str(),
        info.driver,
        info.policy.to_string(),
        initial
    );
    if !info.subscribed {
        row.push_str(" (not listening)");
    }
    row
}
