//! `replay`: run a timed script against a page under virtual time.
//!
//! Script format, one step per line:
//!
//! ```text
//! # comment
//! 0    edit name "A"          # typing, batched by the rate limiter
//! 120  edit name "Ad"
//! 900  commit name "Ada"      # leaving the field, sent at once
//! 1000 server {"id": "volume", "value": 7}
//! 1200 submit                 # flush deferred values
//! ```
//!
//! Times are milliseconds on a [`ManualClock`] and must not decrease. After
//! the last step every pending timer is run to completion.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use super::{SessionArgs, load_page, registry_for, session_options};
use crate::channel::{RecordingChannel, Sent};
use crate::config::BindConfig;
use crate::dom::Document;
use crate::driver::Registry;
use crate::limiter::ManualClock;
use crate::log;
use crate::session::actor::{SessionMsg, apply, parse_command};
use crate::session::{BindingSession, SessionOptions};

/// One timed script line.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub at_ms: u64,
    pub msg: SessionMsg,
}

/// Parse a replay script.
pub fn parse_script(text: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    let mut last = 0;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        let (time, command) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let at_ms: u64 = time
            .trim_end_matches("ms")
            .parse()
            .with_context(|| format!("line {line_no}: `{time}` is not a time in ms"))?;
        if at_ms < last {
            bail!("line {line_no}: time {at_ms}ms is before {last}ms");
        }
        let msg = match parse_command(command) {
            Ok(msg) => msg,
            Err(e) => bail!("line {line_no}: {e}"),
        };

        last = at_ms;
        steps.push(Step { at_ms, msg });
    }
    Ok(steps)
}

/// Drop a trailing `# comment`, leaving `#` inside JSON strings alone.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Bind `doc`, run `steps` and return everything sent, in order.
pub fn run_script(
    doc: &Document,
    steps: Vec<Step>,
    registry: Arc<Registry>,
    options: SessionOptions,
) -> Vec<Sent> {
    let clock = ManualClock::new();
    let channel = RecordingChannel::with_clock(Arc::new(clock.clone()));
    let mut session = BindingSession::new(registry, channel.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_options(options);

    let report = session.bind_all(doc.root());
    crate::debug!("replay"; "bound {} control(s)", report.bound.len());

    for step in steps {
        session.run_until(&clock, step.at_ms);
        if !apply(&mut session, step.msg) {
            break;
        }
    }

    while let Some(deadline) = session.next_deadline() {
        session.run_until(&clock, deadline);
    }
    if session.pending_deferred() > 0 {
        log!("replay"; "{} deferred value(s) never submitted", session.pending_deferred());
    }
    session.teardown();

    channel.sent()
}

/// Entry point of `bindwire replay`.
pub fn replay_page(config: &BindConfig, page: &Path, script: &Path, args: &SessionArgs) -> Result<()> {
    let doc = load_page(page)?;
    let text = read_script(script)?;
    let steps = parse_script(&text)?;
    let options = session_options(config, args)?;

    let sent = run_script(&doc, steps, registry_for(config), options);
    for record in &sent {
        println!("{}ms {}", record.at_ms, record.message.to_json()?);
    }
    log!("replay"; "{} message(s) sent", sent.len());
    Ok(())
}

fn read_script(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read script `{}`", path.display()))
}
