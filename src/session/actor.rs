//! Session Actor
//!
//! Owns a [`BindingSession`] and drives it from async sources:
//!
//! ```text
//! WsServer threads --PeerEvent--> ┐
//! stdin reader ----SessionMsg---> ├─> SessionActor ─> pump / tick / handle_inbound
//! Ctrl+C ----------shutdown-----> ┘
//! ```
//!
//! Timers are served by sleeping until the session's next deadline, the
//! same loop shape the file watcher uses for its debouncer.

use std::time::Duration;

use crossbeam::channel::Receiver;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::BindingSession;
use crate::channel::Channel;
use crate::channel::ws::PeerEvent;
use crate::core::{Value, is_shutdown};

/// Longest sleep between shutdown checks
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Channel buffer size for actor inputs
pub const CHANNEL_BUFFER: usize = 64;

/// Commands that act on the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMsg {
    /// Act like a user editing control `id`
    Edit {
        id: String,
        value: Value,
        /// The user left the field (fires `change` as well as `input`)
        commit: bool,
    },
    /// A frame as the server would push it
    Inbound(String),
    /// Flush deferred values
    Submit,
    Shutdown,
}

/// Parse one command line: `edit|commit <id> <json>`, `server <json>`,
/// `submit` or `quit`.
pub fn parse_command(line: &str) -> Result<SessionMsg, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match verb {
        "edit" | "commit" => {
            let (id, json) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| format!("`{verb}` needs an id and a JSON value"))?;
            let value = serde_json::from_str(json.trim())
                .map_err(|e| format!("invalid value for `{id}`: {e}"))?;
            Ok(SessionMsg::Edit {
                id: id.to_string(),
                value,
                commit: verb == "commit",
            })
        }
        "server" if !rest.is_empty() => Ok(SessionMsg::Inbound(rest.to_string())),
        "server" => Err("`server` needs a JSON payload".to_string()),
        "submit" => Ok(SessionMsg::Submit),
        "quit" | "exit" => Ok(SessionMsg::Shutdown),
        "" => Err("empty command".to_string()),
        other => Err(format!("unknown command `{other}`")),
    }
}

/// Apply a command to `session`. Returns `false` on shutdown.
pub fn apply<C: Channel>(session: &mut BindingSession<C>, msg: SessionMsg) -> bool {
    match msg {
        SessionMsg::Edit { id, value, commit } => {
            let Some(el) = session.element(&id) else {
                crate::log!("session"; "no bound control `{}`", id);
                return true;
            };
            el.simulate_edit(&value, commit);
            session.pump();
        }
        SessionMsg::Inbound(text) => {
            session.handle_inbound_json(&text);
        }
        SessionMsg::Submit => {
            let flushed = session.flush_deferred();
            crate::debug!("session"; "submitted {} value(s)", flushed);
        }
        SessionMsg::Shutdown => return false,
    }
    true
}

/// Async driver for a live session.
pub struct SessionActor<C: Channel> {
    session: BindingSession<C>,
    peer_rx: mpsc::Receiver<PeerEvent>,
    cmd_rx: mpsc::Receiver<SessionMsg>,
    shutdown_rx: Option<Receiver<()>>,
}

impl<C: Channel> SessionActor<C> {
    pub fn new(
        session: BindingSession<C>,
        peer_rx: mpsc::Receiver<PeerEvent>,
        cmd_rx: mpsc::Receiver<SessionMsg>,
    ) -> Self {
        Self {
            session,
            peer_rx,
            cmd_rx,
            shutdown_rx: None,
        }
    }

    /// Set shutdown signal receiver
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Run until shutdown, then tear the session down.
    pub async fn run(self) -> BindingSession<C> {
        let mut session = self.session;
        let mut peer_rx = self.peer_rx;
        let mut cmd_rx = self.cmd_rx;
        let shutdown_rx = self.shutdown_rx;

        loop {
            let sleep = session.sleep_duration().min(SHUTDOWN_POLL);
            tokio::select! {
                biased;
                Some(event) = peer_rx.recv() => handle_peer(&mut session, event),
                Some(msg) = cmd_rx.recv() => {
                    if !apply(&mut session, msg) {
                        break;
                    }
                }
                _ = tokio::time::sleep(sleep) => {
                    session.tick();
                    let signalled = shutdown_rx.as_ref().is_some_and(|rx| rx.try_recv().is_ok());
                    if signalled || is_shutdown() {
                        crate::debug!("session"; "shutdown signal received");
                        break;
                    }
                }
            }
        }

        session.teardown();
        session
    }
}

fn handle_peer<C: Channel>(session: &mut BindingSession<C>, event: PeerEvent) {
    match event {
        PeerEvent::Connected(addr) => crate::log!("ws"; "peer connected from {}", addr),
        PeerEvent::Frame(text) => {
            let applied = session.handle_inbound_json(&text);
            crate::debug!("ws"; "frame applied {} update(s)", applied);
        }
        PeerEvent::Disconnected => crate::log!("ws"; "peer disconnected"),
    }
}

/// Forward stdin lines as commands until EOF or the actor goes away.
pub async fn read_commands(tx: mpsc::Sender<SessionMsg>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                crate::log!("error"; "stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        match parse_command(&line) {
            Ok(msg) => {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(e) => crate::log!("error"; "{}", e),
        }
    }
}
