//! `serve`: bind a page and exchange values with one WebSocket peer.
//!
//! ```text
//! main thread ── block_on ──> SessionActor
//!                               ^   ^   ^
//!        WsServer threads ──────┘   │   └── Ctrl+C (crossbeam)
//!        stdin reader task ─────────┘
//! ```

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use crossbeam::channel;
use tokio::sync::mpsc;

use super::{SessionArgs, load_page, registry_for, session_options};
use crate::channel::ws::WsServer;
use crate::channel::{Channel, ChannelError, OutboundMessage, WsTransport};
use crate::config::BindConfig;
use crate::core::register_shutdown;
use crate::log;
use crate::logger::{status_error, status_success};
use crate::session::BindingSession;
use crate::session::actor::{CHANNEL_BUFFER, SessionActor, read_commands};

/// Channel that reports every send on the status line.
struct StatusChannel<C> {
    inner: C,
}

impl<C: Channel> Channel for StatusChannel<C> {
    fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let result = self.inner.send(message);
        match &result {
            Ok(()) => status_success(&format!("sent `{}` = {}", message.id, message.value)),
            Err(e) => status_error(&format!("failed to send `{}`", message.id), &e.to_string()),
        }
        result
    }
}

/// Entry point of `bindwire serve`.
pub fn serve_page(
    config: &BindConfig,
    page: &Path,
    interface: Option<IpAddr>,
    port: Option<u16>,
    args: &SessionArgs,
) -> Result<()> {
    let doc = load_page(page)?;
    let options = session_options(config, args)?;

    let interface = interface.unwrap_or(config.serve.interface);
    let server = WsServer::bind(interface, port.unwrap_or(config.serve.port))?;
    log!("serve"; "ws://{}:{}", interface, server.port());

    let transport = WsTransport::default();
    let mut session = BindingSession::new(
        registry_for(config),
        StatusChannel {
            inner: transport.clone(),
        },
    )
    .with_options(options);

    let report = session.bind_all(doc.root());
    log!(
        "bind";
        "{} control(s) bound from {}",
        report.bound.len(),
        page.display()
    );

    let (peer_tx, peer_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    register_shutdown(shutdown_tx);
    server.spawn(&transport, peer_tx);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let session = rt.block_on(async move {
        tokio::spawn(read_commands(cmd_tx));
        SessionActor::new(session, peer_rx, cmd_rx)
            .with_shutdown_signal(shutdown_rx)
            .run()
            .await
    });
    // The stdin reader may sit in a read that cannot be cancelled
    rt.shutdown_background();

    for diagnostic in session.diagnostics() {
        crate::debug!("serve"; "{}: {}", diagnostic.kind(), diagnostic);
    }
    transport.close();
    log!("serve"; "session closed");
    Ok(())
}
