//! WebSocket Transport
//!
//! Serves one remote peer at a time. A newer connection replaces the
//! current peer.
//!
//! ```text
//! acceptor thread --PeerEvent::Connected--> session actor
//! reader thread   --PeerEvent::Frame------> session actor --> BindingSession
//! session         --WsTransport::send-----> peer
//! ```
//!
//! The socket is switched to non-blocking after the handshake so the reader
//! thread can poll it without starving sends.

use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::{Channel, ChannelError, OutboundMessage};

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Poll interval of the acceptor and reader threads
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Connection events forwarded to the session actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(SocketAddr),
    /// A text frame from the peer
    Frame(String),
    Disconnected,
}

type Peer = Arc<Mutex<Option<WebSocket<TcpStream>>>>;

/// Sending half of the transport. Clones share the peer.
#[derive(Clone, Default)]
pub struct WsTransport {
    peer: Peer,
}

impl WsTransport {
    pub fn is_connected(&self) -> bool {
        self.peer.lock().is_some()
    }

    /// Close the current peer, if any.
    pub fn close(&self) {
        if let Some(mut ws) = self.peer.lock().take() {
            let _ = ws.close(None);
            let _ = ws.flush();
        }
    }
}

impl Channel for WsTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let json = message.to_json()?;
        let mut peer = self.peer.lock();
        let Some(ws) = peer.as_mut() else {
            crate::debug!("ws"; "no peer, dropped `{}`", message.id);
            return Ok(());
        };

        match ws.send(Message::Text(json.into())) {
            Ok(()) => Ok(()),
            // Frame is queued; the next write or flush finishes it
            Err(tungstenite::Error::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                peer.take();
                Err(ChannelError::Closed)
            }
            Err(tungstenite::Error::Io(e)) => {
                peer.take();
                Err(ChannelError::Io(e))
            }
            Err(e) => {
                peer.take();
                Err(ChannelError::Io(std::io::Error::other(e.to_string())))
            }
        }
    }
}

/// A bound, not yet running, WebSocket server.
pub struct WsServer {
    listener: TcpListener,
    port: u16,
}

impl WsServer {
    /// Bind on `interface`, trying successive ports from `base_port`.
    pub fn bind(interface: IpAddr, base_port: u16) -> Result<Self> {
        let (listener, port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start the acceptor and reader threads.
    ///
    /// Both threads stop once `events` is closed or shutdown is requested.
    pub fn spawn(self, transport: &WsTransport, events: mpsc::Sender<PeerEvent>) {
        let peer = Arc::clone(&transport.peer);
        let accept_events = events.clone();
        let listener = self.listener;
        std::thread::spawn(move || accept_loop(&listener, &peer, &accept_events));

        let peer = Arc::clone(&transport.peer);
        std::thread::spawn(move || reader_loop(&peer, &events));
    }
}

fn accept_loop(listener: &TcpListener, peer: &Peer, events: &mpsc::Sender<PeerEvent>) {
    while !crate::core::is_shutdown() && !events.is_closed() {
        match listener.accept() {
            Ok((stream, addr)) => {
                // Blocking for the handshake
                let _ = stream.set_nonblocking(false);
                match tungstenite::accept(stream) {
                    Ok(ws) => {
                        let _ = ws.get_ref().set_nonblocking(true);
                        if let Some(mut old) = peer.lock().replace(ws) {
                            crate::debug!("ws"; "replacing previous peer");
                            let _ = old.close(None);
                        }
                        if events.blocking_send(PeerEvent::Connected(addr)).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("ws"; "handshake failed: {}", e),
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                crate::log!("ws"; "accept error: {}", e);
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn reader_loop(peer: &Peer, events: &mpsc::Sender<PeerEvent>) {
    while !crate::core::is_shutdown() && !events.is_closed() {
        std::thread::sleep(POLL_INTERVAL);

        let mut frames = Vec::new();
        let mut disconnected = false;
        {
            let mut guard = peer.lock();
            let Some(ws) = guard.as_mut() else {
                continue;
            };
            // Drain everything available without blocking
            loop {
                match ws.read() {
                    Ok(Message::Text(text)) => frames.push(text.as_str().to_string()),
                    Ok(Message::Close(_)) => {
                        disconnected = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock =>
                    {
                        break;
                    }
                    Err(_) => {
                        disconnected = true;
                        break;
                    }
                }
            }
            if disconnected {
                guard.take();
            }
        }

        for frame in frames {
            if events.blocking_send(PeerEvent::Frame(frame)).is_err() {
                return;
            }
        }
        if disconnected && events.blocking_send(PeerEvent::Disconnected).is_err() {
            return;
        }
    }
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => {
                last_error = Some(e);
            }
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_send_without_peer_is_dropped() {
        let transport = WsTransport::default();
        assert!(!transport.is_connected());
        assert!(transport.send(&OutboundMessage::new("a", json!(1), true)).is_ok());
    }

    #[test]
    fn test_bind_skips_busy_port() {
        let first = WsServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let busy = first.port();
        let second = WsServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), busy).unwrap();
        assert_ne!(second.port(), busy);
    }

    #[test]
    fn test_round_trip_with_client() {
        let server = WsServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let port = server.port();
        let transport = WsTransport::default();
        let (tx, mut rx) = mpsc::channel(16);
        server.spawn(&transport, tx);

        let (mut client, _) = tungstenite::connect(format!("ws://127.0.0.1:{port}")).unwrap();
        assert!(matches!(rx.blocking_recv(), Some(PeerEvent::Connected(_))));

        client
            .send(Message::Text(r#"{"id":"a","value":2}"#.into()))
            .unwrap();
        assert_eq!(
            rx.blocking_recv(),
            Some(PeerEvent::Frame(r#"{"id":"a","value":2}"#.to_string()))
        );

        transport
            .send(&OutboundMessage::new("a", json!(3), false))
            .unwrap();
        let reply = client.read().unwrap();
        assert_eq!(
            reply.into_text().unwrap().as_str(),
            r#"{"id":"a","value":3,"rateLimited":false}"#
        );
    }
}
