//! WebSocket relay: connection tasks feed one event loop that owns the rooms

use crate::room::{ConnectionId, LobbyRules, Outbound, RoomManager};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode, encode, ClientMessage, Frame, ProtocolError, ServerMessage, WireFormat};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Events sent from connection tasks to the relay loop
#[derive(Debug)]
pub enum RelayEvent {
    Opened {
        connection: ConnectionId,
        addr: SocketAddr,
        outgoing: mpsc::UnboundedSender<Message>,
    },
    Frame {
        connection: ConnectionId,
        frame: Frame,
    },
    Closed {
        connection: ConnectionId,
    },
}

/// Per-connection sink plus the format the peer last spoke in
struct Peer {
    outgoing: mpsc::UnboundedSender<Message>,
    format: WireFormat,
}

pub struct RelayServer {
    listener: TcpListener,
    timeout: Duration,
    rules: LobbyRules,
}

/// State owned by the relay loop
struct Relay {
    timeout: Duration,
    rooms: RoomManager,
    peers: HashMap<ConnectionId, Peer>,
}

impl RelayServer {
    pub async fn bind(addr: &str, timeout: Duration, rules: LobbyRules) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            timeout,
            rules,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until the accept loop stops.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut acceptor = tokio::spawn(accept_loop(self.listener, event_tx));
        let mut relay = Relay {
            timeout: self.timeout,
            rooms: RoomManager::with_rules(self.rules),
            peers: HashMap::new(),
        };

        let mut timeout_check = tokio::time::interval(Duration::from_secs(1));
        let mut countdown_check = tokio::time::interval(Duration::from_millis(50));

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    relay.handle_event(event);
                }
                _ = timeout_check.tick() => {
                    relay.evict_timed_out(Instant::now());
                }
                _ = countdown_check.tick() => {
                    let outbound = relay.rooms.start_due(Instant::now());
                    relay.deliver(outbound);
                }
                result = &mut acceptor => {
                    return match result {
                        Ok(()) => Ok(()),
                        Err(e) => Err(e.into()),
                    };
                }
            }
        }
    }
}

impl Relay {
    fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Opened {
                connection,
                addr,
                outgoing,
            } => {
                info!("Connection {} opened from {}", connection, addr);
                self.peers.insert(
                    connection,
                    Peer {
                        outgoing,
                        format: WireFormat::Json,
                    },
                );
            }
            RelayEvent::Frame { connection, frame } => {
                if let Some(peer) = self.peers.get_mut(&connection) {
                    peer.format = match frame {
                        Frame::Text(_) => WireFormat::Json,
                        Frame::Binary(_) => WireFormat::Binary,
                    };
                }

                match decode::<ClientMessage>(&frame) {
                    Ok(message) => {
                        debug!("Connection {}: {:?}", connection, message);
                        let outbound = self.rooms.handle(connection, message, Instant::now());
                        self.deliver(outbound);
                    }
                    Err(e) => {
                        warn!("Connection {} sent a malformed frame: {}", connection, e);
                        self.deliver(vec![Outbound {
                            to: connection,
                            message: ServerMessage::Error {
                                message: "malformed message".to_string(),
                            },
                        }]);
                    }
                }
            }
            RelayEvent::Closed { connection } => {
                info!("Connection {} closed", connection);
                self.peers.remove(&connection);
                let outbound = self.rooms.disconnect(connection);
                self.deliver(outbound);
            }
        }
    }

    fn evict_timed_out(&mut self, now: Instant) {
        for connection in self.rooms.timed_out(now, self.timeout) {
            warn!("Connection {} timed out", connection);
            // Dropping the sender ends the connection task
            self.peers.remove(&connection);
            let outbound = self.rooms.disconnect(connection);
            self.deliver(outbound);
        }
    }

    fn deliver(&self, outbound: Vec<Outbound>) {
        for Outbound { to, message } in outbound {
            let Some(peer) = self.peers.get(&to) else {
                continue;
            };
            match to_message(&message, peer.format) {
                Ok(frame) => {
                    if peer.outgoing.send(frame).is_err() {
                        debug!("Connection {} is already closing", to);
                    }
                }
                Err(e) => error!("Failed to encode message for {}: {}", to, e),
            }
        }
    }
}

fn to_message(message: &ServerMessage, format: WireFormat) -> Result<Message, ProtocolError> {
    Ok(match encode(message, format)? {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    })
}

async fn accept_loop(listener: TcpListener, event_tx: mpsc::UnboundedSender<RelayEvent>) {
    let mut next_connection: ConnectionId = 1;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let connection = next_connection;
                next_connection += 1;
                tokio::spawn(handle_connection(connection, stream, addr, event_tx.clone()));
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        if event_tx.is_closed() {
            break;
        }
    }
}

async fn handle_connection(
    connection: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    event_tx: mpsc::UnboundedSender<RelayEvent>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel();

    if event_tx
        .send(RelayEvent::Opened {
            connection,
            addr,
            outgoing: outgoing_tx,
        })
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => {
                match outgoing {
                    Some(message) => {
                        if let Err(e) = write.send(message).await {
                            debug!("Send to connection {} failed: {}", connection, e);
                            break;
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = read.next() => {
                let frame = match incoming {
                    Some(Ok(Message::Text(text))) => Frame::Text(text.to_string()),
                    Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes.to_vec()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("Read from connection {} failed: {}", connection, e);
                        break;
                    }
                };
                if event_tx.send(RelayEvent::Frame { connection, frame }).is_err() {
                    break;
                }
            }
        }
    }

    let _ = event_tx.send(RelayEvent::Closed { connection });
}
