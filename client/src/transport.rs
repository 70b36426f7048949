//! Duplex message transport under the connection manager
//!
//! [`Transport`] is deliberately poll-based: the session's frame loop drains
//! events without awaiting, so the simulation never blocks on I/O.

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use shared::Frame;
use std::collections::VecDeque;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(Frame),
    /// The connection closed or never opened
    Closed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("connection task has stopped")]
    TaskStopped,
}

pub trait Transport {
    /// Starts a connection attempt. Any previous connection is closed first
    /// and its pending events are discarded.
    fn open(&mut self, url: &str);

    fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Next event for the current connection attempt, if any arrived.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// Closes the current connection without reporting a `Closed` event.
    fn close(&mut self);
}

type TaggedEvent = (u64, TransportEvent);

/// WebSocket transport running each connection attempt as a tokio task.
///
/// Events are tagged with the attempt's generation; anything from an attempt
/// that was closed or superseded is dropped on receipt.
pub struct WsTransport {
    runtime: Handle,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(runtime: Handle) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            generation: 0,
            outbound: None,
            events_tx,
            events_rx,
            task: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &str) {
        self.close();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);

        let generation = self.generation;
        let events = self.events_tx.clone();
        let url = url.to_string();
        self.task = Some(
            self.runtime
                .spawn(run_connection(url, generation, outbound_rx, events)),
        );
    }

    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let sender = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        sender.send(frame).map_err(|_| TransportError::TaskStopped)
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        while let Ok((generation, event)) = self.events_rx.try_recv() {
            if generation == self.generation {
                return Some(event);
            }
            debug!("Dropping event from stale connection attempt {}", generation);
        }
        None
    }

    fn close(&mut self) {
        self.generation += 1;
        // Dropping the sender makes the task send a close frame and exit
        self.outbound = None;
        self.task = None;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

async fn run_connection(
    url: String,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<TaggedEvent>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let _ = events.send((
                generation,
                TransportEvent::Closed {
                    reason: format!("connect failed: {}", e),
                },
            ));
            return;
        }
    };

    info!("WebSocket open: {}", url);
    if events.send((generation, TransportEvent::Opened)).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(frame) => {
                    if let Err(e) = write.send(to_message(frame)).await {
                        error!("WebSocket send failed: {}", e);
                        let _ = events.send((
                            generation,
                            TransportEvent::Closed { reason: e.to_string() },
                        ));
                        return;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            },
            incoming = read.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => {
                        TransportEvent::Frame(Frame::Text(text.to_string()))
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        TransportEvent::Frame(Frame::Binary(bytes.to_vec()))
                    }
                    Some(Ok(Message::Close(_))) | None => TransportEvent::Closed {
                        reason: "closed by peer".to_string(),
                    },
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("WebSocket receive failed: {}", e);
                        TransportEvent::Closed { reason: e.to_string() }
                    }
                };
                let closed = matches!(event, TransportEvent::Closed { .. });
                if events.send((generation, event)).is_err() || closed {
                    return;
                }
            }
        }
    }
}

/// In-memory transport driven by hand, for exercising sessions without a
/// socket. Events queued with [`ScriptedTransport::push_event`] are delivered
/// in order; frames sent while open are recorded.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    open: bool,
    opened_urls: Vec<String>,
    close_calls: usize,
    sent: Vec<Frame>,
    events: VecDeque<TransportEvent>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, event: TransportEvent) {
        self.events.push_back(event);
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.events.push_back(TransportEvent::Frame(frame));
    }

    /// Every URL passed to `open`, one entry per connection attempt.
    pub fn opened_urls(&self) -> &[String] {
        &self.opened_urls
    }

    pub fn open_attempts(&self) -> usize {
        self.opened_urls.len()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn sent(&self) -> &[Frame] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self, url: &str) {
        self.open = false;
        self.opened_urls.push(url.to_string());
    }

    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.sent.push(frame);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let event = self.events.pop_front()?;
        match &event {
            TransportEvent::Opened => self.open = true,
            TransportEvent::Closed { .. } => self.open = false,
            TransportEvent::Frame(_) => {}
        }
        Some(event)
    }

    fn close(&mut self) {
        self.open = false;
        self.close_calls += 1;
        self.events.clear();
    }
}
