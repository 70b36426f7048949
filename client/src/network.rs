//! Connection lifecycle against the session authority
//!
//! [`ConnectionManager`] owns one persistent connection: it joins on open,
//! keeps the link alive with heartbeats and pings, schedules a single
//! reconnect after every close, and decodes inbound frames for the session's
//! reducer. [`StatePublisher`] throttles outbound state updates.

use crate::config::NetworkConfig;
use crate::scheduler::{Scheduler, TimerKind};
use crate::transport::{Transport, TransportEvent};
use log::{debug, info, warn};
use shared::{decode, encode, get_timestamp, ClientMessage, PlayerState, ServerMessage};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A reconnect attempt is in flight after a close
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    pub fn from_latency(latency: Duration) -> Self {
        match latency.as_millis() {
            0..=99 => ConnectionQuality::Good,
            100..=299 => ConnectionQuality::Fair,
            _ => ConnectionQuality::Poor,
        }
    }

    /// Multiplier applied to the minimum publish interval.
    pub fn throttle_factor(self) -> u32 {
        match self {
            ConnectionQuality::Good => 1,
            ConnectionQuality::Fair => 2,
            ConnectionQuality::Poor => 4,
        }
    }
}

/// What the session should react to after draining the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Connected,
    Disconnected { reason: String },
    Message(ServerMessage),
}

pub struct ConnectionManager<T: Transport> {
    transport: T,
    config: NetworkConfig,
    url: String,
    session_id: String,
    participant_id: String,
    state: ConnectionState,
    latency: Option<Duration>,
    quality: ConnectionQuality,
    reconnect_attempts: u32,
    dropped_sends: u64,
    torn_down: bool,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        transport: T,
        config: NetworkConfig,
        url: String,
        session_id: impl Into<String>,
        participant_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            config,
            url,
            session_id: session_id.into(),
            participant_id: participant_id.into(),
            state: ConnectionState::Disconnected,
            latency: None,
            quality: ConnectionQuality::Good,
            reconnect_attempts: 0,
            dropped_sends: 0,
            torn_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn quality(&self) -> ConnectionQuality {
        self.quality
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn dropped_sends(&self) -> u64 {
        self.dropped_sends
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Opens the connection. A no-op while already connecting or connected,
    /// and after teardown.
    pub fn connect(&mut self, scheduler: &mut Scheduler) {
        if self.torn_down {
            return;
        }
        match self.state {
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => return,
            ConnectionState::Disconnected => {}
        }

        scheduler.cancel(TimerKind::Reconnect);
        info!("Connecting to {}", self.url);
        self.state = ConnectionState::Connecting;
        self.transport.open(&self.url);
    }

    /// Fired by the scheduler once the reconnect delay has elapsed.
    pub fn on_reconnect_timer(&mut self) {
        if self.torn_down || self.state != ConnectionState::Disconnected {
            return;
        }
        self.reconnect_attempts += 1;
        info!(
            "Reconnect attempt {} to {}",
            self.reconnect_attempts, self.url
        );
        self.state = ConnectionState::Reconnecting;
        self.transport.open(&self.url);
    }

    /// Drains the transport. Lifecycle transitions and timer changes happen
    /// here; decoded messages are returned in arrival order.
    pub fn pump(&mut self, scheduler: &mut Scheduler, now: Instant) -> Vec<NetworkEvent> {
        let mut events = Vec::new();
        if self.torn_down {
            return events;
        }

        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::Opened => {
                    self.handle_open(scheduler, now);
                    events.push(NetworkEvent::Connected);
                }
                TransportEvent::Closed { reason } => {
                    if self.handle_close(scheduler, now, &reason) {
                        events.push(NetworkEvent::Disconnected { reason });
                    }
                }
                TransportEvent::Frame(frame) => match decode::<ServerMessage>(&frame) {
                    Ok(ServerMessage::Pong { timestamp }) => self.record_pong(timestamp),
                    Ok(message) => events.push(NetworkEvent::Message(message)),
                    Err(e) => warn!("Dropping malformed frame: {}", e),
                },
            }
        }

        events
    }

    fn handle_open(&mut self, scheduler: &mut Scheduler, now: Instant) {
        info!(
            "Connected to session {} as {}",
            self.session_id, self.participant_id
        );
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        scheduler.cancel(TimerKind::Reconnect);
        scheduler.schedule_repeating(TimerKind::Heartbeat, now, self.config.heartbeat_interval);
        scheduler.schedule_repeating(TimerKind::Ping, now, self.config.ping_interval);

        self.send(&ClientMessage::Join {
            session_id: self.session_id.clone(),
            participant_id: self.participant_id.clone(),
        });
        self.send(&ClientMessage::SyncRequest {});
    }

    /// Returns false for a close that changes nothing, e.g. a second close
    /// report while already waiting to reconnect.
    fn handle_close(&mut self, scheduler: &mut Scheduler, now: Instant, reason: &str) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        info!(
            "Connection closed ({}), reconnecting in {:?}",
            reason, self.config.reconnect_delay
        );
        self.state = ConnectionState::Disconnected;
        scheduler.cancel(TimerKind::Heartbeat);
        scheduler.cancel(TimerKind::Ping);
        scheduler.schedule_once(TimerKind::Reconnect, now, self.config.reconnect_delay);
        true
    }

    /// Encodes and sends while connected; anything else is dropped silently.
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if self.state != ConnectionState::Connected {
            self.dropped_sends += 1;
            debug!("Dropping send while {:?}", self.state);
            return false;
        }

        let frame = match encode(message, self.config.wire_format) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode outbound message: {}", e);
                return false;
            }
        };

        match self.transport.send(frame) {
            Ok(()) => true,
            Err(e) => {
                self.dropped_sends += 1;
                debug!("Send dropped by transport: {}", e);
                false
            }
        }
    }

    pub fn send_heartbeat(&mut self) -> bool {
        self.send(&ClientMessage::Heartbeat {})
    }

    pub fn send_ping(&mut self) -> bool {
        self.send(&ClientMessage::Ping {
            timestamp: get_timestamp(),
        })
    }

    fn record_pong(&mut self, timestamp: u64) {
        let latency = Duration::from_millis(get_timestamp().saturating_sub(timestamp));
        let quality = ConnectionQuality::from_latency(latency);
        if quality != self.quality {
            info!("Connection quality {:?} ({:?})", quality, latency);
        }
        self.latency = Some(latency);
        self.quality = quality;
    }

    /// Closes the connection for good. Pending reconnects never fire again.
    pub fn teardown(&mut self, scheduler: &mut Scheduler) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        scheduler.cancel(TimerKind::Heartbeat);
        scheduler.cancel(TimerKind::Ping);
        scheduler.cancel(TimerKind::Reconnect);
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        info!("Connection to {} torn down", self.url);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

/// Coalescing throttle for local state publication.
///
/// Only the newest state is kept; it goes out once the interval since the
/// previous send has elapsed.
#[derive(Debug)]
pub struct StatePublisher {
    min_interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<PlayerState>,
    coalesced: u64,
}

impl StatePublisher {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
            pending: None,
            coalesced: 0,
        }
    }

    pub fn stage(&mut self, state: PlayerState) {
        if self.pending.replace(state).is_some() {
            self.coalesced += 1;
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// States replaced before they could be sent.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    pub fn interval_for(&self, quality: ConnectionQuality) -> Duration {
        self.min_interval * quality.throttle_factor()
    }

    /// Takes the pending state if the throttle allows a send at `now`.
    pub fn ready(&mut self, now: Instant, quality: ConnectionQuality) -> Option<PlayerState> {
        self.pending.as_ref()?;
        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.interval_for(quality) {
                return None;
            }
        }
        self.pending.take()
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
    }

    /// Sends the pending state through `connection` if allowed. Kept pending
    /// while disconnected so it coalesces into the first send after reconnect.
    pub fn flush<T: Transport>(
        &mut self,
        connection: &mut ConnectionManager<T>,
        participant_id: &str,
        now: Instant,
    ) -> bool {
        if !connection.is_connected() {
            return false;
        }
        let Some(state) = self.ready(now, connection.quality()) else {
            return false;
        };

        let message = ClientMessage::Update {
            participant_id: participant_id.to_string(),
            state,
        };
        if connection.send(&message) {
            self.mark_sent(now);
            return true;
        }

        // The link died before its close was observed; keep the state for the next send
        if let ClientMessage::Update { state, .. } = message {
            self.pending.get_or_insert(state);
        }
        false
    }
}
