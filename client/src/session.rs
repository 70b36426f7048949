//! One arena session: the object a host constructs at match start, drives
//! once per frame, and tears down at match end.
//!
//! A session waits in the lobby until the authority sends `start`: it reports
//! ready on every connect, and neither the local step nor the zone runs
//! before the match begins. Inbound messages go through [`reduce`], which
//! mutates the store and returns the [`SessionEvent`]s the host should see.
//! Every delayed action lives in the session's [`Scheduler`].

use crate::balance::{BalanceProvider, BalanceTracker, Refresh};
use crate::config::ArenaConfig;
use crate::game::{ControlInput, LocalSimulation};
use crate::network::{
    ConnectionManager, ConnectionQuality, ConnectionState, NetworkEvent, StatePublisher,
};
use crate::outcome::{MatchPhase, OutcomeTracker};
use crate::powerup::{
    apply_effect, check_eligibility, expire_effect, PowerUpKind, PowerUpLedger, PurchaseError,
    PurchaseReceipt,
};
use crate::reconcile::reconcile;
use crate::scheduler::{Scheduler, TimerKind};
use crate::store::{PlayerStore, Upsert};
use crate::transport::Transport;
use log::{debug, info, warn};
use shared::{ClientMessage, PlayerState, SafeZone, ServerMessage};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    RemoteUpdated { id: String, state: PlayerState },
    RemoteEliminated(String),
    RemoteLeft(String),
    RemoteReady(String),
    CountdownStarted(Duration),
    MatchStarted,
    LocalEliminated,
    WinnerDeclared(String),
    PowerUpExpired(PowerUpKind),
}

/// Callbacks a host application implements to observe a session.
pub trait SessionHost {
    fn on_remote_update(&mut self, _id: &str, _state: &PlayerState) {}

    fn on_remote_eliminated(&mut self, _id: &str) {}

    fn on_remote_left(&mut self, _id: &str) {}

    fn on_remote_ready(&mut self, _id: &str) {}

    fn on_countdown_started(&mut self, _duration: Duration) {}

    fn on_match_started(&mut self) {}

    fn on_winner_declared(&mut self, _id: &str) {}

    fn on_local_eliminated(&mut self) {}

    fn on_connection_changed(&mut self, _connected: bool) {}

    fn on_power_up_expired(&mut self, _kind: PowerUpKind) {}
}

/// Invokes the host callback matching each event, in order.
pub fn dispatch<H: SessionHost + ?Sized>(host: &mut H, events: &[SessionEvent]) {
    for event in events {
        match event {
            SessionEvent::Connected => host.on_connection_changed(true),
            SessionEvent::Disconnected => host.on_connection_changed(false),
            SessionEvent::RemoteUpdated { id, state } => host.on_remote_update(id, state),
            SessionEvent::RemoteEliminated(id) => host.on_remote_eliminated(id),
            SessionEvent::RemoteLeft(id) => host.on_remote_left(id),
            SessionEvent::RemoteReady(id) => host.on_remote_ready(id),
            SessionEvent::CountdownStarted(duration) => host.on_countdown_started(*duration),
            SessionEvent::MatchStarted => host.on_match_started(),
            SessionEvent::LocalEliminated => host.on_local_eliminated(),
            SessionEvent::WinnerDeclared(id) => host.on_winner_declared(id),
            SessionEvent::PowerUpExpired(kind) => host.on_power_up_expired(*kind),
        }
    }
}

fn expiry_timer(kind: PowerUpKind) -> Option<TimerKind> {
    match kind {
        PowerUpKind::Speed => Some(TimerKind::SpeedExpiry),
        PowerUpKind::Shield => Some(TimerKind::ShieldExpiry),
        PowerUpKind::Health => None,
    }
}

fn accept_state(participant_id: &str, state: &PlayerState) -> bool {
    if state.id != participant_id {
        warn!(
            "Dropping state for {:?} carried under participant {:?}",
            state.id, participant_id
        );
        return false;
    }
    match state.validate() {
        Ok(()) => true,
        Err(e) => {
            warn!("Dropping remote state: {}", e);
            false
        }
    }
}

fn upserted(store: &mut PlayerStore, state: PlayerState, events: &mut Vec<SessionEvent>) {
    let id = state.id.clone();
    let upsert = store.upsert_remote(state);
    if upsert == Upsert::Ignored {
        return;
    }
    if let Some(entry) = store.remote(&id) {
        events.push(SessionEvent::RemoteUpdated {
            id: id.clone(),
            state: entry.state.clone(),
        });
    }
    if upsert == Upsert::Eliminated {
        info!("{} was eliminated", id);
        events.push(SessionEvent::RemoteEliminated(id));
    }
}

/// Applies one inbound message to the store and outcome tracker.
///
/// Malformed states are logged and dropped; duplicate terminal events
/// produce no events.
pub fn reduce(
    store: &mut PlayerStore,
    outcome: &mut OutcomeTracker,
    message: ServerMessage,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();

    match message {
        ServerMessage::Sync { participants } => {
            let valid: Vec<PlayerState> = participants
                .into_iter()
                .filter(|state| match state.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Dropping state from sync: {}", e);
                        false
                    }
                })
                .collect();

            let inserted = store.replace_remotes(valid);
            debug!("Sync baseline with {} remote participants", inserted.len());
            for id in inserted {
                if let Some(entry) = store.remote(&id) {
                    events.push(SessionEvent::RemoteUpdated {
                        state: entry.state.clone(),
                        id,
                    });
                }
            }
        }

        ServerMessage::Update {
            participant_id,
            state,
        } => {
            if participant_id != store.local_id() && accept_state(&participant_id, &state) {
                upserted(store, state, &mut events);
            }
        }

        ServerMessage::Joined {
            participant_id,
            state,
        } => {
            if participant_id != store.local_id() && accept_state(&participant_id, &state) {
                upserted(store, state, &mut events);
                store.snap_remote(&participant_id);
            }
        }

        ServerMessage::Ready { participant_id } => {
            if store.mark_ready(&participant_id) {
                debug!("{} is ready", participant_id);
                events.push(SessionEvent::RemoteReady(participant_id));
            }
        }

        ServerMessage::Left { participant_id } => {
            if store.remove_remote(&participant_id) {
                info!("{} left the session", participant_id);
                events.push(SessionEvent::RemoteLeft(participant_id));
            }
        }

        ServerMessage::Eliminated { participant_id } => {
            if store.mark_eliminated(&participant_id) {
                info!("{} was eliminated", participant_id);
                events.push(SessionEvent::RemoteEliminated(participant_id));
            } else {
                debug!("Ignoring elimination of {}", participant_id);
            }
        }

        ServerMessage::Winner { participant_id } => {
            if outcome.accept_remote_winner(&participant_id) {
                events.push(SessionEvent::WinnerDeclared(participant_id));
            }
        }

        ServerMessage::Pong { .. } => {}

        ServerMessage::Error { message } => {
            warn!("Session authority reported an error: {}", message);
        }

        // Match start is driven by the session, not the store
        ServerMessage::Countdown { .. } | ServerMessage::Start {} => {}
    }

    events
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    pub local: PlayerState,
    /// Remote players at their rendered positions
    pub remotes: Vec<PlayerState>,
    pub zone: SafeZone,
    pub phase: MatchPhase,
    pub started: bool,
    /// Time left on the pre-match countdown, if one is running
    pub countdown_remaining: Option<Duration>,
    pub ready_count: usize,
    pub winner: Option<String>,
    pub connection: ConnectionState,
    pub quality: ConnectionQuality,
    pub latency: Option<Duration>,
    pub balance: u64,
    pub next_costs: [(PowerUpKind, u64); 3],
    pub speed_remaining: Option<Duration>,
    pub shield_remaining: Option<Duration>,
}

pub struct ArenaSession<T: Transport, B: BalanceProvider> {
    config: ArenaConfig,
    store: PlayerStore,
    zone: SafeZone,
    simulation: LocalSimulation,
    connection: ConnectionManager<T>,
    publisher: StatePublisher,
    scheduler: Scheduler,
    ledger: PowerUpLedger,
    balance: BalanceTracker,
    provider: B,
    outcome: OutcomeTracker,
    started: bool,
    countdown_ends: Option<Instant>,
    /// Terminal events not yet accepted by the transport
    pending_terminal: Vec<ClientMessage>,
    last_tick: Option<Instant>,
    torn_down: bool,
}

impl<T: Transport, B: BalanceProvider> ArenaSession<T, B> {
    pub fn new(config: ArenaConfig, mut local: PlayerState, transport: T, provider: B) -> Self {
        local.id = config.participant_id.clone();

        let bounds = config.simulation.bounds;
        let zone = SafeZone::new(
            bounds.center(),
            config.zone.initial_radius,
            config.zone.floor_radius,
            config.zone.phase_duration.as_secs_f32(),
        );
        let connection = ConnectionManager::new(
            transport,
            config.network.clone(),
            config.connection_url(),
            config.session_id.clone(),
            config.participant_id.clone(),
        );

        Self {
            store: PlayerStore::new(local),
            zone,
            simulation: LocalSimulation::new(config.simulation.clone()),
            connection,
            publisher: StatePublisher::new(config.network.publish_interval),
            scheduler: Scheduler::new(),
            ledger: PowerUpLedger::new(),
            balance: BalanceTracker::new(
                config.participant_id.clone(),
                config.balance_poll_interval,
            ),
            provider,
            outcome: OutcomeTracker::new(config.expected_participants),
            started: false,
            countdown_ends: None,
            pending_terminal: Vec::new(),
            last_tick: None,
            torn_down: false,
            config,
        }
    }

    /// Connects and takes the first balance reading. The match itself starts
    /// when the authority sends `start`.
    pub fn start(&mut self, now: Instant) {
        if self.torn_down {
            return;
        }
        info!(
            "Starting session {} as {}",
            self.config.session_id, self.config.participant_id
        );
        self.connection.connect(&mut self.scheduler);
        self.refresh_balance(now);
        self.publisher.stage(self.store.local().clone());
        self.last_tick = Some(now);
    }

    /// Drains the connection and applies inbound messages.
    pub fn pump_network(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.torn_down {
            return events;
        }

        for event in self.connection.pump(&mut self.scheduler, now) {
            match event {
                NetworkEvent::Connected => {
                    // Catch the authority up with the current local state
                    self.publisher.stage(self.store.local().clone());
                    self.resend_terminal();
                    if !self.started {
                        self.connection.send(&ClientMessage::Ready {
                            participant_id: self.config.participant_id.clone(),
                        });
                    }
                    events.push(SessionEvent::Connected);
                }
                NetworkEvent::Disconnected { .. } => events.push(SessionEvent::Disconnected),
                NetworkEvent::Message(ServerMessage::Countdown { duration_ms }) => {
                    if !self.started {
                        let duration = Duration::from_millis(duration_ms);
                        info!("Match starts in {:?}", duration);
                        self.countdown_ends = Some(now + duration);
                        events.push(SessionEvent::CountdownStarted(duration));
                    }
                }
                NetworkEvent::Message(ServerMessage::Start {}) => {
                    if self.begin_match(now) {
                        events.push(SessionEvent::MatchStarted);
                    }
                }
                NetworkEvent::Message(message) => {
                    events.extend(reduce(&mut self.store, &mut self.outcome, message));
                }
            }
        }

        events
    }

    /// Leaves the lobby: arms the zone and lets the local step run. False if
    /// the match had already started.
    fn begin_match(&mut self, now: Instant) -> bool {
        if self.started || self.outcome.is_ended() {
            return false;
        }
        info!("Match {} started", self.config.session_id);
        self.started = true;
        self.countdown_ends = None;
        self.scheduler
            .schedule_repeating(TimerKind::ZoneShrink, now, self.config.zone.shrink_interval);
        true
    }

    /// Sends a one-shot event, keeping it for the next connect if the link
    /// cannot take it now.
    fn send_terminal(&mut self, message: ClientMessage) {
        if !self.connection.send(&message) {
            debug!("Holding {:?} until reconnected", message);
            self.pending_terminal.push(message);
        }
    }

    fn resend_terminal(&mut self) {
        for message in std::mem::take(&mut self.pending_terminal) {
            self.send_terminal(message);
        }
    }

    /// One frame: network, timers, local step, reconciliation, outcome and
    /// publication, in that order.
    pub fn tick(&mut self, control: &ControlInput, now: Instant) -> Vec<SessionEvent> {
        if self.torn_down {
            return Vec::new();
        }

        let dt = self
            .last_tick
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default()
            .min(self.config.simulation.max_tick)
            .as_secs_f32();
        self.last_tick = Some(now);

        let mut events = self.pump_network(now);
        self.run_timers(now, &mut events);

        if self.started && !self.outcome.is_ended() {
            let report = self
                .simulation
                .step(&mut self.store, &self.zone, control, dt);

            if report.eliminated {
                info!("Local player {} eliminated", self.store.local_id());
                let participant_id = self.store.local_id().to_string();
                self.send_terminal(ClientMessage::Eliminated { participant_id });
                events.push(SessionEvent::LocalEliminated);
            }
            if report.moved || report.damaged || report.collisions > 0 || report.eliminated {
                self.publisher.stage(self.store.local().clone());
            }
        }

        reconcile(
            &mut self.store,
            dt,
            self.config.interpolation_gain,
            self.config.simulation.trail_capacity,
        );

        if self.started {
            if let Some(winner) = self.outcome.evaluate(&self.store) {
                self.send_terminal(ClientMessage::Winner {
                    participant_id: winner.clone(),
                });
                self.outcome.finish();
                events.push(SessionEvent::WinnerDeclared(winner));
            }
        }

        let participant_id = self.config.participant_id.clone();
        self.publisher
            .flush(&mut self.connection, &participant_id, now);

        events
    }

    fn run_timers(&mut self, now: Instant, events: &mut Vec<SessionEvent>) {
        for kind in self.scheduler.poll(now) {
            match kind {
                TimerKind::Heartbeat => {
                    self.connection.send_heartbeat();
                }
                TimerKind::Ping => {
                    self.connection.send_ping();
                }
                TimerKind::Reconnect => self.connection.on_reconnect_timer(),
                TimerKind::SpeedExpiry => self.expire(PowerUpKind::Speed, events),
                TimerKind::ShieldExpiry => self.expire(PowerUpKind::Shield, events),
                TimerKind::ZoneShrink => self.zone.shrink(self.config.zone.shrink_interval),
                TimerKind::BalanceRefresh => {
                    let retry = match self.balance.poll_pending(&self.provider, now) {
                        Some(Ok(Refresh::Deferred(wait))) => Some(wait),
                        Some(Err(_)) => Some(self.config.balance_poll_interval),
                        _ => None,
                    };
                    if let Some(wait) = retry {
                        self.scheduler
                            .schedule_once(TimerKind::BalanceRefresh, now, wait);
                    }
                }
            }
        }
    }

    fn expire(&mut self, kind: PowerUpKind, events: &mut Vec<SessionEvent>) {
        if expire_effect(kind, self.store.local_mut()) {
            info!("{} power-up expired", kind);
            self.publisher.stage(self.store.local().clone());
            events.push(SessionEvent::PowerUpExpired(kind));
        }
    }

    fn refresh_balance(&mut self, now: Instant) {
        match self.balance.refresh(&self.provider, now) {
            Ok(Refresh::Polled(amount)) => debug!("Balance is {}", amount),
            Ok(Refresh::Deferred(wait)) => {
                self.scheduler
                    .schedule_once(TimerKind::BalanceRefresh, now, wait);
            }
            Err(_) => {
                self.scheduler.schedule_once(
                    TimerKind::BalanceRefresh,
                    now,
                    self.config.balance_poll_interval,
                );
            }
        }
    }

    /// Buys one power-up. A rejection leaves every piece of state untouched.
    pub fn purchase(
        &mut self,
        kind: PowerUpKind,
        now: Instant,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        if self.torn_down || self.outcome.is_ended() {
            return Err(PurchaseError::SessionEnded);
        }

        let cost = self.ledger.next_cost(kind);
        check_eligibility(kind, self.store.local(), self.balance.available(), cost)?;

        apply_effect(kind, self.store.local_mut(), self.config.heal_amount);
        self.ledger.record(kind);
        self.balance.deduct(cost);

        let expires_in = kind.duration();
        if let (Some(timer), Some(duration)) = (expiry_timer(kind), expires_in) {
            self.scheduler.schedule_once(timer, now, duration);
        }

        // Re-read the balance once the spend has had time to settle
        self.balance.request_refresh();
        self.scheduler
            .schedule_once(TimerKind::BalanceRefresh, now, self.config.balance_poll_interval);

        self.publisher.stage(self.store.local().clone());
        info!("Bought {} for {}", kind, cost);

        Ok(PurchaseReceipt {
            kind,
            cost,
            remaining_balance: self.balance.available(),
            expires_in,
        })
    }

    pub fn snapshot(&self, now: Instant) -> WorldSnapshot {
        let remaining = |kind: TimerKind| {
            self.scheduler
                .deadline(kind)
                .map(|deadline| deadline.saturating_duration_since(now))
        };

        WorldSnapshot {
            local: self.store.local().clone(),
            remotes: self.store.remotes().map(|r| r.render_state()).collect(),
            zone: self.zone,
            phase: self.outcome.phase(),
            started: self.started,
            countdown_remaining: self
                .countdown_ends
                .map(|ends| ends.saturating_duration_since(now)),
            ready_count: self.store.ready_count(),
            winner: self.outcome.winner().map(str::to_string),
            connection: self.connection.state(),
            quality: self.connection.quality(),
            latency: self.connection.latency(),
            balance: self.balance.available(),
            next_costs: PowerUpKind::ALL.map(|kind| (kind, self.ledger.next_cost(kind))),
            speed_remaining: remaining(TimerKind::SpeedExpiry),
            shield_remaining: remaining(TimerKind::ShieldExpiry),
        }
    }

    /// Cancels every timer and closes the connection. The session stays
    /// inert afterwards; a reconnect already in flight cannot revive it.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.connection.teardown(&mut self.scheduler);
        self.scheduler.cancel_all();
        self.torn_down = true;
        info!("Session {} torn down", self.config.session_id);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn store(&self) -> &PlayerStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PlayerStore {
        &mut self.store
    }

    pub fn zone(&self) -> &SafeZone {
        &self.zone
    }

    pub fn zone_mut(&mut self) -> &mut SafeZone {
        &mut self.zone
    }

    pub fn phase(&self) -> MatchPhase {
        self.outcome.phase()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Terminal events waiting for the next connect.
    pub fn pending_terminal(&self) -> &[ClientMessage] {
        &self.pending_terminal
    }

    pub fn winner(&self) -> Option<&str> {
        self.outcome.winner()
    }

    pub fn ledger(&self) -> &PowerUpLedger {
        &self.ledger
    }

    pub fn balance(&self) -> u64 {
        self.balance.available()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<T> {
        &mut self.connection
    }
}
