//! # Arena Client Library
//!
//! The client core for a "last player standing" arena: each participant
//! simulates their own avatar locally, publishes its state to a session
//! authority over a persistent WebSocket, and smooths everyone else's state
//! for display. The host application owns one [`session::ArenaSession`] per
//! match and drives it from its frame loop.
//!
//! ## Architecture Overview
//!
//! ### Authoritative-Local Simulation
//! The local player's movement, zone damage and collision pushes are computed
//! on this client and never corrected by the network. Remote players are only
//! ever moved by what the authority relays.
//!
//! ### Remote Reconciliation
//! Each remote player is drawn at a rendered position that eases toward the
//! last authoritative position every frame, independent of when updates
//! arrive, and never overshoots it.
//!
//! ### Explicit Session Object
//! All connection state, timers and player state hang off the session. Inbound
//! messages are reduced into store mutations plus a list of events for the
//! host; tearing the session down is a single call.
//!
//! ### Lobby
//! A session reports `ready` whenever it connects and stays idle until the
//! authority sends `start`; the zone only begins to shrink from then on.
//! Elimination and winner reports that could not be sent are held and sent
//! again after the next reconnect.
//!
//! ## Module Organization
//!
//! ### Core
//! - `config`: every tunable of a session
//! - `scheduler`: heartbeat, ping, reconnect, buff expiry, zone shrink and
//!   balance refresh timers
//! - `store`: local player plus last-known remote players
//! - `game`: the per-tick local simulation step
//! - `reconcile`: rendered-position interpolation for remote players
//! - `powerup`: cost schedule, eligibility and effects of the three buffs
//! - `balance`: rate-limited polling of the spendable balance
//! - `outcome`: single-survivor detection and winner idempotency
//! - `transport` / `network`: WebSocket transport, connection lifecycle and
//!   throttled state publication
//! - `session`: the reducer and the session object tying it all together
//!
//! ### Host (macroquad)
//! - `input`: pointer target and power-up hotkeys
//! - `rendering`: arena, players and HUD
//! - `network_graph`: latency overlay
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::balance::FixedBalance;
//! use client::config::ArenaConfig;
//! use client::game::ControlInput;
//! use client::session::ArenaSession;
//! use client::transport::WsTransport;
//! use shared::{PlayerState, Vec2};
//! use std::time::Instant;
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let config = ArenaConfig::new("42", "alice");
//! let local = PlayerState::new("alice", Vec2::new(450.0, 350.0));
//! let transport = WsTransport::new(runtime.handle().clone());
//! let mut session = ArenaSession::new(config, local, transport, FixedBalance(500));
//!
//! session.start(Instant::now());
//! loop {
//!     let control = ControlInput::pointer(Vec2::new(500.0, 300.0));
//!     let events = session.tick(&control, Instant::now());
//!     // hand `events` to the host, draw `session.snapshot(..)`
//!     # if !events.is_empty() { break; }
//! }
//! session.teardown();
//! ```

pub mod balance;
pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod network_graph;
pub mod outcome;
pub mod powerup;
pub mod reconcile;
pub mod rendering;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod transport;
