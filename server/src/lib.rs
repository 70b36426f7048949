//! # Development Relay
//!
//! A minimal session authority for running arena clients locally. The relay
//! does no simulation: every client is authoritative for its own avatar, and
//! the relay only fans their messages out to the rest of the session.
//!
//! ## Behaviour
//!
//! - `join` binds a connection to a participant of a session room
//! - `ready` is forwarded to the room; once `--min-players` are ready a
//!   `countdown` goes to everyone, followed by `start` when it runs out
//! - `sync_request` is answered with every state the room has seen
//! - `update`, `eliminated` and `winner` are forwarded to the other members;
//!   a participant's first update is announced as `joined`
//! - only the first `winner` of a room is forwarded
//! - `ping` is answered with `pong` carrying the same timestamp
//! - a live participant that disconnects or stays silent past the timeout is
//!   announced as `left`
//!
//! Replies go out in the frame format (text JSON or binary) the peer last
//! used.
//!
//! ## Module Organization
//!
//! - `room`: session rooms and the message rules above, free of I/O
//! - `network`: the WebSocket accept loop, connection tasks and the relay
//!   event loop

pub mod network;
pub mod room;
