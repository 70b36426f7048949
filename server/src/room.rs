//! Session rooms for the development relay
//!
//! A room holds every participant that joined one session id. Rooms open as
//! a lobby: once enough participants report `ready` a countdown is announced,
//! and `start` goes out when it runs out. The relay keeps the last state each
//! participant published, forwards updates and terminal events to the rest
//! of the room, and accepts at most one winner per room. Nothing here touches
//! sockets: every handler returns the messages to deliver and the network
//! layer sends them.

use log::{debug, info, warn};
use shared::{ClientMessage, PlayerState, ServerMessage};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

pub type ConnectionId = u64;

/// When a lobby turns into a running match.
#[derive(Debug, Clone)]
pub struct LobbyRules {
    /// Ready participants needed before the countdown begins
    pub min_players: usize,
    pub countdown: Duration,
}

impl Default for LobbyRules {
    fn default() -> Self {
        Self {
            min_players: 2,
            countdown: Duration::from_secs(3),
        }
    }
}

/// A message addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

#[derive(Debug)]
pub struct Participant {
    pub id: String,
    pub connection: Option<ConnectionId>,
    /// Last state published; `None` until the first update
    pub state: Option<PlayerState>,
    pub ready: bool,
    pub eliminated: bool,
    pub last_seen: Instant,
}

#[derive(Debug, Default)]
pub struct Room {
    pub participants: BTreeMap<String, Participant>,
    pub countdown_ends: Option<Instant>,
    pub started: bool,
    pub winner: Option<String>,
}

impl Room {
    fn others(&self, except: &str) -> Vec<ConnectionId> {
        self.participants
            .values()
            .filter(|p| p.id != except)
            .filter_map(|p| p.connection)
            .collect()
    }

    fn broadcast(&self, except: &str, message: ServerMessage) -> Vec<Outbound> {
        self.others(except)
            .into_iter()
            .map(|to| Outbound {
                to,
                message: message.clone(),
            })
            .collect()
    }

    fn broadcast_all(&self, message: ServerMessage) -> Vec<Outbound> {
        self.participants
            .values()
            .filter_map(|p| p.connection)
            .map(|to| Outbound {
                to,
                message: message.clone(),
            })
            .collect()
    }

    pub fn ready_count(&self) -> usize {
        self.participants.values().filter(|p| p.ready).count()
    }

    fn snapshot(&self) -> Vec<PlayerState> {
        self.participants
            .values()
            .filter_map(|p| p.state.clone())
            .collect()
    }
}

/// Which room and participant a connection speaks for.
#[derive(Debug, Clone)]
struct Binding {
    session_id: String,
    participant_id: String,
}

#[derive(Debug, Default)]
pub struct RoomManager {
    rules: LobbyRules,
    rooms: HashMap<String, Room>,
    bindings: HashMap<ConnectionId, Binding>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: LobbyRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn room(&self, session_id: &str) -> Option<&Room> {
        self.rooms.get(session_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_bound(&self, connection: ConnectionId) -> bool {
        self.bindings.contains_key(&connection)
    }

    /// Handles one decoded client message from `connection`.
    pub fn handle(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
        now: Instant,
    ) -> Vec<Outbound> {
        match message {
            ClientMessage::Join {
                session_id,
                participant_id,
            } => return self.join(connection, session_id, participant_id, now),
            ClientMessage::Ping { timestamp } => {
                self.touch(connection, now);
                return vec![Outbound {
                    to: connection,
                    message: ServerMessage::Pong { timestamp },
                }];
            }
            _ => {}
        }

        let Some(binding) = self.bindings.get(&connection).cloned() else {
            return vec![error_to(connection, "join a session first")];
        };
        let Some(room) = self.rooms.get_mut(&binding.session_id) else {
            return Vec::new();
        };
        let Some(participant) = room.participants.get_mut(&binding.participant_id) else {
            return Vec::new();
        };
        participant.last_seen = now;

        match message {
            ClientMessage::Heartbeat {} => Vec::new(),

            ClientMessage::SyncRequest {} => vec![Outbound {
                to: connection,
                message: ServerMessage::Sync {
                    participants: room.snapshot(),
                },
            }],

            ClientMessage::Update {
                participant_id,
                state,
            } => {
                if participant_id != binding.participant_id || state.id != participant_id {
                    warn!(
                        "Connection {} tried to publish state for {}",
                        connection, participant_id
                    );
                    return vec![error_to(connection, "cannot publish another participant")];
                }
                if participant.eliminated {
                    return Vec::new();
                }

                let first = participant.state.is_none();
                participant.state = Some(state.clone());
                let message = if first {
                    ServerMessage::Joined {
                        participant_id,
                        state,
                    }
                } else {
                    ServerMessage::Update {
                        participant_id,
                        state,
                    }
                };
                room.broadcast(&binding.participant_id, message)
            }

            ClientMessage::Eliminated { participant_id } => {
                if participant_id != binding.participant_id || participant.eliminated {
                    return Vec::new();
                }
                participant.eliminated = true;
                if let Some(state) = participant.state.as_mut() {
                    state.alive = false;
                    state.hp = 0;
                }
                info!(
                    "Session {}: {} eliminated",
                    binding.session_id, participant_id
                );
                room.broadcast(
                    &binding.participant_id,
                    ServerMessage::Eliminated { participant_id },
                )
            }

            ClientMessage::Winner { participant_id } => {
                if room.winner.is_some() {
                    debug!(
                        "Session {}: ignoring extra winner {}",
                        binding.session_id, participant_id
                    );
                    return Vec::new();
                }
                info!("Session {}: winner {}", binding.session_id, participant_id);
                room.winner = Some(participant_id.clone());
                room.broadcast(
                    &binding.participant_id,
                    ServerMessage::Winner { participant_id },
                )
            }

            ClientMessage::Ready { participant_id } => {
                if participant_id != binding.participant_id {
                    return vec![error_to(connection, "cannot ready another participant")];
                }
                let newly_ready = !participant.ready;
                participant.ready = true;

                let mut outbound = Vec::new();
                if newly_ready {
                    outbound.extend(room.broadcast(
                        &binding.participant_id,
                        ServerMessage::Ready { participant_id },
                    ));
                }

                if room.started {
                    outbound.push(Outbound {
                        to: connection,
                        message: ServerMessage::Start {},
                    });
                } else if let Some(ends) = room.countdown_ends {
                    outbound.push(Outbound {
                        to: connection,
                        message: countdown(ends.saturating_duration_since(now)),
                    });
                } else if room.ready_count() >= self.rules.min_players {
                    info!(
                        "Session {}: starting in {:?}",
                        binding.session_id, self.rules.countdown
                    );
                    room.countdown_ends = Some(now + self.rules.countdown);
                    outbound.extend(room.broadcast_all(countdown(self.rules.countdown)));
                }

                outbound.extend(self.start_due(now));
                outbound
            }

            ClientMessage::Join { .. } | ClientMessage::Ping { .. } => Vec::new(),
        }
    }

    /// Starts every room whose countdown has run out.
    pub fn start_due(&mut self, now: Instant) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        for (session_id, room) in self.rooms.iter_mut() {
            match room.countdown_ends {
                Some(ends) if !room.started && ends <= now => {}
                _ => continue,
            }
            room.started = true;
            room.countdown_ends = None;
            info!("Session {} started", session_id);
            outbound.extend(room.broadcast_all(ServerMessage::Start {}));
        }
        outbound
    }

    fn join(
        &mut self,
        connection: ConnectionId,
        session_id: String,
        participant_id: String,
        now: Instant,
    ) -> Vec<Outbound> {
        if session_id.is_empty() || participant_id.is_empty() {
            return vec![error_to(connection, "session and participant ids are required")];
        }

        // A connection speaks for one participant; re-joining moves it
        let mut outbound = self.disconnect(connection);

        let room = self.rooms.entry(session_id.clone()).or_default();
        let participant = room
            .participants
            .entry(participant_id.clone())
            .or_insert_with(|| Participant {
                id: participant_id.clone(),
                connection: None,
                state: None,
                ready: false,
                eliminated: false,
                last_seen: now,
            });

        if let Some(previous) = participant.connection.replace(connection) {
            if previous != connection {
                info!(
                    "{} rejoined session {} on a new connection",
                    participant_id, session_id
                );
                self.bindings.remove(&previous);
            }
        }
        participant.last_seen = now;

        info!(
            "{} joined session {} ({} participants)",
            participant_id,
            session_id,
            room.participants.len()
        );
        outbound.retain(|o| o.to != connection);

        // Newcomers hear who is already waiting in the lobby
        outbound.extend(
            room.participants
                .values()
                .filter(|p| p.ready && p.id != participant_id)
                .map(|p| Outbound {
                    to: connection,
                    message: ServerMessage::Ready {
                        participant_id: p.id.clone(),
                    },
                }),
        );

        self.bindings.insert(
            connection,
            Binding {
                session_id,
                participant_id,
            },
        );
        outbound
    }

    /// Forgets a closed connection.
    ///
    /// A live participant leaves the room and the others hear `left`; an
    /// eliminated one stays listed so the survivors' roster stays complete.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<Outbound> {
        let Some(binding) = self.bindings.remove(&connection) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&binding.session_id) else {
            return Vec::new();
        };

        let mut outbound = Vec::new();
        let eliminated = match room.participants.get_mut(&binding.participant_id) {
            Some(participant) if participant.connection == Some(connection) => {
                participant.connection = None;
                participant.eliminated
            }
            _ => return outbound,
        };

        if !eliminated {
            room.participants.remove(&binding.participant_id);
            info!(
                "{} left session {}",
                binding.participant_id, binding.session_id
            );
            outbound = room.broadcast(
                &binding.participant_id,
                ServerMessage::Left {
                    participant_id: binding.participant_id.clone(),
                },
            );
        }

        if room.participants.values().all(|p| p.connection.is_none()) {
            debug!("Closing empty session {}", binding.session_id);
            self.rooms.remove(&binding.session_id);
        }
        outbound
    }

    fn touch(&mut self, connection: ConnectionId, now: Instant) {
        let Some(binding) = self.bindings.get(&connection) else {
            return;
        };
        if let Some(participant) = self
            .rooms
            .get_mut(&binding.session_id)
            .and_then(|room| room.participants.get_mut(&binding.participant_id))
        {
            participant.last_seen = now;
        }
    }

    /// Connections whose participant has been silent for longer than `timeout`.
    pub fn timed_out(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        self.rooms
            .values()
            .flat_map(|room| room.participants.values())
            .filter(|p| now.saturating_duration_since(p.last_seen) > timeout)
            .filter_map(|p| p.connection)
            .collect()
    }
}

fn countdown(remaining: Duration) -> ServerMessage {
    ServerMessage::Countdown {
        duration_ms: remaining.as_millis() as u64,
    }
}

fn error_to(connection: ConnectionId, message: &str) -> Outbound {
    Outbound {
        to: connection,
        message: ServerMessage::Error {
            message: message.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Vec2;

    fn join(rooms: &mut RoomManager, connection: ConnectionId, id: &str, now: Instant) {
        rooms.handle(
            connection,
            ClientMessage::Join {
                session_id: "s".to_string(),
                participant_id: id.to_string(),
            },
            now,
        );
    }

    fn update(id: &str, x: f32) -> ClientMessage {
        ClientMessage::Update {
            participant_id: id.to_string(),
            state: PlayerState::new(id, Vec2::new(x, 10.0)),
        }
    }

    #[test]
    fn test_first_update_is_announced_as_joined() {
        let now = Instant::now();
        let mut rooms = RoomManager::new();
        join(&mut rooms, 1, "a", now);
        join(&mut rooms, 2, "b", now);

        let first = rooms.handle(1, update("a", 10.0), now);
        let second = rooms.handle(1, update("a", 20.0), now);

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].to, 2);
        assert!(matches!(first[0].message, ServerMessage::Joined { .. }));
        assert!(matches!(second[0].message, ServerMessage::Update { .. }));
    }

    #[test]
    fn test_sync_returns_known_states() {
        let now = Instant::now();
        let mut rooms = RoomManager::new();
        join(&mut rooms, 1, "a", now);
        join(&mut rooms, 2, "b", now);
        rooms.handle(1, update("a", 10.0), now);

        let replies = rooms.handle(2, ClientMessage::SyncRequest {}, now);

        match &replies[..] {
            [Outbound {
                to: 2,
                message: ServerMessage::Sync { participants },
            }] => {
                assert_eq!(participants.len(), 1);
                assert_eq!(participants[0].id, "a");
            }
            other => panic!("Unexpected replies: {:?}", other),
        }
    }

    #[test]
    fn test_cannot_publish_for_someone_else() {
        let now = Instant::now();
        let mut rooms = RoomManager::new();
        join(&mut rooms, 1, "a", now);
        join(&mut rooms, 2, "b", now);

        let replies = rooms.handle(1, update("b", 10.0), now);

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].to, 1);
        assert!(matches!(replies[0].message, ServerMessage::Error { .. }));
    }

    #[test]
    fn test_unbound_connection_gets_error_but_ping_works() {
        let now = Instant::now();
        let mut rooms = RoomManager::new();

        let replies = rooms.handle(9, ClientMessage::Heartbeat {}, now);
        assert!(matches!(replies[0].message, ServerMessage::Error { .. }));

        let replies = rooms.handle(9, ClientMessage::Ping { timestamp: 77 }, now);
        assert_eq!(replies[0].message, ServerMessage::Pong { timestamp: 77 });
    }

    #[test]
    fn test_elimination_and_winner_relayed_once() {
        let now = Instant::now();
        let mut rooms = RoomManager::new();
        join(&mut rooms, 1, "a", now);
        join(&mut rooms, 2, "b", now);
        rooms.handle(1, update("a", 10.0), now);

        let eliminated = ClientMessage::Eliminated {
            participant_id: "a".to_string(),
        };
        assert_eq!(rooms.handle(1, eliminated.clone(), now).len(), 1);
        assert!(rooms.handle(1, eliminated, now).is_empty());
        assert!(rooms.handle(1, update("a", 50.0), now).is_empty());

        let winner = |id: &str| ClientMessage::Winner {
            participant_id: id.to_string(),
        };
        assert_eq!(rooms.handle(2, winner("b"), now).len(), 1);
        assert!(rooms.handle(1, winner("b"), now).is_empty());
        assert_eq!(rooms.room("s").unwrap().winner.as_deref(), Some("b"));
    }

    #[test]
    fn test_disconnect_broadcasts_left_for_live_players_only() {
        let now = Instant::now();
        let mut rooms = RoomManager::new();
        join(&mut rooms, 1, "a", now);
        join(&mut rooms, 2, "b", now);
        join(&mut rooms, 3, "c", now);
        rooms.handle(
            3,
            ClientMessage::Eliminated {
                participant_id: "c".to_string(),
            },
            now,
        );

        assert!(rooms.disconnect(3).is_empty());
        assert!(rooms.room("s").unwrap().participants.contains_key("c"));

        let left = rooms.disconnect(1);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].to, 2);
        assert_eq!(
            left[0].message,
            ServerMessage::Left {
                participant_id: "a".to_string()
            }
        );

        rooms.disconnect(2);
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn test_rejoin_moves_connection() {
        let now = Instant::now();
        let mut rooms = RoomManager::new();
        join(&mut rooms, 1, "a", now);
        join(&mut rooms, 5, "a", now);

        assert!(!rooms.is_bound(1));
        assert!(rooms.is_bound(5));
        assert!(rooms.disconnect(1).is_empty());
        assert_eq!(
            rooms.room("s").unwrap().participants["a"].connection,
            Some(5)
        );
    }

    fn ready(id: &str) -> ClientMessage {
        ClientMessage::Ready {
            participant_id: id.to_string(),
        }
    }

    #[test]
    fn test_lobby_counts_down_then_starts() {
        let start = Instant::now();
        let mut rooms = RoomManager::with_rules(LobbyRules {
            min_players: 2,
            countdown: Duration::from_secs(3),
        });
        join(&mut rooms, 1, "a", start);
        join(&mut rooms, 2, "b", start);

        let first = rooms.handle(1, ready("a"), start);
        assert_eq!(
            first,
            vec![Outbound {
                to: 2,
                message: ServerMessage::Ready {
                    participant_id: "a".to_string()
                },
            }]
        );

        let newcomer = rooms.handle(
            3,
            ClientMessage::Join {
                session_id: "s".to_string(),
                participant_id: "c".to_string(),
            },
            start,
        );
        assert_eq!(
            newcomer,
            vec![Outbound {
                to: 3,
                message: ServerMessage::Ready {
                    participant_id: "a".to_string()
                },
            }]
        );
        rooms.disconnect(3);

        let second = rooms.handle(2, ready("b"), start + Duration::from_secs(1));
        let countdowns: Vec<ConnectionId> = second
            .iter()
            .filter(|o| o.message == ServerMessage::Countdown { duration_ms: 3000 })
            .map(|o| o.to)
            .collect();
        assert_eq!(countdowns, vec![1, 2]);

        // Repeats neither re-announce nor restart the countdown
        let repeat = rooms.handle(1, ready("a"), start + Duration::from_secs(2));
        assert_eq!(
            repeat,
            vec![Outbound {
                to: 1,
                message: ServerMessage::Countdown { duration_ms: 2000 },
            }]
        );

        assert!(rooms.start_due(start + Duration::from_millis(3999)).is_empty());
        let started = rooms.start_due(start + Duration::from_secs(4));
        assert_eq!(started.len(), 2);
        assert!(started.iter().all(|o| o.message == ServerMessage::Start {}));
        assert!(rooms.room("s").unwrap().started);
        assert!(rooms.start_due(start + Duration::from_secs(5)).is_empty());

        // A participant coming back after the start is told straight away
        join(&mut rooms, 7, "a", start + Duration::from_secs(6));
        let late = rooms.handle(7, ready("a"), start + Duration::from_secs(6));
        assert_eq!(
            late,
            vec![Outbound {
                to: 7,
                message: ServerMessage::Start {},
            }]
        );
    }

    #[test]
    fn test_zero_countdown_starts_immediately() {
        let now = Instant::now();
        let mut rooms = RoomManager::with_rules(LobbyRules {
            min_players: 1,
            countdown: Duration::ZERO,
        });
        join(&mut rooms, 1, "a", now);

        let replies = rooms.handle(1, ready("a"), now);

        assert_eq!(
            replies,
            vec![
                Outbound {
                    to: 1,
                    message: ServerMessage::Countdown { duration_ms: 0 },
                },
                Outbound {
                    to: 1,
                    message: ServerMessage::Start {},
                },
            ]
        );
        assert!(matches!(
            rooms.handle(1, ready("b"), now)[0].message,
            ServerMessage::Error { .. }
        ));
    }

    #[test]
    fn test_timeouts() {
        let start = Instant::now();
        let mut rooms = RoomManager::new();
        join(&mut rooms, 1, "a", start);
        join(&mut rooms, 2, "b", start);
        rooms.handle(
            2,
            ClientMessage::Heartbeat {},
            start + Duration::from_secs(20),
        );

        let stale = rooms.timed_out(start + Duration::from_secs(31), Duration::from_secs(30));
        assert_eq!(stale, vec![1]);
    }
}
