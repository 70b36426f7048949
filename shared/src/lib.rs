use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const WORLD_WIDTH: f32 = 900.0;
pub const WORLD_HEIGHT: f32 = 700.0;
pub const PLAYER_RADIUS: f32 = 20.0;
pub const PLAYER_MAX_HP: i32 = 1000;
pub const BASE_SPEED: f32 = 3.0;
pub const BOOSTED_SPEED: f32 = 5.0;
pub const ZONE_DAMAGE_PER_TICK: i32 = 1;
pub const ZONE_INITIAL_RADIUS: f32 = 400.0;
pub const ZONE_FLOOR_RADIUS: f32 = 25.0;
pub const ZONE_PHASE_SECONDS: f32 = 180.0;
pub const TRAIL_CAPACITY: usize = 20;
pub const SHIELD_PUSH_MULTIPLIER: f32 = 2.0;
pub const SPEED_PUSH_MULTIPLIER: f32 = 1.5;

/// Errors raised while encoding or decoding protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary codec error: {0}")]
    Binary(#[from] bincode::Error),
    #[error("invalid player state for {id:?}: {reason}")]
    InvalidState { id: String, reason: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn scale(self, factor: f32) -> Vec2 {
        Vec2::new(self.x * factor, self.y * factor)
    }

    pub fn lerp(self, target: Vec2, alpha: f32) -> Vec2 {
        Vec2::new(
            self.x + (target.x - self.x) * alpha,
            self.y + (target.y - self.y) * alpha,
        )
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Axis-aligned playfield; every position is clamped into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub width: f32,
    pub height: f32,
}

impl WorldBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= 0.0 && point.x <= self.width && point.y >= 0.0 && point.y <= self.height
    }

    /// Clamps a circle of `radius` so it stays fully inside the bounds.
    pub fn clamp(&self, point: Vec2, radius: f32) -> Vec2 {
        let max_x = (self.width - radius).max(radius);
        let max_y = (self.height - radius).max(radius);
        Vec2::new(point.x.clamp(radius, max_x), point.y.clamp(radius, max_y))
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::new(WORLD_WIDTH, WORLD_HEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub color: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub hp: i32,
    pub max_hp: i32,
    pub alive: bool,
    pub has_shield: bool,
    pub has_speed: bool,
    pub radius: f32,
    /// Recent positions for rendering only; never sent over the wire.
    #[serde(skip)]
    pub trail: VecDeque<Vec2>,
}

impl PlayerState {
    pub fn new(id: impl Into<String>, position: Vec2) -> Self {
        let id = id.into();
        Self {
            name: id.chars().take(8).collect(),
            id,
            color: 0xff4444,
            position,
            velocity: Vec2::ZERO,
            hp: PLAYER_MAX_HP,
            max_hp: PLAYER_MAX_HP,
            alive: true,
            has_shield: false,
            has_speed: false,
            radius: PLAYER_RADIUS,
            trail: VecDeque::with_capacity(TRAIL_CAPACITY),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive && self.hp > 0
    }

    /// Appends to the trail, evicting the oldest point once `capacity` is reached.
    pub fn record_trail(&mut self, point: Vec2, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.trail.len() >= capacity {
            self.trail.pop_front();
        }
        self.trail.push_back(point);
    }

    /// Rejects states that would corrupt the store if applied.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let reason = if self.id.is_empty() {
            Some("empty id")
        } else if !self.position.is_finite() || !self.velocity.is_finite() {
            Some("non-finite position or velocity")
        } else if !(self.radius.is_finite() && self.radius > 0.0) {
            Some("non-positive radius")
        } else if self.max_hp <= 0 {
            Some("non-positive max hp")
        } else if self.hp < 0 || self.hp > self.max_hp {
            Some("hp outside [0, max_hp]")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ProtocolError::InvalidState {
                id: self.id.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// The shrinking circle outside of which players take damage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeZone {
    pub center: Vec2,
    pub radius: f32,
    pub floor_radius: f32,
    pub shrink_per_second: f32,
}

impl SafeZone {
    pub fn new(center: Vec2, initial_radius: f32, floor_radius: f32, phase_seconds: f32) -> Self {
        let shrink_per_second = if phase_seconds > 0.0 {
            ((initial_radius - floor_radius) / phase_seconds).max(0.0)
        } else {
            0.0
        };
        Self {
            center,
            radius: initial_radius.max(floor_radius),
            floor_radius,
            shrink_per_second,
        }
    }

    /// Applies one fixed-rate shrink tick of `interval` length.
    pub fn shrink(&mut self, interval: Duration) {
        let step = self.shrink_per_second * interval.as_secs_f32();
        self.radius = (self.radius - step).max(self.floor_radius);
    }

    pub fn contains(&self, point: Vec2) -> bool {
        self.center.distance(point) <= self.radius
    }
}

/// Messages the client sends to the session authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        session_id: String,
        participant_id: String,
    },
    Heartbeat {},
    SyncRequest {},
    Update {
        participant_id: String,
        state: PlayerState,
    },
    Eliminated {
        participant_id: String,
    },
    Winner {
        participant_id: String,
    },
    Ping {
        timestamp: u64,
    },
    /// The participant is in the lobby and waiting for the match to start
    Ready {
        participant_id: String,
    },
}

/// Messages the session authority relays to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    Sync {
        participants: Vec<PlayerState>,
    },
    Update {
        participant_id: String,
        state: PlayerState,
    },
    Joined {
        participant_id: String,
        state: PlayerState,
    },
    Left {
        participant_id: String,
    },
    Eliminated {
        participant_id: String,
    },
    Winner {
        participant_id: String,
    },
    Pong {
        timestamp: u64,
    },
    Error {
        message: String,
    },
    Ready {
        participant_id: String,
    },
    /// The match starts `duration_ms` after this is received
    Countdown {
        duration_ms: u64,
    },
    Start {},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Binary,
}

/// One transport-level message, independent of the socket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

pub fn encode<T: Serialize>(message: &T, format: WireFormat) -> Result<Frame, ProtocolError> {
    match format {
        WireFormat::Json => Ok(Frame::Text(serde_json::to_string(message)?)),
        WireFormat::Binary => Ok(Frame::Binary(bincode::serialize(message)?)),
    }
}

/// Decodes by frame kind, whichever format the peer chose.
pub fn decode<T: DeserializeOwned>(frame: &Frame) -> Result<T, ProtocolError> {
    match frame {
        Frame::Text(text) => Ok(serde_json::from_str(text)?),
        Frame::Binary(bytes) => Ok(bincode::deserialize(bytes)?),
    }
}

pub fn circles_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
    a.distance(b) < radius_a + radius_b
}

/// Unit axis from `b` towards `a` and the penetration depth, if overlapping.
/// Coincident centres separate along +x.
pub fn overlap_axis(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> Option<(Vec2, f32)> {
    let delta = a - b;
    let distance = delta.length();
    let overlap = radius_a + radius_b - distance;
    if overlap <= 0.0 {
        return None;
    }
    if distance < 0.001 {
        return Some((Vec2::new(1.0, 0.0), overlap));
    }
    Some((delta.scale(1.0 / distance), overlap))
}

// Milliseconds since the UNIX epoch
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_player_creation() {
        let player = PlayerState::new("alice-wallet", Vec2::new(100.0, 200.0));
        assert_eq!(player.id, "alice-wallet");
        assert_eq!(player.name, "alice-wa");
        assert_eq!(player.hp, PLAYER_MAX_HP);
        assert!(player.is_alive());
        assert!(!player.has_shield);
        assert!(!player.has_speed);
        assert_eq!(player.radius, PLAYER_RADIUS);
    }

    #[test]
    fn test_trail_evicts_oldest() {
        let mut player = PlayerState::new("p", Vec2::ZERO);
        for i in 0..5 {
            player.record_trail(Vec2::new(i as f32, 0.0), 3);
        }
        assert_eq!(player.trail.len(), 3);
        assert_eq!(player.trail.front().unwrap().x, 2.0);
        assert_eq!(player.trail.back().unwrap().x, 4.0);
    }

    #[test]
    fn test_validate_rejects_bad_states() {
        let good = PlayerState::new("p", Vec2::new(10.0, 10.0));
        assert!(good.validate().is_ok());

        let mut nan = good.clone();
        nan.position.x = f32::NAN;
        assert!(nan.validate().is_err());

        let mut over = good.clone();
        over.hp = over.max_hp + 1;
        assert!(over.validate().is_err());

        let mut unnamed = good;
        unnamed.id.clear();
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_bounds_clamp_keeps_circle_inside() {
        let bounds = WorldBounds::default();
        let clamped = bounds.clamp(Vec2::new(-50.0, WORLD_HEIGHT + 10.0), 20.0);
        assert_eq!(clamped.x, 20.0);
        assert_eq!(clamped.y, WORLD_HEIGHT - 20.0);
        assert!(bounds.contains(Vec2::new(0.0, 0.0)));
        assert!(!bounds.contains(Vec2::new(-1.0, 5.0)));
    }

    #[test]
    fn test_zone_shrinks_to_floor() {
        let mut zone = SafeZone::new(Vec2::new(450.0, 350.0), 100.0, 25.0, 10.0);
        assert_approx_eq!(zone.shrink_per_second, 7.5, 0.0001);

        let mut previous = zone.radius;
        for _ in 0..200 {
            zone.shrink(Duration::from_millis(100));
            assert!(zone.radius <= previous);
            assert!(zone.radius >= zone.floor_radius);
            previous = zone.radius;
        }
        assert_eq!(zone.radius, 25.0);
    }

    #[test]
    fn test_overlap_axis() {
        let (axis, overlap) =
            overlap_axis(Vec2::new(30.0, 0.0), 20.0, Vec2::new(0.0, 0.0), 20.0).unwrap();
        assert_approx_eq!(axis.x, 1.0, 0.0001);
        assert_approx_eq!(axis.y, 0.0, 0.0001);
        assert_approx_eq!(overlap, 10.0, 0.0001);

        assert!(overlap_axis(Vec2::new(40.0, 0.0), 20.0, Vec2::ZERO, 20.0).is_none());
        assert!(!circles_overlap(Vec2::new(40.0, 0.0), 20.0, Vec2::ZERO, 20.0));

        let (axis, _) = overlap_axis(Vec2::ZERO, 20.0, Vec2::ZERO, 20.0).unwrap();
        assert_eq!(axis, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_message_json_shape() {
        let message = ClientMessage::Join {
            session_id: "42".to_string(),
            participant_id: "alice".to_string(),
        };
        let frame = encode(&message, WireFormat::Json).unwrap();
        match frame {
            Frame::Text(text) => {
                assert!(text.contains("\"join\""));
                assert!(text.contains("\"session_id\":\"42\""));
            }
            Frame::Binary(_) => panic!("Expected a text frame"),
        }
    }

    #[test]
    fn test_update_binary_roundtrip_drops_trail() {
        let mut state = PlayerState::new("bob", Vec2::new(5.0, 6.0));
        state.record_trail(Vec2::new(1.0, 1.0), 4);
        let message = ServerMessage::Update {
            participant_id: "bob".to_string(),
            state,
        };

        let frame = encode(&message, WireFormat::Binary).unwrap();
        let decoded: ServerMessage = decode(&frame).unwrap();
        match decoded {
            ServerMessage::Update {
                participant_id,
                state,
            } => {
                assert_eq!(participant_id, "bob");
                assert_eq!(state.position, Vec2::new(5.0, 6.0));
                assert!(state.trail.is_empty());
            }
            _ => panic!("Wrong message type after decoding"),
        }
    }

    #[test]
    fn test_decode_garbage_is_an_error() {
        let text = Frame::Text("{\"launch\":{}}".to_string());
        assert!(decode::<ServerMessage>(&text).is_err());

        let bytes = Frame::Binary(vec![0xFF, 0x00]);
        assert!(decode::<ServerMessage>(&bytes).is_err());
    }
}
