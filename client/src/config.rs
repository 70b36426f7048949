//! Tunables for one arena session

use shared::{
    WireFormat, WorldBounds, BASE_SPEED, BOOSTED_SPEED, TRAIL_CAPACITY, ZONE_DAMAGE_PER_TICK,
    ZONE_FLOOR_RADIUS, ZONE_INITIAL_RADIUS, ZONE_PHASE_SECONDS,
};
use std::time::Duration;

/// Movement, zone and collision parameters used by the local simulation step.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub bounds: WorldBounds,
    /// Units per nominal tick without a speed buff
    pub base_speed: f32,
    /// Units per nominal tick while `has_speed` is active
    pub boosted_speed: f32,
    /// Length of the tick the speeds are expressed in
    pub nominal_tick: Duration,
    /// Largest delta a single tick may integrate
    pub max_tick: Duration,
    /// Targets closer than this are treated as reached
    pub arrive_epsilon: f32,
    pub zone_damage_per_tick: i32,
    pub trail_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bounds: WorldBounds::default(),
            base_speed: BASE_SPEED,
            boosted_speed: BOOSTED_SPEED,
            nominal_tick: Duration::from_micros(16_667),
            max_tick: Duration::from_millis(100),
            arrive_epsilon: 1.0,
            zone_damage_per_tick: ZONE_DAMAGE_PER_TICK,
            trail_capacity: TRAIL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub initial_radius: f32,
    pub floor_radius: f32,
    pub phase_duration: Duration,
    pub shrink_interval: Duration,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            initial_radius: ZONE_INITIAL_RADIUS,
            floor_radius: ZONE_FLOOR_RADIUS,
            phase_duration: Duration::from_secs_f32(ZONE_PHASE_SECONDS),
            shrink_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub server_url: String,
    pub wire_format: WireFormat,
    pub heartbeat_interval: Duration,
    pub ping_interval: Duration,
    pub reconnect_delay: Duration,
    /// Minimum spacing between two outbound state updates
    pub publish_interval: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3001".to_string(),
            wire_format: WireFormat::Json,
            heartbeat_interval: Duration::from_secs(20),
            ping_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(3),
            publish_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub session_id: String,
    pub participant_id: String,
    /// Participants (local included) the roster must reach before a winner can be declared
    pub expected_participants: usize,
    /// Per-second gain used by remote reconciliation
    pub interpolation_gain: f32,
    pub heal_amount: i32,
    pub balance_poll_interval: Duration,
    pub simulation: SimulationConfig,
    pub zone: ZoneConfig,
    pub network: NetworkConfig,
}

impl ArenaConfig {
    pub fn new(session_id: impl Into<String>, participant_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            participant_id: participant_id.into(),
            expected_participants: 2,
            interpolation_gain: 10.0,
            heal_amount: 200,
            balance_poll_interval: Duration::from_secs(2),
            simulation: SimulationConfig::default(),
            zone: ZoneConfig::default(),
            network: NetworkConfig::default(),
        }
    }

    /// Connection URL carrying the session and participant as query parameters.
    pub fn connection_url(&self) -> String {
        format!(
            "{}/game?gameId={}&playerId={}",
            self.network.server_url.trim_end_matches('/'),
            self.session_id,
            self.participant_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_game_rules() {
        let config = ArenaConfig::new("7", "alice");
        assert_eq!(config.network.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(config.network.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.network.publish_interval, Duration::from_millis(50));
        assert_eq!(config.simulation.base_speed, 3.0);
        assert_eq!(config.simulation.boosted_speed, 5.0);
        assert_eq!(config.zone.floor_radius, 25.0);
        assert_eq!(config.heal_amount, 200);
    }

    #[test]
    fn test_connection_url() {
        let mut config = ArenaConfig::new("7", "alice");
        config.network.server_url = "ws://relay.local:3001/".to_string();
        assert_eq!(
            config.connection_url(),
            "ws://relay.local:3001/game?gameId=7&playerId=alice"
        );
    }
}
