//! Per-tick simulation of the local player: pointer-follow movement, push
//! resolution against remote players, and safe-zone damage.

use crate::config::SimulationConfig;
use crate::store::PlayerStore;
use log::debug;
use shared::{
    overlap_axis, PlayerState, SafeZone, Vec2, WorldBounds, SHIELD_PUSH_MULTIPLIER,
    SPEED_PUSH_MULTIPLIER,
};

/// Where the pointer is this frame, if it is over the window at all.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlInput {
    pub pointer: Option<Vec2>,
}

impl ControlInput {
    pub fn pointer(position: Vec2) -> Self {
        Self {
            pointer: Some(position),
        }
    }

    pub fn none() -> Self {
        Self { pointer: None }
    }

    /// The movement target, only while the pointer is inside the canvas.
    pub fn target_within(&self, bounds: &WorldBounds) -> Option<Vec2> {
        self.pointer.filter(|p| bounds.contains(*p))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    pub moved: bool,
    pub collisions: usize,
    pub damaged: bool,
    /// Set only on the tick the local player went from alive to eliminated
    pub eliminated: bool,
}

/// Scale applied to the push the local player receives from `other`.
///
/// Shield is checked before speed and the two never stack: a shielded
/// opponent doubles the push whenever the local player is unshielded, even if
/// the local player is sped up.
pub fn push_multiplier(local: &PlayerState, other: &PlayerState) -> f32 {
    if other.has_shield && !local.has_shield {
        SHIELD_PUSH_MULTIPLIER
    } else if other.has_speed && !local.has_speed {
        SPEED_PUSH_MULTIPLIER
    } else {
        1.0
    }
}

pub struct LocalSimulation {
    config: SimulationConfig,
}

impl LocalSimulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Runs one tick of `dt` seconds against the current zone and remotes.
    pub fn step(
        &self,
        store: &mut PlayerStore,
        zone: &SafeZone,
        control: &ControlInput,
        dt: f32,
    ) -> StepReport {
        let bounds = self.config.bounds;
        let (local, remotes) = store.split_mut();
        let mut report = StepReport::default();

        if !local.is_alive() {
            return report;
        }

        let previous = local.position;
        let target = control.target_within(&bounds);
        let mut tentative = previous;

        if let Some(target) = target {
            let delta = target - tentative;
            let distance = delta.length();
            if distance >= self.config.arrive_epsilon {
                let speed = if local.has_speed {
                    self.config.boosted_speed
                } else {
                    self.config.base_speed
                };
                let ticks = self.tick_fraction(dt);
                let travel = (speed * ticks).min(distance);
                tentative = bounds.clamp(tentative + delta.scale(travel / distance), local.radius);
                report.moved = travel > 0.0;
            }
        }

        for other in remotes {
            if !other.state.alive {
                continue;
            }
            let Some((axis, overlap)) =
                overlap_axis(tentative, local.radius, other.rendered, other.state.radius)
            else {
                continue;
            };

            let push = axis.scale(overlap * 0.5 * push_multiplier(local, &other.state));
            tentative = bounds.clamp(tentative + push, local.radius);
            other.rendered = bounds.clamp(other.rendered - push, other.state.radius);
            report.collisions += 1;
            debug!(
                "Pushed by {} (overlap {:.2}, push {:.2},{:.2})",
                other.state.id, overlap, push.x, push.y
            );
        }

        local.velocity = if dt > 0.0 {
            (tentative - previous).scale(1.0 / dt)
        } else {
            Vec2::ZERO
        };
        local.position = tentative;
        if tentative != previous {
            local.record_trail(tentative, self.config.trail_capacity);
        }

        if target.is_some() && !zone.contains(tentative) {
            local.hp = (local.hp - self.config.zone_damage_per_tick).max(0);
            report.damaged = true;
        }

        if local.hp == 0 && local.alive {
            local.alive = false;
            report.eliminated = true;
        }

        report
    }

    /// How many nominal ticks `dt` seconds represent, after capping.
    fn tick_fraction(&self, dt: f32) -> f32 {
        let nominal = self.config.nominal_tick.as_secs_f32();
        if nominal <= 0.0 || dt <= 0.0 {
            return 0.0;
        }
        dt.min(self.config.max_tick.as_secs_f32()) / nominal
    }
}
