//! Remote reconciliation: eases each remote's drawn position toward the last
//! authoritative position, independent of when network updates arrive.

use crate::store::PlayerStore;
use shared::Vec2;

/// Moves `current` toward `target` by `clamp(dt * gain, 0, 1)` of the gap.
///
/// The result always lies on the segment between the two points, so it can
/// never overshoot the authoritative position.
pub fn interpolate(current: Vec2, target: Vec2, dt: f32, gain: f32) -> Vec2 {
    let alpha = (dt * gain).clamp(0.0, 1.0);
    if alpha >= 1.0 {
        return target;
    }
    current.lerp(target, alpha)
}

/// Advances every living remote's rendered position by `dt` seconds.
pub fn reconcile(store: &mut PlayerStore, dt: f32, gain: f32, trail_capacity: usize) {
    for entry in store.remotes_mut() {
        if !entry.state.alive {
            continue;
        }
        let next = interpolate(entry.rendered, entry.state.position, dt, gain);
        if next != entry.rendered {
            entry.rendered = next;
            entry.state.record_trail(next, trail_capacity);
        }
    }
}
