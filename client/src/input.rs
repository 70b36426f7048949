//! Pointer and keyboard sampling for the arena window

use crate::game::ControlInput;
use crate::powerup::PowerUpKind;
use macroquad::prelude::*;
use shared::{Vec2 as WorldPoint, WorldBounds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Buy(PowerUpKind),
    ToggleGraph,
}

/// Fires once per press rather than every frame the key is held.
#[derive(Debug, Default, Clone, Copy)]
struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    fn rising(&mut self, current: bool) -> bool {
        let fired = current && !self.previous;
        self.previous = current;
        fired
    }
}

/// Maps a window-space point into world space when the world is drawn
/// scaled to fit and centred in a `screen` sized window.
pub fn screen_to_world(point: (f32, f32), screen: (f32, f32), bounds: &WorldBounds) -> WorldPoint {
    let (scale, offset_x, offset_y) = fit_transform(screen, bounds);
    WorldPoint::new((point.0 - offset_x) / scale, (point.1 - offset_y) / scale)
}

/// Scale and offset placing the world inside the window, aspect preserved.
pub fn fit_transform(screen: (f32, f32), bounds: &WorldBounds) -> (f32, f32, f32) {
    let scale = (screen.0 / bounds.width)
        .min(screen.1 / bounds.height)
        .max(f32::EPSILON);
    let offset_x = (screen.0 - bounds.width * scale) / 2.0;
    let offset_y = (screen.1 - bounds.height * scale) / 2.0;
    (scale, offset_x, offset_y)
}

pub struct InputManager {
    bounds: WorldBounds,
    key_speed: EdgeDetector,
    key_shield: EdgeDetector,
    key_health: EdgeDetector,
    key_graph: EdgeDetector,
}

impl InputManager {
    pub fn new(bounds: WorldBounds) -> Self {
        Self {
            bounds,
            key_speed: EdgeDetector::default(),
            key_shield: EdgeDetector::default(),
            key_health: EdgeDetector::default(),
            key_graph: EdgeDetector::default(),
        }
    }

    /// Samples this frame's pointer target and any newly pressed action keys.
    /// Keys 1/2/3 buy speed/shield/health, G toggles the latency graph.
    pub fn update(&mut self) -> (ControlInput, Vec<InputAction>) {
        let pointer = screen_to_world(
            mouse_position(),
            (screen_width(), screen_height()),
            &self.bounds,
        );

        let mut actions = Vec::new();
        if self.key_speed.rising(is_key_down(KeyCode::Key1)) {
            actions.push(InputAction::Buy(PowerUpKind::Speed));
        }
        if self.key_shield.rising(is_key_down(KeyCode::Key2)) {
            actions.push(InputAction::Buy(PowerUpKind::Shield));
        }
        if self.key_health.rising(is_key_down(KeyCode::Key3)) {
            actions.push(InputAction::Buy(PowerUpKind::Health));
        }
        if self.key_graph.rising(is_key_down(KeyCode::G)) {
            actions.push(InputAction::ToggleGraph);
        }

        (ControlInput::pointer(pointer), actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_detection() {
        let mut edge = EdgeDetector::default();
        assert!(edge.rising(true));
        assert!(!edge.rising(true));
        assert!(!edge.rising(false));
        assert!(edge.rising(true));
    }

    #[test]
    fn test_screen_to_world_identity() {
        let bounds = WorldBounds::new(900.0, 700.0);
        let point = screen_to_world((120.0, 80.0), (900.0, 700.0), &bounds);
        assert_eq!(point, WorldPoint::new(120.0, 80.0));
    }

    #[test]
    fn test_screen_to_world_letterboxed() {
        let bounds = WorldBounds::new(900.0, 700.0);
        // Twice as wide as needed: scale 1, 450px bars either side
        let point = screen_to_world((460.0, 10.0), (1800.0, 700.0), &bounds);
        assert_eq!(point, WorldPoint::new(10.0, 10.0));

        let outside = screen_to_world((100.0, 10.0), (1800.0, 700.0), &bounds);
        assert!(!bounds.contains(outside));
    }
}
