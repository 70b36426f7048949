use crate::input::fit_transform;
use crate::network::{ConnectionQuality, ConnectionState};
use crate::outcome::MatchPhase;
use crate::powerup::PowerUpKind;
use crate::session::WorldSnapshot;
use macroquad::prelude::*;
use shared::{PlayerState, WorldBounds};

const BACKGROUND: Color = Color::new(0.10, 0.10, 0.10, 1.0);
const ARENA_FLOOR: Color = Color::new(0.16, 0.16, 0.18, 1.0);
const ZONE_EDGE: Color = Color::new(0.25, 0.85, 0.45, 1.0);
const SHIELD_RING: Color = Color::new(0.30, 0.65, 1.0, 1.0);
const SPEED_RING: Color = Color::new(1.0, 0.85, 0.20, 1.0);

fn player_color(state: &PlayerState) -> Color {
    let [_, r, g, b] = state.color.to_be_bytes();
    Color::from_rgba(r, g, b, 255)
}

/// Screen-space transform for one frame.
#[derive(Debug, Clone, Copy)]
struct View {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl View {
    fn point(&self, p: shared::Vec2) -> (f32, f32) {
        (
            self.offset_x + p.x * self.scale,
            self.offset_y + p.y * self.scale,
        )
    }

    fn length(&self, l: f32) -> f32 {
        l * self.scale
    }
}

pub struct Renderer {
    bounds: WorldBounds,
}

impl Renderer {
    pub fn new(bounds: WorldBounds) -> Self {
        Self { bounds }
    }

    pub fn render(&self, snapshot: &WorldSnapshot) {
        clear_background(BACKGROUND);

        let (scale, offset_x, offset_y) =
            fit_transform((screen_width(), screen_height()), &self.bounds);
        let view = View {
            scale,
            offset_x,
            offset_y,
        };

        self.draw_arena(&view, snapshot);

        for remote in &snapshot.remotes {
            self.draw_player(&view, remote, false);
        }
        self.draw_player(&view, &snapshot.local, true);

        self.draw_hud(snapshot);

        if snapshot.phase != MatchPhase::Active {
            self.draw_outcome(snapshot);
        } else if !snapshot.started {
            self.draw_lobby(snapshot);
        }
    }

    fn draw_arena(&self, view: &View, snapshot: &WorldSnapshot) {
        let (x, y) = view.point(shared::Vec2::ZERO);
        draw_rectangle(
            x,
            y,
            view.length(self.bounds.width),
            view.length(self.bounds.height),
            Color::from_rgba(120, 20, 20, 255),
        );

        let zone = &snapshot.zone;
        let (cx, cy) = view.point(zone.center);
        draw_circle(cx, cy, view.length(zone.radius), ARENA_FLOOR);
        draw_circle_lines(cx, cy, view.length(zone.radius), 2.0, ZONE_EDGE);
        draw_circle_lines(
            cx,
            cy,
            view.length(zone.floor_radius),
            1.0,
            Color::from_rgba(80, 80, 80, 255),
        );
    }

    fn draw_player(&self, view: &View, state: &PlayerState, is_local: bool) {
        let color = player_color(state);

        let trail_len = state.trail.len().max(1) as f32;
        for (i, point) in state.trail.iter().enumerate() {
            let (tx, ty) = view.point(*point);
            let fade = (i as f32 + 1.0) / trail_len;
            draw_circle(
                tx,
                ty,
                view.length(state.radius * 0.35 * fade),
                Color::new(color.r, color.g, color.b, 0.35 * fade),
            );
        }

        let (x, y) = view.point(state.position);
        let radius = view.length(state.radius);

        if !state.alive {
            draw_circle_lines(x, y, radius, 1.5, GRAY);
            draw_line(x - radius * 0.5, y - radius * 0.5, x + radius * 0.5, y + radius * 0.5, 2.0, GRAY);
            draw_line(x - radius * 0.5, y + radius * 0.5, x + radius * 0.5, y - radius * 0.5, 2.0, GRAY);
            return;
        }

        draw_circle(x, y, radius, color);
        draw_circle_lines(x, y, radius, 2.0, if is_local { WHITE } else { DARKGRAY });

        if state.has_shield {
            draw_circle_lines(x, y, radius + 5.0, 3.0, SHIELD_RING);
        }
        if state.has_speed {
            draw_circle_lines(x, y, radius + 9.0, 1.5, SPEED_RING);
        }

        let bar_width = radius * 2.0;
        let fraction = (state.hp as f32 / state.max_hp.max(1) as f32).clamp(0.0, 1.0);
        let bar_y = y - radius - 12.0;
        draw_rectangle(x - radius, bar_y, bar_width, 4.0, Color::from_rgba(60, 60, 60, 255));
        let bar_color = if fraction > 0.5 {
            GREEN
        } else if fraction > 0.2 {
            YELLOW
        } else {
            RED
        };
        draw_rectangle(x - radius, bar_y, bar_width * fraction, 4.0, bar_color);

        let label = if is_local { "you" } else { state.name.as_str() };
        let dims = measure_text(label, None, 14, 1.0);
        draw_text(label, x - dims.width / 2.0, bar_y - 4.0, 14.0, WHITE);
    }

    fn draw_hud(&self, snapshot: &WorldSnapshot) {
        let x = 10.0;
        let mut y = 20.0;
        let line = 18.0;

        let (status, status_color) = match snapshot.connection {
            ConnectionState::Connected => ("CONNECTED", GREEN),
            ConnectionState::Connecting => ("CONNECTING", YELLOW),
            ConnectionState::Reconnecting => ("RECONNECTING", ORANGE),
            ConnectionState::Disconnected => ("OFFLINE", RED),
        };
        draw_rectangle(x, y - 9.0, 8.0, 8.0, status_color);
        draw_text(status, x + 14.0, y, 16.0, WHITE);

        if let Some(latency) = snapshot.latency {
            let quality_color = match snapshot.quality {
                ConnectionQuality::Good => GREEN,
                ConnectionQuality::Fair => YELLOW,
                ConnectionQuality::Poor => RED,
            };
            draw_text(
                &format!("{}ms", latency.as_millis()),
                x + 130.0,
                y,
                16.0,
                quality_color,
            );
        }

        y += line;
        let local = &snapshot.local;
        draw_text(
            &format!("HP {}/{}", local.hp, local.max_hp),
            x,
            y,
            16.0,
            WHITE,
        );

        y += line;
        let alive = snapshot.remotes.iter().filter(|r| r.alive).count() + usize::from(local.alive);
        draw_text(
            &format!(
                "Alive {}/{}   Zone r={:.0}",
                alive,
                snapshot.remotes.len() + 1,
                snapshot.zone.radius
            ),
            x,
            y,
            16.0,
            WHITE,
        );

        y += line;
        draw_text(
            &format!("Balance {}", snapshot.balance),
            x,
            y,
            16.0,
            WHITE,
        );

        for (i, (kind, cost)) in snapshot.next_costs.iter().enumerate() {
            y += line;
            let remaining = match kind {
                PowerUpKind::Speed => snapshot.speed_remaining,
                PowerUpKind::Shield => snapshot.shield_remaining,
                PowerUpKind::Health => None,
            };
            let text = match remaining {
                Some(left) => format!("[{}] {} active {:.1}s", i + 1, kind, left.as_secs_f32()),
                None => format!("[{}] {} - {}", i + 1, kind, cost),
            };
            let color = if remaining.is_some() {
                SPEED_RING
            } else if *cost <= snapshot.balance {
                WHITE
            } else {
                GRAY
            };
            draw_text(&text, x, y, 16.0, color);
        }
    }

    fn draw_lobby(&self, snapshot: &WorldSnapshot) {
        let w = screen_width();
        let h = screen_height();
        draw_rectangle(0.0, h / 2.0 - 40.0, w, 80.0, Color::from_rgba(0, 0, 0, 140));

        let text = match snapshot.countdown_remaining {
            Some(remaining) => format!("Starting in {}", remaining.as_secs_f32().ceil()),
            None => format!("Waiting for players ({} ready)", snapshot.ready_count + 1),
        };
        let dims = measure_text(&text, None, 32, 1.0);
        draw_text(&text, (w - dims.width) / 2.0, h / 2.0 + 10.0, 32.0, WHITE);
    }

    fn draw_outcome(&self, snapshot: &WorldSnapshot) {
        let w = screen_width();
        let h = screen_height();
        draw_rectangle(0.0, h / 2.0 - 40.0, w, 80.0, Color::from_rgba(0, 0, 0, 180));

        let text = match snapshot.winner.as_deref() {
            Some(id) if id == snapshot.local.id => "You are the last one standing!".to_string(),
            Some(id) => format!("{} wins", id),
            None => "Match over".to_string(),
        };
        let dims = measure_text(&text, None, 36, 1.0);
        draw_text(&text, (w - dims.width) / 2.0, h / 2.0 + 12.0, 36.0, WHITE);
    }
}
