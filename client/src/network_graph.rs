//! Latency history overlay (toggle with G)

use crate::network::ConnectionQuality;
use macroquad::prelude::*;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct LatencySample {
    pub latency_ms: f32,
    pub at: Instant,
}

pub struct LatencyGraph {
    samples: VecDeque<LatencySample>,
    max_samples: usize,
    sample_interval: Duration,
    last_sample: Option<Instant>,

    graph_width: f32,
    graph_height: f32,
    padding: f32,
    visible: bool,

    scale_max_ms: f32,
}

fn quality_color(quality: ConnectionQuality) -> Color {
    match quality {
        ConnectionQuality::Good => GREEN,
        ConnectionQuality::Fair => YELLOW,
        ConnectionQuality::Poor => RED,
    }
}

impl LatencyGraph {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: 60,
            sample_interval: Duration::from_millis(500),
            last_sample: None,

            graph_width: 260.0,
            graph_height: 100.0,
            padding: 10.0,
            visible: false,

            scale_max_ms: 100.0,
        }
    }

    pub fn toggle_visibility(&mut self) {
        self.visible = !self.visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn samples(&self) -> impl Iterator<Item = &LatencySample> {
        self.samples.iter()
    }

    /// Records the latest latency reading, at most once per sample interval.
    pub fn record(&mut self, latency: Duration, now: Instant) {
        if let Some(last) = self.last_sample {
            if now.saturating_duration_since(last) < self.sample_interval {
                return;
            }
        }
        self.last_sample = Some(now);

        self.samples.push_back(LatencySample {
            latency_ms: latency.as_secs_f32() * 1000.0,
            at: now,
        });
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }

        let peak = self
            .samples
            .iter()
            .map(|s| s.latency_ms)
            .fold(0.0f32, f32::max);
        let desired = (peak * 1.2).max(50.0);
        // Ease toward the new scale so the plot doesn't jump
        self.scale_max_ms = self.scale_max_ms * 0.8 + desired * 0.2;
    }

    fn span_ms(&self) -> f32 {
        match (self.samples.front(), self.samples.back()) {
            (Some(oldest), Some(newest)) => {
                newest.at.duration_since(oldest.at).as_secs_f32() * 1000.0
            }
            _ => 0.0,
        }
    }

    /// Draws the overlay in the top-right corner.
    pub fn render(&self) {
        if !self.visible {
            return;
        }

        let x = screen_width() - self.graph_width - 20.0;
        let y = 40.0;

        draw_rectangle(
            x,
            y - 24.0,
            self.graph_width,
            self.graph_height + 44.0,
            Color::from_rgba(0, 0, 0, 200),
        );
        draw_rectangle_lines(
            x,
            y - 24.0,
            self.graph_width,
            self.graph_height + 44.0,
            1.0,
            Color::from_rgba(120, 120, 120, 255),
        );
        draw_text("Latency (G to hide)", x + self.padding, y - 8.0, 14.0, WHITE);

        let inner_x = x + self.padding;
        let inner_w = self.graph_width - self.padding * 2.0;
        let inner_h = self.graph_height - self.padding;
        let to_y = |ms: f32| y + inner_h - (ms / self.scale_max_ms).min(1.0) * inner_h;

        for level in [100.0, 300.0] {
            if level <= self.scale_max_ms {
                draw_line(
                    inner_x,
                    to_y(level),
                    inner_x + inner_w,
                    to_y(level),
                    1.0,
                    Color::from_rgba(60, 60, 60, 255),
                );
                draw_text(
                    &format!("{:.0}ms", level),
                    inner_x + inner_w - 30.0,
                    to_y(level) - 2.0,
                    11.0,
                    GRAY,
                );
            }
        }

        let span = self.span_ms();
        if self.samples.len() >= 2 && span > 0.0 {
            let oldest = self.samples[0].at;
            let to_x = |at: Instant| {
                inner_x + at.duration_since(oldest).as_secs_f32() * 1000.0 / span * inner_w
            };
            for pair in self.samples.iter().collect::<Vec<_>>().windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let color = quality_color(ConnectionQuality::from_latency(
                    Duration::from_secs_f32(b.latency_ms / 1000.0),
                ));
                draw_line(
                    to_x(a.at),
                    to_y(a.latency_ms),
                    to_x(b.at),
                    to_y(b.latency_ms),
                    2.0,
                    color,
                );
            }
        }

        if let Some(latest) = self.samples.back() {
            let quality =
                ConnectionQuality::from_latency(Duration::from_secs_f32(latest.latency_ms / 1000.0));
            draw_text(
                &format!("{:.0}ms {:?}", latest.latency_ms, quality),
                inner_x,
                y + self.graph_height + 14.0,
                13.0,
                quality_color(quality),
            );
        }
    }
}

impl Default for LatencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_respect_interval_and_capacity() {
        let start = Instant::now();
        let mut graph = LatencyGraph::new();

        graph.record(Duration::from_millis(40), start);
        graph.record(Duration::from_millis(90), start + Duration::from_millis(100));
        assert_eq!(graph.samples().count(), 1);

        for i in 1..=100u64 {
            graph.record(
                Duration::from_millis(40),
                start + Duration::from_millis(500 * i),
            );
        }
        assert_eq!(graph.samples().count(), 60);
    }

    #[test]
    fn test_toggle() {
        let mut graph = LatencyGraph::new();
        assert!(!graph.is_visible());
        graph.toggle_visibility();
        assert!(graph.is_visible());
    }
}
