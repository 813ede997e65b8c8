//! Diagnostics overlay: latest trace values and a buffer occupancy graph

use macroquad::prelude::*;
use shared::MemorySink;
use std::collections::VecDeque;

/// One graph sample of the snapshot jitter buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSample {
    pub size: f32,
    pub target: f32,
}

pub struct Overlay {
    samples: VecDeque<BufferSample>,
    max_samples: usize,

    graph_width: f32,
    graph_height: f32,
    graph_visible: bool,
    internal_padding: f32,
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: 300,
            graph_width: 300.0,
            graph_height: 120.0,
            graph_visible: false,
            internal_padding: 12.0,
        }
    }

    pub fn toggle_graph(&mut self) {
        self.graph_visible = !self.graph_visible;
    }

    pub fn is_graph_visible(&self) -> bool {
        self.graph_visible
    }

    /// Takes one graph sample from the latest trace values, if present.
    pub fn sample(&mut self, sink: &MemorySink) {
        let size = sink.get("state.bufferSize").and_then(|v| v.as_f64());
        let target = sink.get("state.targetSize").and_then(|v| v.as_f64());
        if let (Some(size), Some(target)) = (size, target) {
            self.samples.push_back(BufferSample {
                size: size as f32,
                target: target as f32,
            });
            while self.samples.len() > self.max_samples {
                self.samples.pop_front();
            }
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &BufferSample> {
        self.samples.iter()
    }

    fn scale_max(&self) -> f32 {
        self.samples
            .iter()
            .map(|s| s.size.max(s.target))
            .fold(4.0f32, f32::max)
            * 1.2
    }

    pub fn render(&self, sink: &MemorySink) {
        self.draw_values(sink);
        if self.graph_visible && self.samples.len() >= 2 {
            self.draw_graph();
        }
    }

    fn draw_values(&self, sink: &MemorySink) {
        let mut y = 16.0;
        for (key, value) in sink.iter() {
            draw_text(&format!("{}: {}", key, value), 10.0, y, 14.0, WHITE);
            y += 14.0;
        }
    }

    fn draw_graph(&self) {
        let x = screen_width() - self.graph_width - 20.0;
        let y = 40.0;
        let usable_width = self.graph_width - self.internal_padding * 2.0;
        let usable_height = self.graph_height - self.internal_padding * 2.0;
        let graph_x = x + self.internal_padding;
        let graph_y = y + self.internal_padding;

        draw_rectangle(
            x,
            y - 20.0,
            self.graph_width,
            self.graph_height + 20.0,
            Color::from_rgba(0, 0, 0, 200),
        );
        draw_rectangle_lines(
            x,
            y - 20.0,
            self.graph_width,
            self.graph_height + 20.0,
            1.0,
            Color::from_rgba(120, 120, 120, 255),
        );
        draw_text("State buffer (G to toggle)", x + 6.0, y - 6.0, 11.0, WHITE);

        let scale_max = self.scale_max();
        let step = usable_width / (self.max_samples - 1) as f32;
        let to_y = |v: f32| graph_y + usable_height - v / scale_max * usable_height;

        for (i, pair) in self.samples.iter().collect::<Vec<_>>().windows(2).enumerate() {
            let x1 = graph_x + i as f32 * step;
            let x2 = x1 + step;
            draw_line(x1, to_y(pair[0].target), x2, to_y(pair[1].target), 1.0, YELLOW);
            let color = if pair[1].size == 0.0 { RED } else { GREEN };
            draw_line(x1, to_y(pair[0].size), x2, to_y(pair[1].size), 2.0, color);
        }

        if let Some(latest) = self.samples.back() {
            draw_text(
                &format!("size {:.0} / target {:.0}", latest.size, latest.target),
                graph_x,
                graph_y + usable_height + 10.0,
                11.0,
                WHITE,
            );
        }
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}
