//! Mouse input capture for the local player

use crate::game::InputSource;
use macroquad::prelude::*;
use shared::InputsUnit;

/// Moves larger than this that reverse direction are treated as glitches.
pub const SPIKE_THRESHOLD: f64 = 100.0;

/// Accumulates raw mouse motion between local ticks.
#[derive(Debug, Default, Clone)]
pub struct MouseAccumulator {
    current: InputsUnit,
    last_dx: f64,
    last_dy: f64,
}

impl MouseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one motion event unless it looks like a pointer-warp spike.
    pub fn handle_move(&mut self, dx: f64, dy: f64) {
        let x_spike = dx.abs() > SPIKE_THRESHOLD && dx * self.last_dx < 0.0;
        let y_spike = dy.abs() > SPIKE_THRESHOLD && dy * self.last_dy < 0.0;
        if x_spike || y_spike {
            return;
        }
        self.last_dx = dx;
        self.last_dy = dy;
        self.current.mouse_delta.0 += dx;
        self.current.mouse_delta.1 += dy;
    }

    pub fn set_clicking(&mut self, clicking: bool) {
        self.current.clicking = clicking;
    }
}

impl InputSource for MouseAccumulator {
    fn consume_accumulated_inputs(&mut self) -> InputsUnit {
        let result = self.current;
        self.current = InputsUnit::new(0.0, 0.0, result.clicking);
        result
    }
}

/// Converts macroquad's per-frame delta (window-local units in `[-1, 1]`,
/// previous minus current) into pixels moved.
pub fn delta_to_pixels(delta: Vec2, screen: (f32, f32)) -> (f64, f64) {
    (
        f64::from(-delta.x * screen.0 / 2.0),
        f64::from(-delta.y * screen.1 / 2.0),
    )
}

/// Polls macroquad once per frame and feeds a [`MouseAccumulator`].
pub struct MouseInput {
    accumulator: MouseAccumulator,
    captured: bool,
    // The frame that grabs the cursor reports the jump to the grab point.
    skip_delta: bool,
    prev_key_g: bool,
}

impl MouseInput {
    pub fn new() -> Self {
        Self {
            accumulator: MouseAccumulator::new(),
            captured: false,
            skip_delta: false,
            prev_key_g: false,
        }
    }

    /// Samples the mouse and returns true when the graph toggle key was
    /// pressed this frame.
    pub fn update(&mut self) -> bool {
        if !self.captured {
            if is_mouse_button_pressed(MouseButton::Left) {
                set_cursor_grab(true);
                show_mouse(false);
                self.captured = true;
                self.skip_delta = true;
            }
        } else if is_key_pressed(KeyCode::Escape) {
            set_cursor_grab(false);
            show_mouse(true);
            self.captured = false;
            self.accumulator.set_clicking(false);
        } else {
            let (dx, dy) =
                delta_to_pixels(mouse_delta_position(), (screen_width(), screen_height()));
            if self.skip_delta {
                self.skip_delta = false;
            } else if dx != 0.0 || dy != 0.0 {
                self.accumulator.handle_move(dx, dy);
            }
            self.accumulator
                .set_clicking(is_mouse_button_down(MouseButton::Left));
        }

        let key_g = is_key_down(KeyCode::G);
        let toggled = key_g && !self.prev_key_g;
        self.prev_key_g = key_g;
        toggled
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }
}

impl Default for MouseInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for MouseInput {
    fn consume_accumulated_inputs(&mut self) -> InputsUnit {
        self.accumulator.consume_accumulated_inputs()
    }
}
