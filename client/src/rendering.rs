use crate::game::RenderFrame;
use macroquad::prelude::*;
use shared::{PlayerId, PlayerState, PLAYER_RADIUS, WORLD_HEIGHT, WORLD_WIDTH};

pub struct Renderer {
    scale: f32,
    offset: (f32, f32),
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            scale: 1.0,
            offset: (0.0, 0.0),
        }
    }

    /// Fits the world into the current window, letterboxed.
    fn update_viewport(&mut self) {
        let world_w = WORLD_WIDTH as f32;
        let world_h = WORLD_HEIGHT as f32;
        self.scale = (screen_width() / world_w).min(screen_height() / world_h);
        self.offset = (
            (screen_width() - world_w * self.scale) / 2.0,
            (screen_height() - world_h * self.scale) / 2.0,
        );
    }

    fn to_screen(&self, pos: (f64, f64)) -> (f32, f32) {
        (
            self.offset.0 + pos.0 as f32 * self.scale,
            self.offset.1 + pos.1 as f32 * self.scale,
        )
    }

    pub fn render(&mut self, frame: &RenderFrame<'_>) {
        self.update_viewport();
        clear_background(Color::from_rgba(26, 26, 26, 255));
        self.draw_world();

        for (id, cur) in &frame.cur_state.players {
            if *id == frame.player_id {
                continue;
            }
            let player = match frame.prev_state.players.get(id) {
                Some(prev) => prev.lerp(cur, frame.remote_alpha),
                None => cur.clone(),
            };
            self.draw_player(*id, &player, Color::from_rgba(255, 68, 68, 255));
        }

        let local = frame.prev_local.lerp(frame.cur_local, frame.local_alpha);
        self.draw_player(frame.player_id, &local, GREEN);
    }

    /// Shown while the handshake has completed but no snapshot has arrived.
    pub fn render_waiting(&mut self, message: &str) {
        self.update_viewport();
        clear_background(Color::from_rgba(26, 26, 26, 255));
        self.draw_world();
        draw_text(
            message,
            self.offset.0 + 20.0,
            self.offset.1 + 40.0,
            24.0,
            WHITE,
        );
    }

    fn draw_world(&self) {
        draw_rectangle_lines(
            self.offset.0,
            self.offset.1,
            WORLD_WIDTH as f32 * self.scale,
            WORLD_HEIGHT as f32 * self.scale,
            2.0,
            Color::from_rgba(68, 68, 68, 255),
        );
    }

    fn draw_player(&self, id: PlayerId, player: &PlayerState, color: Color) {
        let (x, y) = self.to_screen(player.pos);
        let radius = PLAYER_RADIUS as f32 * self.scale;
        draw_circle_lines(x, y, radius, 2.0, color);

        let heading = (
            player.pos.0 + PLAYER_RADIUS * player.theta.cos(),
            player.pos.1 + PLAYER_RADIUS * player.theta.sin(),
        );
        let (hx, hy) = self.to_screen(heading);
        draw_circle(hx, hy, 4.0 * self.scale, color);

        draw_text(
            &id.to_string(),
            x - 4.0 * self.scale,
            y + 4.0 * self.scale,
            14.0 * self.scale,
            WHITE,
        );
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
