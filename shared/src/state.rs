use crate::inputs::TickInputs;
use crate::simulation::tick_player;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Stable per-player identifier handed out by the handshake.
pub type PlayerId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub pos: (f64, f64),
    pub vel: (f64, f64),
    pub theta: f64,
    /// Sequence of the last input folded into this state, if it was a real one.
    pub latest_input_seq: Option<u64>,
}

impl PlayerState {
    pub fn new(pos: (f64, f64), theta: f64) -> Self {
        Self {
            pos,
            vel: (0.0, 0.0),
            theta,
            latest_input_seq: None,
        }
    }

    /// Interpolates between two render endpoints. `t` is expected in `[0, 1)`.
    pub fn lerp(&self, other: &PlayerState, t: f64) -> PlayerState {
        PlayerState {
            pos: (
                self.pos.0 + (other.pos.0 - self.pos.0) * t,
                self.pos.1 + (other.pos.1 - self.pos.1) * t,
            ),
            vel: (
                self.vel.0 + (other.vel.0 - self.vel.0) * t,
                self.vel.1 + (other.vel.1 - self.vel.1) * t,
            ),
            theta: lerp_angle(self.theta, other.theta, t),
            latest_input_seq: other.latest_input_seq,
        }
    }
}

/// Interpolates between two headings along the shorter arc.
pub fn lerp_angle(a: f64, b: f64, t: f64) -> f64 {
    let delta = b - a;
    let delta = if delta > PI {
        delta - 2.0 * PI
    } else if delta < -PI {
        delta + 2.0 * PI
    } else {
        delta
    };
    a + delta * t
}

/// Authoritative world snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub server_tick: u64,
    pub players: BTreeMap<PlayerId, PlayerState>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the world by exactly one tick, asking `inputs_for` for each
    /// player's inputs in id order.
    pub fn step_with<F>(&mut self, mut inputs_for: F)
    where
        F: FnMut(PlayerId) -> TickInputs,
    {
        self.server_tick += 1;
        for (id, player) in self.players.iter_mut() {
            let inputs = inputs_for(*id);
            tick_player(player, &inputs);
        }
    }
}
