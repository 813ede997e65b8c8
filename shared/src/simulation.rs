//! Deterministic fixed-timestep player simulation.
//!
//! Both the server (authoritative) and the client (prediction and rollback)
//! run exactly this code, so it must stay a pure function of the previous
//! state and the tick's inputs. Any hidden input (wall clock, randomness,
//! iteration order) would make resimulation diverge from the server.

use crate::inputs::TickInputs;
use crate::state::PlayerState;
use crate::{PLAYER_RADIUS, WORLD_HEIGHT, WORLD_WIDTH};

/// Velocity added per tick along the heading while clicking.
pub const THRUST: f64 = 0.05;
/// Velocity multiplier per tick while coasting.
pub const DAMPING: f64 = 0.95;
/// Heading change in radians per pixel of horizontal mouse movement.
pub const MOUSE_SENSITIVITY: f64 = 0.002;

/// Advances one player by one tick in place.
pub fn tick_player(player: &mut PlayerState, inputs: &TickInputs) {
    player.latest_input_seq = inputs.seq;

    if inputs.inputs.clicking {
        player.vel.0 += THRUST * player.theta.cos();
        player.vel.1 += THRUST * player.theta.sin();
    } else {
        player.vel.0 *= DAMPING;
        player.vel.1 *= DAMPING;
    }

    player.theta += MOUSE_SENSITIVITY * inputs.inputs.mouse_delta.0;

    player.pos.0 += player.vel.0;
    player.pos.1 += player.vel.1;

    (player.pos.0, player.vel.0) = bounce(player.pos.0, player.vel.0, WORLD_WIDTH);
    (player.pos.1, player.vel.1) = bounce(player.pos.1, player.vel.1, WORLD_HEIGHT);
}

/// Returns the next state without touching the previous one.
pub fn simulate(player: &PlayerState, inputs: &TickInputs) -> PlayerState {
    let mut next = player.clone();
    tick_player(&mut next, inputs);
    next
}

// Keeps the circle inside [radius, extent - radius] and turns the velocity
// back inwards when it hits a wall.
fn bounce(pos: f64, vel: f64, extent: f64) -> (f64, f64) {
    if pos < PLAYER_RADIUS {
        (PLAYER_RADIUS, vel.abs())
    } else if pos > extent - PLAYER_RADIUS {
        (extent - PLAYER_RADIUS, -vel.abs())
    } else {
        (pos, vel)
    }
}

/// Wall-clock accumulator that converts frame deltas into whole ticks.
#[derive(Debug, Clone, Default)]
pub struct TickAccumulator {
    accumulated_ms: f64,
}

impl TickAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta_ms` and returns how many ticks of `period_ms` are now due.
    /// The remainder carries over to the next call.
    pub fn accumulate(&mut self, delta_ms: f64, period_ms: f64) -> u32 {
        if period_ms <= 0.0 {
            return 0;
        }
        self.accumulated_ms += delta_ms.max(0.0);
        let due = (self.accumulated_ms / period_ms).floor();
        self.accumulated_ms -= due * period_ms;
        due as u32
    }

    /// Progress towards the next tick, in `[0, 1)`.
    pub fn fraction(&self, period_ms: f64) -> f64 {
        if period_ms <= 0.0 {
            return 0.0;
        }
        (self.accumulated_ms / period_ms).clamp(0.0, 1.0 - f64::EPSILON)
    }

    pub fn reset(&mut self) {
        self.accumulated_ms = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::InputsUnit;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn clicking(seq: u64) -> TickInputs {
        TickInputs::confirmed(seq, InputsUnit::new(0.0, 0.0, true))
    }

    fn random_inputs(rng: &mut StdRng, seq: u64) -> TickInputs {
        TickInputs::confirmed(
            seq,
            InputsUnit::new(
                rng.gen_range(-200.0..200.0),
                rng.gen_range(-200.0..200.0),
                rng.gen_bool(0.6),
            ),
        )
    }

    #[test]
    fn test_thrust_along_heading() {
        let player = PlayerState::new((500.0, 400.0), 0.0);
        let next = simulate(&player, &clicking(1));

        assert_approx_eq!(next.vel.0, THRUST);
        assert_approx_eq!(next.vel.1, 0.0);
        assert_approx_eq!(next.pos.0, 500.0 + THRUST);
        assert_eq!(next.latest_input_seq, Some(1));
    }

    #[test]
    fn test_damping_when_not_clicking() {
        let mut player = PlayerState::new((500.0, 400.0), 0.0);
        player.vel = (2.0, -1.0);

        let next = simulate(&player, &TickInputs::guessed(InputsUnit::default()));
        assert_approx_eq!(next.vel.0, 2.0 * DAMPING);
        assert_approx_eq!(next.vel.1, -1.0 * DAMPING);
        assert_eq!(next.latest_input_seq, None);
    }

    #[test]
    fn test_mouse_turns_heading() {
        let player = PlayerState::new((500.0, 400.0), 1.0);
        let inputs = TickInputs::confirmed(1, InputsUnit::new(50.0, 999.0, false));
        let next = simulate(&player, &inputs);
        assert_approx_eq!(next.theta, 1.0 + 50.0 * MOUSE_SENSITIVITY);
    }

    #[test]
    fn test_wall_bounce_reflects_velocity() {
        let mut player = PlayerState::new((PLAYER_RADIUS + 1.0, 400.0), 0.0);
        player.vel = (-5.0, 0.0);

        let next = simulate(&player, &TickInputs::default());
        assert_eq!(next.pos.0, PLAYER_RADIUS);
        assert!(next.vel.0 > 0.0);

        let mut player = PlayerState::new((500.0, WORLD_HEIGHT - PLAYER_RADIUS - 1.0), 0.0);
        player.vel = (0.0, 5.0);
        let next = simulate(&player, &TickInputs::default());
        assert_eq!(next.pos.1, WORLD_HEIGHT - PLAYER_RADIUS);
        assert!(next.vel.1 < 0.0);
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs: Vec<TickInputs> = (1..=500).map(|s| random_inputs(&mut rng, s)).collect();

        let start = PlayerState::new((300.0, 300.0), 0.3);
        let mut a = start.clone();
        let mut b = start.clone();
        for input in &inputs {
            a = simulate(&a, input);
            tick_player(&mut b, input);
        }

        assert_eq!(a.pos.0.to_bits(), b.pos.0.to_bits());
        assert_eq!(a.pos.1.to_bits(), b.pos.1.to_bits());
        assert_eq!(a.vel.0.to_bits(), b.vel.0.to_bits());
        assert_eq!(a.theta.to_bits(), b.theta.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn test_position_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for trial in 0..20 {
            let mut player = PlayerState::new(
                (
                    rng.gen_range(-500.0..WORLD_WIDTH + 500.0),
                    rng.gen_range(-500.0..WORLD_HEIGHT + 500.0),
                ),
                rng.gen_range(0.0..6.3),
            );
            player.vel = (rng.gen_range(-80.0..80.0), rng.gen_range(-80.0..80.0));

            for seq in 0..1000 {
                tick_player(&mut player, &random_inputs(&mut rng, seq));
                assert!(
                    (PLAYER_RADIUS..=WORLD_WIDTH - PLAYER_RADIUS).contains(&player.pos.0),
                    "trial {} tick {}: x = {}",
                    trial,
                    seq,
                    player.pos.0
                );
                assert!(
                    (PLAYER_RADIUS..=WORLD_HEIGHT - PLAYER_RADIUS).contains(&player.pos.1),
                    "trial {} tick {}: y = {}",
                    trial,
                    seq,
                    player.pos.1
                );
            }
        }
    }

    #[test]
    fn test_accumulator_counts_whole_ticks() {
        let mut acc = TickAccumulator::new();
        assert_eq!(acc.accumulate(5.0, 10.0), 0);
        assert_approx_eq!(acc.fraction(10.0), 0.5);
        assert_eq!(acc.accumulate(26.0, 10.0), 3);
        assert_approx_eq!(acc.fraction(10.0), 0.1);

        acc.reset();
        assert_eq!(acc.fraction(10.0), 0.0);
        assert_eq!(acc.accumulate(100.0, 0.0), 0);
    }
}
