use crate::broadcast::StateBroadcaster;
use crate::client_manager::{Connection, ConnectionRegistry};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    Channel, GameState, PlayerId, PlayerState, TickAccumulator, TraceSink, DESYNC_GAP_MILLIS,
    TICKS_PER_SECOND, TICK_MILLIS,
};
use std::f64::consts::TAU;

/// Authoritative game loop, independent of the transport.
///
/// The owner calls [`ServerGame::frame`] as often as it likes with the wall
/// time elapsed since the previous call; the game runs however many fixed
/// ticks are due.
pub struct ServerGame<C: Channel> {
    state: GameState,
    registry: ConnectionRegistry<C>,
    broadcaster: StateBroadcaster,
    accumulator: TickAccumulator,
    rng: StdRng,
}

impl<C: Channel> ServerGame<C> {
    pub fn new(max_clients: usize) -> Self {
        Self::with_rng(max_clients, StdRng::from_entropy())
    }

    /// Deterministic spawn positions.
    pub fn with_seed(max_clients: usize, seed: u64) -> Self {
        Self::with_rng(max_clients, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_clients: usize, rng: StdRng) -> Self {
        Self {
            state: GameState::new(),
            registry: ConnectionRegistry::new(max_clients),
            broadcaster: StateBroadcaster::default(),
            accumulator: TickAccumulator::new(),
            rng,
        }
    }

    /// Admits a player and spawns it at a random position, or returns `None`
    /// when the server is full.
    pub fn add_player(&mut self, channel: C) -> Option<PlayerId> {
        let id = self.registry.add(channel)?;
        let pos = (
            self.rng.gen_range(100.0..=900.0),
            self.rng.gen_range(100.0..=600.0),
        );
        let theta = self.rng.gen_range(0.0..TAU);
        self.state.players.insert(id, PlayerState::new(pos, theta));
        info!("Spawned player {} at ({:.1}, {:.1})", id, pos.0, pos.1);
        Some(id)
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Connection<C>> {
        self.state.players.remove(&id);
        self.registry.remove(id)
    }

    /// Advances wall time by `delta_ms` and returns the number of ticks run.
    pub fn frame(&mut self, delta_ms: f64, sink: &mut dyn TraceSink) -> u32 {
        if delta_ms > DESYNC_GAP_MILLIS {
            warn!("Server stalled for {:.0}ms, resetting input streams", delta_ms);
            self.desync_reset();
            return 0;
        }

        let due = self.accumulator.accumulate(delta_ms, TICK_MILLIS);
        for _ in 0..due {
            self.tick(sink);
        }
        due
    }

    /// Runs exactly one simulation tick.
    pub fn tick(&mut self, sink: &mut dyn TraceSink) {
        for connection in self.registry.iter_mut() {
            let datagrams = connection.channel.recv();
            if !datagrams.is_empty() {
                connection.touch();
            }
            for bytes in &datagrams {
                connection.inputs.receive_packet(bytes, sink);
            }
            connection.inputs.tick(sink);
        }

        let registry = &self.registry;
        self.state.step_with(|id| {
            registry
                .get(id)
                .map(|connection| connection.inputs.current_inputs())
                .unwrap_or_default()
        });
        sink.record("server.tick", self.state.server_tick.into());

        if self.broadcaster.is_update_tick(self.state.server_tick) {
            self.broadcaster
                .broadcast(&self.state, &mut self.registry, sink);
        }

        if self.state.server_tick % (TICKS_PER_SECOND * 10) == 0 && !self.registry.is_empty() {
            for connection in self.registry.iter() {
                debug!(
                    "Tick {}: player {} buffer {}/{} acked {} dilation {}",
                    self.state.server_tick,
                    connection.id,
                    connection.inputs.buffer_len(),
                    connection.inputs.target(),
                    connection.inputs.acked_seq(),
                    connection.inputs.client_time_dilation()
                );
            }
        }
    }

    /// Drops the tick backlog and every input buffered so far.
    pub fn desync_reset(&mut self) {
        self.accumulator.reset();
        for connection in self.registry.iter_mut() {
            connection.channel.recv();
            connection.inputs.reset();
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConnectionRegistry<C> {
        &mut self.registry
    }
}
