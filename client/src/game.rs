use crate::inputs_sender::InputsSender;
use crate::prediction::{Predictor, Reconciliation};
use crate::state::StateReceiver;
use log::{info, warn};
use shared::{
    Channel, GameState, InputsUnit, PlayerId, PlayerState, TickAccumulator, TimeDilation,
    TraceSink, DESYNC_GAP_MILLIS, TICKS_PER_SERVER_UPDATE, TICK_MILLIS,
};

/// Source of local control input, drained once per local tick.
pub trait InputSource {
    /// Returns everything accumulated since the previous call. A held click
    /// stays held.
    fn consume_accumulated_inputs(&mut self) -> InputsUnit;
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    pub player_id: PlayerId,
    pub prev_state: &'a GameState,
    pub cur_state: &'a GameState,
    /// Progress from `prev_state` to `cur_state`, in `[0, 1)`.
    pub remote_alpha: f64,
    pub prev_local: &'a PlayerState,
    pub cur_local: &'a PlayerState,
    /// Progress from `prev_local` to `cur_local`, in `[0, 1)`.
    pub local_alpha: f64,
}

/// Client frame loop: local prediction at the (dilated) tick rate, snapshot
/// consumption at the (dilated) server update rate.
pub struct ClientGame {
    player_id: PlayerId,
    sender: InputsSender,
    receiver: StateReceiver,
    predictor: Predictor,

    prev_state: GameState,
    cur_state: GameState,
    prev_local: Option<PlayerState>,

    local_acc: TickAccumulator,
    local_dilation: TimeDilation,
    remote_acc: TickAccumulator,
    remote_dilation: TimeDilation,

    corrections: u64,
    resets: u64,
}

impl ClientGame {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            sender: InputsSender::new(),
            receiver: StateReceiver::new(),
            predictor: Predictor::new(),
            prev_state: GameState::new(),
            cur_state: GameState::new(),
            prev_local: None,
            local_acc: TickAccumulator::new(),
            local_dilation: 0,
            remote_acc: TickAccumulator::new(),
            remote_dilation: 0,
            corrections: 0,
            resets: 0,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    fn local_tick_millis(&self) -> f64 {
        TICK_MILLIS + f64::from(self.local_dilation)
    }

    fn remote_update_millis(&self) -> f64 {
        TICKS_PER_SERVER_UPDATE as f64 * (TICK_MILLIS + f64::from(self.remote_dilation))
    }

    /// Advances the client by `delta_ms` of wall time.
    pub fn frame(
        &mut self,
        delta_ms: f64,
        channel: &mut dyn Channel,
        input: &mut dyn InputSource,
        sink: &mut dyn TraceSink,
    ) -> Option<RenderFrame<'_>> {
        if delta_ms > DESYNC_GAP_MILLIS {
            warn!("Frame gap of {:.0}ms, resetting connection state", delta_ms);
            self.reset(channel);
            return None;
        }

        let local_ticks = self.local_acc.accumulate(delta_ms, self.local_tick_millis());
        for _ in 0..local_ticks {
            self.run_local_tick(channel, input, sink);
        }

        let remote_updates = self
            .remote_acc
            .accumulate(delta_ms, self.remote_update_millis());
        for _ in 0..remote_updates {
            self.run_remote_update(channel, sink);
        }

        self.render_frame()
    }

    fn run_local_tick(
        &mut self,
        channel: &mut dyn Channel,
        input: &mut dyn InputSource,
        sink: &mut dyn TraceSink,
    ) {
        let Some(previous) = self.predictor.current().cloned() else {
            return;
        };

        let unit = input.consume_accumulated_inputs();
        let (tick_inputs, packet) = self.sender.add_tick(unit, sink);
        if let Some(bytes) = packet {
            channel.send(&bytes);
        }

        self.prev_local = Some(previous);
        self.predictor.predict(tick_inputs);
    }

    fn run_remote_update(&mut self, channel: &mut dyn Channel, sink: &mut dyn TraceSink) {
        self.receiver.receive_packets(channel.recv(), sink);

        let new_state = self.receiver.maybe_get_new_state(sink);
        self.prev_state = std::mem::take(&mut self.cur_state);
        match new_state {
            Some(state) => {
                self.cur_state = state;
                self.sync_local_player(sink);
            }
            None => self.cur_state = self.prev_state.clone(),
        }

        self.local_dilation = self.receiver.local_time_dilation();
        self.remote_dilation = self.receiver.remote_time_dilation();
        self.sender.ack_seq(self.receiver.acked_input_seq());

        sink.record("client.localDilation", self.local_dilation.into());
        sink.record("client.remoteDilation", self.remote_dilation.into());
    }

    fn sync_local_player(&mut self, sink: &mut dyn TraceSink) {
        let Some(authoritative) = self.cur_state.players.get(&self.player_id) else {
            return;
        };

        if !self.predictor.is_initialized() {
            info!("Initializing local player {} from server state", self.player_id);
            self.predictor.initialize(authoritative.clone());
            self.prev_local = Some(authoritative.clone());
            return;
        }

        match self.predictor.reconcile(authoritative) {
            Reconciliation::Corrected { resimulated, .. } => {
                self.corrections += 1;
                sink.record("client.resimulated", resimulated.into());
            }
            Reconciliation::Confirmed { .. }
            | Reconciliation::NoAncestor { .. }
            | Reconciliation::Unsequenced => {}
        }
        sink.record("client.corrections", self.corrections.into());
        sink.record("client.predictionDepth", self.predictor.len().into());
    }

    fn render_frame(&self) -> Option<RenderFrame<'_>> {
        let cur_local = self.predictor.current()?;
        let prev_local = self.prev_local.as_ref()?;
        Some(RenderFrame {
            player_id: self.player_id,
            prev_state: &self.prev_state,
            cur_state: &self.cur_state,
            remote_alpha: self.remote_acc.fraction(self.remote_update_millis()),
            prev_local,
            cur_local,
            local_alpha: self.local_acc.fraction(self.local_tick_millis()),
        })
    }

    /// Discards all connection-dependent state and tells the server to do
    /// the same with everything it buffered for this client.
    pub fn reset(&mut self, channel: &mut dyn Channel) {
        self.resets += 1;
        self.predictor.clear();
        self.prev_local = None;
        self.local_acc.reset();
        self.remote_acc.reset();
        channel.recv();
        self.sender.reset();
        self.receiver.reset();
    }

    pub fn predicted_local(&self) -> Option<&PlayerState> {
        self.predictor.current()
    }

    pub fn current_state(&self) -> &GameState {
        &self.cur_state
    }

    pub fn sender(&self) -> &InputsSender {
        &self.sender
    }

    pub fn receiver(&self) -> &StateReceiver {
        &self.receiver
    }

    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{loopback_pair, InputsPacket, NullSink, StatePacket, LoopbackChannel};

    struct ScriptedInput(InputsUnit);

    impl InputSource for ScriptedInput {
        fn consume_accumulated_inputs(&mut self) -> InputsUnit {
            self.0
        }
    }

    fn snapshot(tick: u64, player: PlayerState, acked: u64) -> Vec<u8> {
        let mut state = GameState::new();
        state.server_tick = tick;
        state.players.insert(1, player);
        StatePacket::encode(&state, acked, 0).unwrap()
    }

    fn setup() -> (ClientGame, LoopbackChannel, LoopbackChannel, ScriptedInput) {
        let (client_end, server_end) = loopback_pair();
        (
            ClientGame::new(1),
            client_end,
            server_end,
            ScriptedInput(InputsUnit::new(1.0, 0.0, true)),
        )
    }

    #[test]
    fn test_no_ticks_before_first_snapshot() {
        let (mut game, mut channel, mut server, mut input) = setup();
        assert!(game
            .frame(100.0, &mut channel, &mut input, &mut NullSink)
            .is_none());
        assert!(server.recv().is_empty());
        assert_eq!(game.sender().head_seq(), 0);
    }

    #[test]
    fn test_initializes_from_snapshot_and_predicts() {
        let (mut game, mut channel, mut server, mut input) = setup();
        server.send(&snapshot(2, PlayerState::new((400.0, 300.0), 0.0), 0));

        // Two update periods pass; the second one picks up the buffered snapshot.
        let frame = game.frame(2.0 * TICK_MILLIS * 2.0 + 1.0, &mut channel, &mut input, &mut NullSink);
        assert!(frame.is_some());
        assert!(game.predicted_local().is_some());

        game.frame(TICK_MILLIS * 4.0, &mut channel, &mut input, &mut NullSink);
        assert!(game.sender().head_seq() >= 3);
        let predicted = game.predicted_local().unwrap();
        assert!(predicted.pos.0 > 400.0);

        let packets: Vec<InputsPacket> = server
            .recv()
            .iter()
            .map(|bytes| InputsPacket::decode(bytes).unwrap())
            .collect();
        assert!(!packets.is_empty());
        assert!(packets.iter().all(|p| p.seq % 2 == 0));
    }

    #[test]
    fn test_render_fractions_in_unit_range() {
        let (mut game, mut channel, mut server, mut input) = setup();
        server.send(&snapshot(2, PlayerState::new((400.0, 300.0), 0.0), 0));
        game.frame(80.0, &mut channel, &mut input, &mut NullSink);

        for step in [3.0, 7.5, 11.0, 16.0, 1.0] {
            if let Some(frame) = game.frame(step, &mut channel, &mut input, &mut NullSink) {
                assert!((0.0..1.0).contains(&frame.local_alpha));
                assert!((0.0..1.0).contains(&frame.remote_alpha));
                assert_eq!(frame.player_id, 1);
            }
        }
    }

    #[test]
    fn test_acks_flow_from_snapshots_to_sender() {
        let (mut game, mut channel, mut server, mut input) = setup();
        server.send(&snapshot(2, PlayerState::new((400.0, 300.0), 0.0), 0));
        game.frame(80.0, &mut channel, &mut input, &mut NullSink);
        game.frame(80.0, &mut channel, &mut input, &mut NullSink);
        let head = game.sender().head_seq();
        assert!(head > 2);

        server.send(&snapshot(4, PlayerState::new((400.0, 300.0), 0.0), 2));
        game.frame(40.0, &mut channel, &mut input, &mut NullSink);
        assert_eq!(game.sender().acked_seq(), 2);
    }

    #[test]
    fn test_long_gap_resets() {
        let (mut game, mut channel, mut server, mut input) = setup();
        server.send(&snapshot(2, PlayerState::new((400.0, 300.0), 0.0), 0));
        game.frame(80.0, &mut channel, &mut input, &mut NullSink);
        assert!(game.predicted_local().is_some());

        server.send(&snapshot(4, PlayerState::new((400.0, 300.0), 0.0), 0));
        assert!(game
            .frame(DESYNC_GAP_MILLIS + 500.0, &mut channel, &mut input, &mut NullSink)
            .is_none());
        assert!(game.predicted_local().is_none());
        assert_eq!(game.resets(), 1);
        assert_eq!(game.receiver().buffer_len(), 0);

        // The next packet starts with the reset marker.
        server.recv();
        game.frame(0.0, &mut channel, &mut input, &mut NullSink);
        server.send(&snapshot(6, PlayerState::new((410.0, 300.0), 0.0), 0));
        game.frame(80.0, &mut channel, &mut input, &mut NullSink);
        assert!(game.predicted_local().is_some());
        game.frame(80.0, &mut channel, &mut input, &mut NullSink);
        let packets: Vec<InputsPacket> = server
            .recv()
            .iter()
            .map(|bytes| InputsPacket::decode(bytes).unwrap())
            .collect();
        let first = packets.first().unwrap();
        assert_eq!(first.items.last(), Some(&shared::HistoryItem::Reset));
    }
}
