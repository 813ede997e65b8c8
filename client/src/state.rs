//! Client-side reception of server snapshots.
//!
//! Snapshots arrive unordered and possibly duplicated. They are kept sorted
//! by server tick in a jitter buffer, consumed one per remote update, and the
//! buffer's occupancy tells the server how fast to run this client's clock.

use log::{debug, warn};
use shared::{
    time_dilation, BufferSizeController, GameState, StatePacket, TimeDilation, TraceSink,
};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct StateReceiver {
    local_time_dilation: TimeDilation,
    acked_input_seq: u64,
    buffer: VecDeque<GameState>,
    controller: BufferSizeController,
    newest_consumed_tick: Option<u64>,
    newest_seen_tick: Option<u64>,
}

impl StateReceiver {
    pub fn new() -> Self {
        Self::with_controller(BufferSizeController::default())
    }

    pub fn with_controller(controller: BufferSizeController) -> Self {
        Self {
            local_time_dilation: 0,
            acked_input_seq: 0,
            buffer: VecDeque::new(),
            controller,
            newest_consumed_tick: None,
            newest_seen_tick: None,
        }
    }

    pub fn receive_packets(&mut self, packets: Vec<Vec<u8>>, sink: &mut dyn TraceSink) {
        if packets.is_empty() {
            return;
        }

        let mut states: Vec<GameState> = self.buffer.drain(..).collect();

        for bytes in packets {
            sink.record("state.packetSize", bytes.len().into());
            let packet = match StatePacket::decode(&bytes) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Dropping malformed state packet: {}", e);
                    continue;
                }
            };

            let tick = packet.state.server_tick;
            if self.newest_seen_tick.map_or(true, |seen| tick > seen) {
                self.newest_seen_tick = Some(tick);
                self.acked_input_seq = packet.acked_input_seq;
                self.local_time_dilation = packet.client_time_dilation;
            }
            states.push(packet.state);
        }

        states.sort_by_key(|state| state.server_tick);
        states.dedup_by_key(|state| state.server_tick);
        if let Some(consumed) = self.newest_consumed_tick {
            states.retain(|state| state.server_tick > consumed);
        }
        self.buffer = states.into();
    }

    /// Pops the oldest buffered snapshot, if any.
    pub fn maybe_get_new_state(&mut self, sink: &mut dyn TraceSink) -> Option<GameState> {
        self.controller.record_sample(self.buffer.len());

        sink.record("state.bufferSize", self.buffer.len().into());
        sink.record("state.targetSize", self.controller.target().into());

        let state = self.buffer.pop_front()?;
        self.newest_consumed_tick = Some(state.server_tick);
        Some(state)
    }

    /// Dilation the server asked this client to apply to its input ticks.
    pub fn local_time_dilation(&self) -> TimeDilation {
        self.local_time_dilation
    }

    /// Dilation applied to snapshot consumption to keep the buffer at target.
    pub fn remote_time_dilation(&self) -> TimeDilation {
        time_dilation(i64::from(self.controller.target()) - self.buffer.len() as i64 - 1)
    }

    pub fn acked_input_seq(&self) -> u64 {
        self.acked_input_seq
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn target(&self) -> u32 {
        self.controller.target()
    }

    pub fn newest_consumed_tick(&self) -> Option<u64> {
        self.newest_consumed_tick
    }

    /// Drops buffered snapshots and restarts buffer sizing. Snapshots at or
    /// before the last consumed tick stay rejected.
    pub fn reset(&mut self) {
        debug!("State buffer reset with {} snapshots pending", self.buffer.len());
        self.buffer.clear();
        self.controller.reset();
    }
}

impl Default for StateReceiver {
    fn default() -> Self {
        Self::new()
    }
}
