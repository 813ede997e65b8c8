//! Redundant input transmission.
//!
//! Every tick's input gets the next sequence number and goes to the front of
//! a history. Every second tick, a packet carries the whole history down to
//! the last sequence the server acknowledged, so any single packet that gets
//! through repairs all earlier losses.

use log::{debug, error};
use shared::{HistoryItem, InputsPacket, InputsUnit, TickInputs, TraceSink};
use std::collections::VecDeque;

pub const HISTORY_CAPACITY: usize = 256;
pub const TICKS_PER_PACKET: u64 = 2;

#[derive(Debug, Clone)]
pub struct InputsSender {
    /// Newest first; item `i` carries sequence `head_seq - i`.
    history: VecDeque<HistoryItem>,
    head_seq: u64,
    acked_seq: u64,
    capacity: usize,
}

impl InputsSender {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            head_seq: 0,
            acked_seq: 0,
            capacity: capacity.max(1),
        }
    }

    /// Records one tick of input. Returns the sequenced inputs for local
    /// prediction and, on every second tick, the packet to send.
    pub fn add_tick(
        &mut self,
        unit: InputsUnit,
        sink: &mut dyn TraceSink,
    ) -> (TickInputs, Option<Vec<u8>>) {
        self.head_seq += 1;
        self.history.push_front(HistoryItem::Sample(unit));
        self.history.truncate(self.capacity);

        let tick_inputs = TickInputs::confirmed(self.head_seq, unit);
        if self.head_seq % TICKS_PER_PACKET != 0 {
            return (tick_inputs, None);
        }

        let unacked = (self.head_seq - self.acked_seq) as usize;
        let packet = InputsPacket {
            seq: self.head_seq,
            items: self.history.iter().take(unacked).copied().collect(),
        };

        sink.record("sender.headSeq", self.head_seq.into());
        sink.record("sender.ackedSeq", self.acked_seq.into());
        sink.record("sender.packetItems", packet.items.len().into());

        match packet.encode() {
            Ok(bytes) => (tick_inputs, Some(bytes)),
            Err(e) => {
                error!("Failed to encode inputs packet {}: {}", self.head_seq, e);
                (tick_inputs, None)
            }
        }
    }

    /// Advances the ack boundary. Older or duplicate acks are ignored.
    pub fn ack_seq(&mut self, seq: u64) {
        let seq = seq.min(self.head_seq);
        if seq <= self.acked_seq {
            return;
        }
        self.acked_seq = seq;
        self.history.truncate((self.head_seq - seq) as usize);
    }

    /// Replaces the history with a reset marker that the server will apply
    /// before any input that follows.
    pub fn reset(&mut self) {
        self.head_seq += 1;
        self.history.clear();
        self.history.push_front(HistoryItem::Reset);
        debug!("Inputs history reset at seq {}", self.head_seq);
    }

    pub fn head_seq(&self) -> u64 {
        self.head_seq
    }

    pub fn acked_seq(&self) -> u64 {
        self.acked_seq
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl Default for InputsSender {
    fn default() -> Self {
        Self::new()
    }
}
