//! Server-side reconstruction of one client's input stream.
//!
//! Clients retransmit every input the server has not acknowledged yet, so a
//! single packet that makes it through fills all the gaps left by the ones
//! that were lost. The receiver turns that redundant, unordered stream back
//! into exactly one `TickInputs` per simulation tick:
//!
//! - new inputs queue up in a jitter buffer sized by a [`BufferSizeController`];
//! - when the buffer runs dry the previous input is held (mouse delta zeroed)
//!   and the receiver counts how many ticks it has guessed;
//! - once real inputs arrive again, the guessed ticks are paid back by folding
//!   surplus buffered inputs together, so the client catches up instead of
//!   lagging further behind.

use log::{debug, warn};
use shared::{
    time_dilation, BufferSizeController, HistoryItem, InputsPacket, InputsUnit, PlayerId,
    TickInputs, TimeDilation, TraceSink, TraceValue, TICKS_PER_SECOND,
};
use std::collections::VecDeque;

/// Outcome of feeding one datagram to an [`InputsReceiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    /// The packet advanced the ack boundary.
    Accepted { new_ticks: usize, reset: bool },
    /// Nothing newer than what was already acknowledged.
    Stale,
    Malformed,
}

#[derive(Debug)]
pub struct InputsReceiver {
    player_id: PlayerId,
    acked_seq: u64,
    buffer: VecDeque<TickInputs>,
    current: TickInputs,
    catch_up: Option<InputsUnit>,
    guessed: u64,
    confirmed: bool,
    controller: BufferSizeController,
}

impl InputsReceiver {
    pub fn new(player_id: PlayerId) -> Self {
        Self::with_controller(player_id, BufferSizeController::default())
    }

    pub fn with_controller(player_id: PlayerId, controller: BufferSizeController) -> Self {
        Self {
            player_id,
            acked_seq: 0,
            buffer: VecDeque::new(),
            current: TickInputs::default(),
            catch_up: None,
            guessed: 0,
            confirmed: false,
            controller,
        }
    }

    pub fn receive_packet(&mut self, bytes: &[u8], sink: &mut dyn TraceSink) -> Receipt {
        let packet = match InputsPacket::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Player {}: dropping malformed inputs packet: {}", self.player_id, e);
                return Receipt::Malformed;
            }
        };

        if packet.seq <= self.acked_seq {
            return Receipt::Stale;
        }

        let take = (packet.seq - self.acked_seq).min(packet.items.len() as u64) as usize;
        let mut reset = false;
        let mut new_ticks = 0;

        for index in (0..take).rev() {
            let seq = packet.seq - index as u64;
            match packet.items[index] {
                HistoryItem::Sample(unit) => {
                    self.buffer.push_back(TickInputs::confirmed(seq, unit));
                    new_ticks += 1;
                }
                HistoryItem::Reset => {
                    self.discard_pending();
                    reset = true;
                    new_ticks = 0;
                    debug!("Player {}: inputs reset at seq {}", self.player_id, seq);
                }
            }
        }

        self.acked_seq = packet.seq;
        sink.record("inputs.ackedSeq", self.acked_seq.into());

        Receipt::Accepted { new_ticks, reset }
    }

    /// Selects the inputs for the next simulation tick.
    pub fn tick(&mut self, sink: &mut dyn TraceSink) {
        while self.buffer.len() > 1 && self.guessed > 0 {
            if let Some(surplus) = self.buffer.pop_front() {
                self.catch_up = Some(match self.catch_up {
                    Some(acc) => acc.combine(&surplus.inputs),
                    None => surplus.inputs,
                });
                self.guessed -= 1;
            }
        }

        self.controller.record_sample(self.buffer.len());

        if let Some(mut next) = self.buffer.pop_front() {
            if let Some(acc) = self.catch_up.take() {
                next.inputs = acc.combine(&next.inputs);
            }
            if !self.confirmed {
                debug!("Player {}: inputs confirmed at seq {:?}", self.player_id, next.seq);
                self.confirmed = true;
            }
            self.current = next;
        } else if self.confirmed {
            self.guessed += 1;
            let clicking = self.current.inputs.clicking && self.guessed <= TICKS_PER_SECOND;
            self.current = TickInputs::guessed(InputsUnit::new(0.0, 0.0, clicking));
        }

        sink.record("inputs.bufferSize", self.buffer.len().into());
        sink.record("inputs.targetSize", self.controller.target().into());
        sink.record("inputs.guessed", TraceValue::from(self.guessed));
        sink.record("inputs.confirmed", self.confirmed.into());
    }

    pub fn current_inputs(&self) -> TickInputs {
        self.current
    }

    /// Highest input sequence received so far.
    pub fn acked_seq(&self) -> u64 {
        self.acked_seq
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn target(&self) -> u32 {
        self.controller.target()
    }

    /// Ticks extrapolated and not yet paid back.
    pub fn guessed(&self) -> u64 {
        self.guessed
    }

    /// Positive when the client should slow down, negative when it should
    /// speed up.
    pub fn client_time_dilation(&self) -> TimeDilation {
        time_dilation(self.buffer.len() as i64 - i64::from(self.controller.target()) + 1)
    }

    /// Forgets everything buffered. The ack boundary survives so that
    /// retransmissions from before the reset are still recognised as stale.
    pub fn reset(&mut self) {
        self.discard_pending();
        self.controller.reset();
    }

    fn discard_pending(&mut self) {
        self.buffer.clear();
        self.catch_up = None;
        self.guessed = 0;
        self.current = TickInputs::default();
        if self.confirmed {
            debug!("Player {}: inputs unconfirmed", self.player_id);
        }
        self.confirmed = false;
    }
}
