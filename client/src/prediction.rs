//! Local prediction with rollback.
//!
//! The local player is simulated immediately with every tick's input. When an
//! authoritative snapshot arrives, it is compared with the prediction made for
//! the same input sequence; on a mismatch that entry is overwritten with the
//! server's version and every later entry is re-simulated from it.

use log::{debug, warn};
use shared::{simulate, PlayerState, TickInputs};
use std::collections::VecDeque;

pub const HISTORY_CAPACITY: usize = 200;

/// Squared per-axis position error tolerated before a correction.
pub const DIVERGENCE_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionEntry {
    pub inputs: TickInputs,
    pub state: PlayerState,
}

/// Outcome of [`Predictor::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The snapshot was built from extrapolated input and cannot be matched.
    Unsequenced,
    /// The matching prediction already fell out of the history.
    NoAncestor { seq: u64 },
    Confirmed { seq: u64 },
    Corrected { seq: u64, resimulated: usize },
}

#[derive(Debug, Clone)]
pub struct Predictor {
    /// Newest first.
    history: VecDeque<PredictionEntry>,
    capacity: usize,
}

impl Predictor {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Restarts prediction from an authoritative state.
    pub fn initialize(&mut self, state: PlayerState) {
        self.history.clear();
        self.history.push_front(PredictionEntry {
            inputs: TickInputs::default(),
            state,
        });
    }

    pub fn is_initialized(&self) -> bool {
        !self.history.is_empty()
    }

    /// Simulates one tick ahead. Returns `None` until initialized.
    pub fn predict(&mut self, inputs: TickInputs) -> Option<&PlayerState> {
        let next = simulate(&self.history.front()?.state, &inputs);
        self.history.push_front(PredictionEntry {
            inputs,
            state: next,
        });
        self.history.truncate(self.capacity);
        self.current()
    }

    pub fn reconcile(&mut self, authoritative: &PlayerState) -> Reconciliation {
        let seq = match authoritative.latest_input_seq {
            Some(seq) => seq,
            None => return Reconciliation::Unsequenced,
        };

        let index = match self
            .history
            .iter()
            .position(|entry| entry.state.latest_input_seq == Some(seq))
        {
            Some(index) => index,
            None => {
                warn!("No prediction for input seq {}, skipping correction", seq);
                return Reconciliation::NoAncestor { seq };
            }
        };

        self.history.truncate(index + 1);

        let predicted = &self.history[index].state;
        let dx = authoritative.pos.0 - predicted.pos.0;
        let dy = authoritative.pos.1 - predicted.pos.1;
        if dx * dx <= DIVERGENCE_EPSILON && dy * dy <= DIVERGENCE_EPSILON {
            return Reconciliation::Confirmed { seq };
        }

        self.history[index].state = authoritative.clone();
        for i in (0..index).rev() {
            let next = simulate(&self.history[i + 1].state, &self.history[i].inputs);
            self.history[i].state = next;
        }

        debug!(
            "Corrected prediction at seq {} by ({:.3}, {:.3}), resimulated {} ticks",
            seq, dx, dy, index
        );
        Reconciliation::Corrected {
            seq,
            resimulated: index,
        }
    }

    /// Newest predicted state.
    pub fn current(&self) -> Option<&PlayerState> {
        self.history.front().map(|entry| &entry.state)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PredictionEntry> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new()
    }
}
