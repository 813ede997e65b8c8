/// Control input accumulated over one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputsUnit {
    pub mouse_delta: (f64, f64),
    pub clicking: bool,
}

impl InputsUnit {
    pub fn new(dx: f64, dy: f64, clicking: bool) -> Self {
        Self {
            mouse_delta: (dx, dy),
            clicking,
        }
    }

    /// Merges two samples: mouse deltas add up, a click in either wins.
    pub fn combine(&self, other: &InputsUnit) -> InputsUnit {
        InputsUnit {
            mouse_delta: (
                self.mouse_delta.0 + other.mouse_delta.0,
                self.mouse_delta.1 + other.mouse_delta.1,
            ),
            clicking: self.clicking || other.clicking,
        }
    }

    pub fn accumulate(&mut self, other: &InputsUnit) {
        *self = self.combine(other);
    }
}

/// Inputs applied to a single simulation tick.
///
/// `seq` is the client-assigned input sequence; `None` marks a sample the
/// server extrapolated while it had nothing real to apply.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickInputs {
    pub seq: Option<u64>,
    pub inputs: InputsUnit,
}

impl TickInputs {
    pub fn confirmed(seq: u64, inputs: InputsUnit) -> Self {
        Self {
            seq: Some(seq),
            inputs,
        }
    }

    pub fn guessed(inputs: InputsUnit) -> Self {
        Self { seq: None, inputs }
    }

    pub fn is_guessed(&self) -> bool {
        self.seq.is_none()
    }
}

/// One slot of the input retransmission history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistoryItem {
    Sample(InputsUnit),
    /// Discontinuity marker: everything the peer buffered before it is void.
    Reset,
}
