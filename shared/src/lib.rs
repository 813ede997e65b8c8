//! Types and algorithms shared by the server and the client: the input/state
//! data model, the deterministic simulation step, the adaptive jitter-buffer
//! controller, the JSON wire codec, the transport abstraction and the trace
//! sink.

pub mod buffer;
pub mod inputs;
pub mod simulation;
pub mod state;
pub mod trace;
pub mod transport;
pub mod wire;

pub use buffer::{BufferControllerConfig, BufferSizeController};
pub use inputs::{HistoryItem, InputsUnit, TickInputs};
pub use simulation::{simulate, tick_player, TickAccumulator};
pub use state::{lerp_angle, GameState, PlayerId, PlayerState};
pub use trace::{LogSink, MemorySink, NullSink, TraceSink, TraceValue};
pub use transport::{loopback_pair, Channel, ImpairedChannel, ImpairmentConfig, LoopbackChannel};
pub use wire::{ControlMessage, InputsPacket, StatePacket, WireError};

pub const WORLD_WIDTH: f64 = 1024.0;
pub const WORLD_HEIGHT: f64 = 768.0;
pub const PLAYER_RADIUS: f64 = 26.0;

pub const TICKS_PER_SECOND: u64 = 60;
pub const TICK_MILLIS: f64 = 1000.0 / TICKS_PER_SECOND as f64;
pub const TICKS_PER_SERVER_UPDATE: u64 = 2;

/// Wall-clock gap between two frames after which a side assumes it has lost
/// sync with its peer and hard-resets.
pub const DESYNC_GAP_MILLIS: f64 = 1000.0;

pub const PROTOCOL_VERSION: u32 = 1;

/// Signed adjustment (in milliseconds) applied to a tick period to steer a
/// remote buffer towards its target occupancy. Always -1, 0 or 1.
pub type TimeDilation = i8;

/// Collapses a signed buffer error into a [`TimeDilation`].
pub fn time_dilation(error: i64) -> TimeDilation {
    error.signum() as TimeDilation
}
