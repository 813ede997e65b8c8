//! # Game Client Library
//!
//! This library provides the client side of the rollback netcode: it captures
//! mouse input, predicts the local player immediately, streams inputs to the
//! server with redundancy and reconciles its prediction whenever an
//! authoritative snapshot arrives.
//!
//! ## Architecture Overview
//!
//! ### Redundant Input Streaming
//! [`inputs_sender::InputsSender`] keeps every input the server has not
//! acknowledged yet and resends all of them in each packet, so a single
//! delivered packet repairs any number of earlier losses.
//!
//! ### Client-Side Prediction
//! [`prediction::Predictor`] applies each local input through the shared
//! simulation step the moment it is sampled and remembers the input together
//! with the state it produced.
//!
//! ### Rollback Reconciliation
//! Snapshots carry the sequence of the last input the server consumed for
//! this player. If the server's player state differs from the prediction
//! stored for that sequence, the predictor restarts from the authoritative
//! state and replays every newer input.
//!
//! ### Adaptive Buffering and Time Dilation
//! [`state::StateReceiver`] buffers snapshots against network jitter and
//! derives two clock adjustments from buffer occupancy: one for the local
//! input rate (requested by the server) and one for the remote playback rate.
//!
//! ## Module Organization
//!
//! - `game`: frame loop, dual accumulators, desync reset
//! - `inputs_sender`: unacknowledged input history, packet building
//! - `state`: snapshot jitter buffer
//! - `prediction`: predicted history and rollback
//! - `network`: UDP handshake and non-blocking channel
//! - `input`: mouse capture (macroquad)
//! - `rendering`: world and player drawing (macroquad)
//! - `overlay`: buffer statistics and graph (macroquad)
//!
//! ## Usage Example
//!
//! The frame loop only needs a [`shared::Channel`] and an
//! [`game::InputSource`], so it runs just as well headless:
//!
//! ```rust
//! use client::game::{ClientGame, InputSource};
//! use shared::{loopback_pair, InputsUnit, NullSink};
//!
//! struct Still;
//!
//! impl InputSource for Still {
//!     fn consume_accumulated_inputs(&mut self) -> InputsUnit {
//!         InputsUnit::default()
//!     }
//! }
//!
//! let (mut channel, _server_end) = loopback_pair();
//! let mut game = ClientGame::new(1);
//!
//! // Nothing to predict until the first snapshot arrives.
//! assert!(game.frame(16.0, &mut channel, &mut Still, &mut NullSink).is_none());
//! ```

pub mod game;
pub mod input;
pub mod inputs_sender;
pub mod network;
pub mod overlay;
pub mod prediction;
pub mod rendering;
pub mod state;
