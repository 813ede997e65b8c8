//! # Game Server Library
//!
//! This library provides the authoritative side of the rollback netcode. It
//! owns the canonical game state, rebuilds each client's input stream from
//! redundant, lossy datagrams, steps the deterministic simulation at a fixed
//! rate and streams snapshots back to every client.
//!
//! ## Core Responsibilities
//!
//! ### Input Reconstruction
//! Every client retransmits all inputs the server has not acknowledged yet.
//! The [`inputs::InputsReceiver`] keeps a per-client jitter buffer, adapts its
//! size to the observed jitter, extrapolates when the client falls silent
//! and pays the extrapolated ticks back once real inputs arrive.
//!
//! ### Authoritative Simulation
//! [`game::ServerGame`] advances the world at 60 ticks per second using the
//! exact simulation step the clients use for prediction.
//!
//! ### State Broadcasting
//! Every second tick [`broadcast::StateBroadcaster`] sends each client the
//! full snapshot together with the highest input sequence received from that
//! client and a time dilation hint that steers the client's input rate
//! towards the server's buffer target.
//!
//! ## Module Organization
//!
//! - `inputs`: per-client input reconstruction
//! - `client_manager`: connection registry, ids, timeouts
//! - `broadcast`: per-recipient snapshot packets
//! - `game`: transport-agnostic game loop, desync handling
//! - `network`: UDP socket, handshake, tokio event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", 32, Duration::from_secs(5)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The game loop itself does not know about sockets. Anything implementing
//! [`shared::Channel`] can be plugged in, which is how the integration tests
//! drive it over in-memory loopback channels:
//!
//! ```rust
//! use server::game::ServerGame;
//! use shared::{loopback_pair, NullSink};
//!
//! let mut game = ServerGame::with_seed(4, 7);
//! let (server_end, _client_end) = loopback_pair();
//! let player = game.add_player(server_end).unwrap();
//! game.frame(100.0, &mut NullSink);
//! assert!(game.state().players.contains_key(&player));
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod game;
pub mod inputs;
pub mod network;
