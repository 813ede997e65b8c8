//! Connection registry for the multiplayer server
//!
//! This module owns everything the server keeps per connected player:
//! - Connection lifecycle (admit, remove, timeout)
//! - The player's transport channel
//! - The player's inputs receiver, which reconstructs their input stream
//! - Liveness tracking for silent clients
//!
//! The registry is owned by the game loop and is never shared, so no locking
//! is involved anywhere.

use crate::inputs::InputsReceiver;
use log::info;
use shared::{Channel, PlayerId};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// One admitted player.
#[derive(Debug)]
pub struct Connection<C> {
    /// Player identifier assigned on admission
    pub id: PlayerId,
    /// Transport used for both directions
    pub channel: C,
    /// Reconstructed input stream for this player
    pub inputs: InputsReceiver,
    /// Last time any datagram arrived from this player
    pub last_seen: Instant,
}

impl<C> Connection<C> {
    pub fn new(id: PlayerId, channel: C) -> Self {
        Self {
            id,
            channel,
            inputs: InputsReceiver::new(id),
            last_seen: Instant::now(),
        }
    }

    /// Marks the connection as alive.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has been heard within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All live connections, iterated in player id order.
///
/// Ids start at 1 and are never reused within a server run, so a stale
/// datagram can never be attributed to a newer player.
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    connections: BTreeMap<PlayerId, Connection<C>>,
    next_player_id: PlayerId,
    max_clients: usize,
}

impl<C: Channel> ConnectionRegistry<C> {
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_player_id: 1,
            max_clients,
        }
    }

    /// Admits a new connection, or returns `None` when the server is full.
    pub fn add(&mut self, channel: C) -> Option<PlayerId> {
        if self.connections.len() >= self.max_clients {
            return None;
        }

        let id = self.next_player_id;
        self.next_player_id += 1;
        self.connections.insert(id, Connection::new(id, channel));
        info!("Player {} connected", id);

        Some(id)
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Connection<C>> {
        let removed = self.connections.remove(&id);
        if removed.is_some() {
            info!("Player {} disconnected", id);
        }
        removed
    }

    pub fn get(&self, id: PlayerId) -> Option<&Connection<C>> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Connection<C>> {
        self.connections.get_mut(&id)
    }

    /// First connection matching `pred`, e.g. by remote address.
    pub fn find_by<F>(&self, mut pred: F) -> Option<PlayerId>
    where
        F: FnMut(&Connection<C>) -> bool,
    {
        self.connections
            .values()
            .find(|connection| pred(connection))
            .map(|connection| connection.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection<C>> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection<C>> {
        self.connections.values_mut()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.connections.keys().copied().collect()
    }

    /// Ids of connections silent for longer than `timeout`. Removal is left
    /// to the caller so the game state can be cleaned up alongside.
    pub fn timed_out(&self, timeout: Duration) -> Vec<PlayerId> {
        self.connections
            .values()
            .filter(|connection| connection.is_timed_out(timeout))
            .map(|connection| connection.id)
            .collect()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
