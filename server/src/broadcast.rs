use crate::client_manager::ConnectionRegistry;
use log::error;
use shared::{Channel, GameState, StatePacket, TraceSink, TICKS_PER_SERVER_UPDATE};

/// Sends the full snapshot to every connection on update ticks.
///
/// Each recipient gets its own packet because the ack and the time dilation
/// come from that connection's inputs receiver.
#[derive(Debug, Clone, Copy)]
pub struct StateBroadcaster {
    ticks_per_update: u64,
}

impl StateBroadcaster {
    pub fn new(ticks_per_update: u64) -> Self {
        Self {
            ticks_per_update: ticks_per_update.max(1),
        }
    }

    pub fn is_update_tick(&self, server_tick: u64) -> bool {
        server_tick % self.ticks_per_update == 0
    }

    /// Returns how many packets were handed to channels.
    pub fn broadcast<C: Channel>(
        &self,
        state: &GameState,
        registry: &mut ConnectionRegistry<C>,
        sink: &mut dyn TraceSink,
    ) -> usize {
        let mut sent = 0;
        for connection in registry.iter_mut() {
            let acked = connection.inputs.acked_seq();
            let dilation = connection.inputs.client_time_dilation();
            match StatePacket::encode(state, acked, dilation) {
                Ok(bytes) => {
                    connection.channel.send(&bytes);
                    sent += 1;
                }
                Err(e) => error!("Failed to encode state for player {}: {}", connection.id, e),
            }
        }
        sink.record("broadcast.recipients", sent.into());
        sent
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new(TICKS_PER_SERVER_UPDATE)
    }
}
