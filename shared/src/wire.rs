//! JSON wire encoding.
//!
//! Inputs packet: `[latestSeq, ...items]`, items newest first, each either the
//! reset tag `0` or `[clickFlag, dx, dy]`.
//!
//! State packet: `[GameState, ackedInputSeq, clientTimeDilation]`.
//!
//! Handshake traffic ([`ControlMessage`]) shares the socket; it is always a
//! JSON object or string, so it can never be mistaken for one of the arrays
//! above.

use crate::inputs::{HistoryItem, InputsUnit};
use crate::state::{GameState, PlayerId};
use crate::TimeDilation;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const RESET_TAG: u64 = 0;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown history tag {0}")]
    InvalidTag(u64),
    #[error("click flag must be 0 or 1, got {0}")]
    InvalidClickFlag(u64),
}

impl Serialize for HistoryItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HistoryItem::Reset => serializer.serialize_u64(RESET_TAG),
            HistoryItem::Sample(unit) => (
                u8::from(unit.clicking),
                unit.mouse_delta.0,
                unit.mouse_delta.1,
            )
                .serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawItem {
    Tag(u64),
    Sample(u64, f64, f64),
}

impl TryFrom<RawItem> for HistoryItem {
    type Error = WireError;

    fn try_from(raw: RawItem) -> Result<Self, Self::Error> {
        match raw {
            RawItem::Tag(RESET_TAG) => Ok(HistoryItem::Reset),
            RawItem::Tag(other) => Err(WireError::InvalidTag(other)),
            RawItem::Sample(flag, dx, dy) => {
                let clicking = match flag {
                    0 => false,
                    1 => true,
                    other => return Err(WireError::InvalidClickFlag(other)),
                };
                Ok(HistoryItem::Sample(InputsUnit::new(dx, dy, clicking)))
            }
        }
    }
}

impl<'de> Deserialize<'de> for HistoryItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawItem::deserialize(deserializer)?;
        HistoryItem::try_from(raw).map_err(de::Error::custom)
    }
}

/// Redundant input packet: the sequence of the newest item followed by every
/// not-yet-acknowledged item, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct InputsPacket {
    pub seq: u64,
    pub items: Vec<HistoryItem>,
}

impl InputsPacket {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl Serialize for InputsPacket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len() + 1))?;
        seq.serialize_element(&self.seq)?;
        for item in &self.items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for InputsPacket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PacketVisitor;

        impl<'de> Visitor<'de> for PacketVisitor {
            type Value = InputsPacket;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array [latestSeq, ...items]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let seq = access
                    .next_element::<u64>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(item) = access.next_element::<HistoryItem>()? {
                    items.push(item);
                }
                Ok(InputsPacket { seq, items })
            }
        }

        deserializer.deserialize_seq(PacketVisitor)
    }
}

/// Per-recipient server update.
#[derive(Debug, Clone, PartialEq)]
pub struct StatePacket {
    pub state: GameState,
    pub acked_input_seq: u64,
    pub client_time_dilation: TimeDilation,
}

impl StatePacket {
    /// Encodes without taking ownership of the shared snapshot.
    pub fn encode(
        state: &GameState,
        acked_input_seq: u64,
        client_time_dilation: TimeDilation,
    ) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(&(
            state,
            acked_input_seq,
            client_time_dilation,
        ))?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let (state, acked_input_seq, dilation): (GameState, u64, i64) =
            serde_json::from_slice(bytes)?;
        Ok(StatePacket {
            state,
            acked_input_seq,
            client_time_dilation: crate::time_dilation(dilation),
        })
    }
}

/// Connection management messages exchanged outside the sync protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlMessage {
    Connect { client_version: u32 },
    Connected { player_id: PlayerId },
    Disconnect,
    Disconnected { reason: String },
}

impl ControlMessage {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns `None` for anything that is not a control message, which
    /// includes every protocol packet.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}
