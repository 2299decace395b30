//! simnet-peers
//!
//! Peer identity records for a real-time simulation backend: addressing and
//! NAT path selection, per-peer payloads, bandwidth estimates and safe
//! removal of silent peers.

pub mod peer;
pub mod dispatch;
pub mod time;
pub mod cli;
pub mod error;

pub use error::{PeerError, Result};

pub use peer::{
    socket_match, ActiveSocket, AddressPair, DeletionGuard, MovingAverage,
    PayloadSlot, PeerData, PeerRecord, PeerStats, PeerTable, PeerType,
};
pub use dispatch::{PacketDispatcher, PayloadFactory};
pub use time::{Clock, ManualClock, SystemClock};
pub use cli::{CliArgs, Config};
