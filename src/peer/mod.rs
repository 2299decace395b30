//! Peer module
//!
//! Peer records and the table that owns them.

pub mod address;
pub mod bandwidth;
pub mod guard;
pub mod payload;
pub mod record;
pub mod table;
pub mod types;

// Re-export main types
pub use address::{socket_match, ActiveSocket, AddressPair};
pub use bandwidth::MovingAverage;
pub use guard::DeletionGuard;
pub use payload::{PayloadSlot, PeerData};
pub use record::{PeerRecord, PeerStats};
pub use table::PeerTable;
pub use types::PeerType;
