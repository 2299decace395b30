//! Peer table module
//!
//! Indexes peer records by id, deduplicates incoming traffic against known
//! peers and sweeps out peers that have gone silent.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::error::{PeerError, Result};
use crate::peer::guard::DeletionGuard;
use crate::peer::record::{PeerRecord, PeerStats};
use crate::peer::types::PeerType;
use crate::time::{system_clock, Clock};

/// One live slot in the table.
///
/// The table keeps its own handle to the record's deletion guard, so the
/// lock stays valid for any thread blocked on it after the record is gone.
struct PeerEntry {
    guard: DeletionGuard,
    removed: AtomicBool,
    record: Mutex<PeerRecord>,
}

impl PeerEntry {
    fn new(record: PeerRecord) -> Self {
        Self {
            guard: record.deletion_guard().clone(),
            removed: AtomicBool::new(false),
            record: Mutex::new(record),
        }
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

/// Registry of known peers keyed by id
pub struct PeerTable {
    peers: RwLock<HashMap<u16, Arc<PeerEntry>>>,
    next_id: Mutex<u16>,
    clock: Arc<dyn Clock>,
}

impl PeerTable {
    /// Create an empty table using the system clock
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create an empty table; new records read time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            next_id: Mutex::new(0),
            clock,
        }
    }

    /// Return the id of the peer at these addresses, creating it if unknown.
    ///
    /// New peers reachable on identical public and local addresses start on
    /// the local one; voxel servers and mixers start on their public one.
    pub fn add_or_update_peer(
        &self,
        public_socket: Option<SocketAddr>,
        local_socket: Option<SocketAddr>,
        peer_type: PeerType,
    ) -> Result<u16> {
        let mut peers = self.peers.write();

        if let Some(id) = Self::find_in(&peers, public_socket, local_socket, peer_type) {
            trace!("Peer {} already known, skipping", id);
            return Ok(id);
        }

        let id = self.allocate_id(&peers)?;
        let mut record = PeerRecord::with_clock(
            public_socket,
            local_socket,
            peer_type,
            id,
            Arc::clone(&self.clock),
        );

        if public_socket.is_some() && public_socket == local_socket {
            record.activate_local_socket();
        }
        if peer_type.prefers_public_socket() {
            record.activate_public_socket();
        }

        info!("Added peer {} (total: {})", record, peers.len() + 1);
        peers.insert(id, Arc::new(PeerEntry::new(record)));
        Ok(id)
    }

    /// Insert a fully built record under its own id.
    ///
    /// Fails if the id is taken or a live peer already matches the record's
    /// role and addresses.
    pub fn insert(&self, record: PeerRecord) -> Result<u16> {
        let mut peers = self.peers.write();
        let id = record.id();

        if peers.contains_key(&id) {
            warn!("Refusing to add {}: id {} is taken", record, id);
            return Err(PeerError::id_collision(id));
        }

        if let Some(existing) = Self::find_in(
            &peers,
            record.public_socket(),
            record.local_socket(),
            record.peer_type(),
        ) {
            warn!("Refusing to add {}: already known as peer {}", record, existing);
            return Err(PeerError::table_error_with_peer(
                format!("Peer already known as {}", existing),
                id.to_string(),
            ));
        }

        debug!("Inserted peer {} (total: {})", record, peers.len() + 1);
        peers.insert(id, Arc::new(PeerEntry::new(record)));
        Ok(id)
    }

    /// Id of the peer matching these addresses and role
    pub fn find_matching(
        &self,
        public_socket: Option<SocketAddr>,
        local_socket: Option<SocketAddr>,
        peer_type: PeerType,
    ) -> Option<u16> {
        let peers = self.peers.read();
        Self::find_in(&peers, public_socket, local_socket, peer_type)
    }

    /// Run `f` against a live peer while holding its deletion guard.
    ///
    /// Returns `None` if the peer is unknown or was removed while we waited.
    /// `f` must not call back into the table: a concurrent writer can hold the
    /// table lock while waiting on this record, and the nested call deadlocks.
    pub fn with_peer<R>(&self, id: u16, f: impl FnOnce(&PeerRecord) -> R) -> Option<R> {
        let entry = self.entry(id)?;
        let _held = entry.guard.lock();
        if entry.is_removed() {
            trace!("Peer {} removed before read", id);
            return None;
        }
        let record = entry.record.lock();
        Some(f(&*record))
    }

    /// Mutable counterpart of [`PeerTable::with_peer`].
    ///
    /// The same rule applies: `f` must not call back into the table.
    pub fn with_peer_mut<R>(&self, id: u16, f: impl FnOnce(&mut PeerRecord) -> R) -> Option<R> {
        let entry = self.entry(id)?;
        let _held = entry.guard.lock();
        if entry.is_removed() {
            trace!("Peer {} removed before update", id);
            return None;
        }
        let mut record = entry.record.lock();
        Some(f(&mut *record))
    }

    /// Independent copy of a peer's record
    pub fn snapshot(&self, id: u16) -> Option<PeerRecord> {
        self.with_peer(id, |record| record.clone())
    }

    /// Remove a peer, waiting for in-flight readers to finish
    pub fn remove_peer(&self, id: u16) -> bool {
        let Some(entry) = self.entry(id) else {
            warn!("Attempted to remove peer {} but it is not in the table", id);
            return false;
        };

        let _held = entry.guard.lock();
        self.retire(id, &entry)
    }

    /// Remove every peer silent for longer than `silence_threshold`.
    ///
    /// Peers whose guard is held by a reader are skipped and retried on the
    /// next sweep. Returns the removed ids.
    pub fn remove_silent_peers(&self, silence_threshold: Duration) -> Vec<u16> {
        let now = self.clock.now_usecs();
        let threshold = silence_threshold.as_micros() as u64;

        let candidates: Vec<(u16, Arc<PeerEntry>)> = {
            let peers = self.peers.read();
            peers
                .iter()
                .filter(|(_, entry)| entry.record.lock().silence_usecs(now) > threshold)
                .map(|(id, entry)| (*id, Arc::clone(entry)))
                .collect()
        };

        let mut removed = Vec::new();
        for (id, entry) in candidates {
            let Some(_held) = entry.guard.try_lock() else {
                debug!("Peer {} is busy, deferring removal", id);
                continue;
            };

            // Packets may have arrived since the scan.
            if entry.record.lock().silence_usecs(now) <= threshold {
                continue;
            }

            if self.retire(id, &entry) {
                removed.push(id);
            }
        }

        if !removed.is_empty() {
            info!("Removed {} silent peers (remaining: {})", removed.len(), self.len());
        }
        removed
    }

    /// Number of live peers
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Ids of all live peers, ascending
    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.peers.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Statistics for every live peer, ordered by id
    pub fn stats(&self) -> Vec<PeerStats> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.with_peer(id, |record| record.stats()))
            .collect()
    }

    /// Emit one log line per peer
    pub fn log_peers(&self) {
        for id in self.ids() {
            self.with_peer(id, |record| info!("{}", record));
        }
    }

    fn entry(&self, id: u16) -> Option<Arc<PeerEntry>> {
        self.peers.read().get(&id).cloned()
    }

    /// Mark an entry dead and unlink it. Caller holds the entry's guard.
    fn retire(&self, id: u16, entry: &Arc<PeerEntry>) -> bool {
        if entry.removed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let mut peers = self.peers.write();
        if peers.get(&id).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            peers.remove(&id);
        }
        info!("Removed peer {} (remaining: {})", id, peers.len());
        true
    }

    fn find_in(
        peers: &HashMap<u16, Arc<PeerEntry>>,
        public_socket: Option<SocketAddr>,
        local_socket: Option<SocketAddr>,
        peer_type: PeerType,
    ) -> Option<u16> {
        peers
            .iter()
            .find(|(_, entry)| {
                !entry.is_removed()
                    && entry.record.lock().matches(public_socket, local_socket, peer_type)
            })
            .map(|(id, _)| *id)
    }

    fn allocate_id(&self, peers: &HashMap<u16, Arc<PeerEntry>>) -> Result<u16> {
        let mut next_id = self.next_id.lock();
        for _ in 0..=u16::MAX as u32 {
            let candidate = *next_id;
            *next_id = next_id.wrapping_add(1);
            if !peers.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(PeerError::table_error("Peer table full, no free id"))
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}
