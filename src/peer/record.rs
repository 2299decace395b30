//! Peer record module
//!
//! Identity, addressing, payload and bandwidth state of one remote peer.

use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::peer::address::{ActiveSocket, AddressPair};
use crate::peer::bandwidth::{bytes_to_kilobits_per_second, MovingAverage};
use crate::peer::guard::DeletionGuard;
use crate::peer::payload::{PayloadSlot, PeerData};
use crate::peer::types::PeerType;
use crate::time::{system_clock, Clock};

/// A remote participant seen over UDP.
///
/// Two records are equal when they have the same role and the same public
/// and local addresses. The id, timestamps, payload and bandwidth state do
/// not take part, so a peer reconnecting from the same addresses is
/// recognised before it gets an id back.
///
/// The record does no internal locking. Callers serialise mutation; the
/// [`DeletionGuard`] is only ever locked by the owning table.
#[derive(Debug)]
pub struct PeerRecord {
    peer_type: PeerType,
    id: u16,
    addresses: AddressPair,
    first_recv_usecs: u64,
    last_recv_usecs: u64,
    linked_data: PayloadSlot,
    bytes_received: Option<MovingAverage>,
    deletion_guard: DeletionGuard,
    clock: Arc<dyn Clock>,
}

impl PeerRecord {
    /// Create a record stamped with the system clock
    pub fn new(
        public_socket: Option<SocketAddr>,
        local_socket: Option<SocketAddr>,
        peer_type: PeerType,
        id: u16,
    ) -> Self {
        Self::with_clock(public_socket, local_socket, peer_type, id, system_clock())
    }

    /// Create a record reading time from `clock`
    pub fn with_clock(
        public_socket: Option<SocketAddr>,
        local_socket: Option<SocketAddr>,
        peer_type: PeerType,
        id: u16,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_usecs();
        Self {
            peer_type,
            id,
            addresses: AddressPair::new(public_socket, local_socket),
            first_recv_usecs: now,
            last_recv_usecs: now,
            linked_data: PayloadSlot::new(),
            bytes_received: None,
            deletion_guard: DeletionGuard::new(),
            clock,
        }
    }

    pub fn peer_type(&self) -> PeerType {
        self.peer_type
    }

    /// Change role, e.g. once a handshake tells us what the peer really is
    pub fn set_peer_type(&mut self, peer_type: PeerType) {
        self.peer_type = peer_type;
    }

    pub fn type_name(&self) -> &'static str {
        self.peer_type.name()
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    pub fn first_recv_time_usecs(&self) -> u64 {
        self.first_recv_usecs
    }

    /// Set the first-seen time, pulling last-seen forward if needed
    pub fn set_first_recv_time_usecs(&mut self, usecs: u64) {
        self.first_recv_usecs = usecs;
        if self.last_recv_usecs < usecs {
            self.last_recv_usecs = usecs;
        }
    }

    pub fn last_recv_time_usecs(&self) -> u64 {
        self.last_recv_usecs
    }

    /// Set the last-seen time; never earlier than first-seen
    pub fn set_last_recv_time_usecs(&mut self, usecs: u64) {
        self.last_recv_usecs = usecs.max(self.first_recv_usecs);
    }

    /// Mark the peer as heard from right now
    pub fn touch(&mut self) {
        let now = self.clock.now_usecs();
        self.set_last_recv_time_usecs(now);
    }

    /// Microseconds since the last packet, as of `now_usecs`
    pub fn silence_usecs(&self, now_usecs: u64) -> u64 {
        now_usecs.saturating_sub(self.last_recv_usecs)
    }

    pub fn public_socket(&self) -> Option<SocketAddr> {
        self.addresses.public()
    }

    pub fn set_public_socket(&mut self, addr: Option<SocketAddr>) {
        self.addresses.set_public(addr);
    }

    pub fn local_socket(&self) -> Option<SocketAddr> {
        self.addresses.local()
    }

    pub fn set_local_socket(&mut self, addr: Option<SocketAddr>) {
        self.addresses.set_local(addr);
    }

    /// Address currently used to send to this peer
    pub fn active_socket(&self) -> Option<SocketAddr> {
        self.addresses.active()
    }

    pub fn active_socket_kind(&self) -> ActiveSocket {
        self.addresses.active_kind()
    }

    /// Send via the local address. Does nothing if it is unknown.
    pub fn activate_local_socket(&mut self) {
        self.addresses.activate_local();
    }

    /// Send via the public address. Does nothing if it is unknown.
    pub fn activate_public_socket(&mut self) {
        self.addresses.activate_public();
    }

    pub fn linked_data(&self) -> Option<&dyn PeerData> {
        self.linked_data.get()
    }

    pub fn linked_data_mut(&mut self) -> Option<&mut (dyn PeerData + 'static)> {
        self.linked_data.get_mut()
    }

    /// Replace the attached payload, dropping the old one
    pub fn set_linked_data(&mut self, data: Option<Box<dyn PeerData>>) {
        self.linked_data.set(data);
    }

    /// Detach the payload without dropping it
    pub fn take_linked_data(&mut self) -> Option<Box<dyn PeerData>> {
        self.linked_data.take()
    }

    /// Borrow the payload as the concrete type the caller attached
    pub fn linked_data_as<T: Any>(&self) -> Option<&T> {
        self.linked_data.downcast_ref::<T>()
    }

    pub fn linked_data_as_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.linked_data.downcast_mut::<T>()
    }

    /// Whether this record describes the peer at the given addresses and role
    pub fn matches(
        &self,
        public_socket: Option<SocketAddr>,
        local_socket: Option<SocketAddr>,
        peer_type: PeerType,
    ) -> bool {
        self.peer_type == peer_type
            && self.addresses.matches(public_socket.as_ref(), local_socket.as_ref())
    }

    /// Register a received datagram of `bytes` bytes
    pub fn record_bytes_received(&mut self, bytes: usize) {
        let now = self.clock.now_usecs();
        self.bytes_received
            .get_or_insert_with(MovingAverage::default)
            .update_average(bytes as f64, now);
    }

    /// Packets per second inferred from packet spacing, 0 before any packet
    pub fn average_packets_per_second(&self) -> f64 {
        match &self.bytes_received {
            Some(average) => average.events_per_second(self.clock.now_usecs()),
            None => 0.0,
        }
    }

    /// Received kilobits per second, 0 before any packet
    pub fn average_kilobits_per_second(&self) -> f64 {
        match &self.bytes_received {
            Some(average) => bytes_to_kilobits_per_second(
                average.average_sample_value_per_second(self.clock.now_usecs()),
            ),
            None => 0.0,
        }
    }

    /// Number of byte-received events seen
    pub fn packets_received(&self) -> u32 {
        self.bytes_received.as_ref().map_or(0, |a| a.sample_count())
    }

    /// Drop the bandwidth estimate
    pub fn reset_bandwidth(&mut self) {
        self.bytes_received = None;
    }

    /// Handle to the lock the table takes before destroying this record
    pub fn deletion_guard(&self) -> &DeletionGuard {
        &self.deletion_guard
    }

    /// Copy every value from `other`, keeping this record's deletion guard.
    ///
    /// The copy is built before anything is overwritten, so a panicking
    /// payload clone leaves `self` untouched.
    pub fn assign_from(&mut self, other: &PeerRecord) {
        let copy = other.copy_with_guard(self.deletion_guard.clone());
        *self = copy;
    }

    /// Snapshot for display and serialisation
    pub fn stats(&self) -> PeerStats {
        PeerStats {
            id: self.id,
            type_name: self.type_name().to_string(),
            type_tag: self.peer_type.tag_char(),
            public_socket: self.public_socket(),
            local_socket: self.local_socket(),
            active_socket: self.active_socket(),
            first_recv_usecs: self.first_recv_usecs,
            last_recv_usecs: self.last_recv_usecs,
            packets_received: self.packets_received(),
            packets_per_second: self.average_packets_per_second(),
            kilobits_per_second: self.average_kilobits_per_second(),
            has_linked_data: self.linked_data.is_some(),
        }
    }

    fn copy_with_guard(&self, deletion_guard: DeletionGuard) -> Self {
        Self {
            peer_type: self.peer_type,
            id: self.id,
            addresses: self.addresses.clone(),
            first_recv_usecs: self.first_recv_usecs,
            last_recv_usecs: self.last_recv_usecs,
            linked_data: self.linked_data.clone(),
            bytes_received: self.bytes_received.clone(),
            deletion_guard,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl Clone for PeerRecord {
    /// Deep copy with a fresh deletion guard of its own
    fn clone(&self) -> Self {
        self.copy_with_guard(DeletionGuard::new())
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign_from(source);
    }
}

impl PartialEq for PeerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.public_socket(), other.local_socket(), other.peer_type)
    }
}

impl Eq for PeerRecord {}

impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {} T: {} ({}) PA: {} LA: {}",
            self.id,
            self.type_name(),
            self.peer_type.tag_char(),
            SocketDisplay(self.public_socket()),
            SocketDisplay(self.local_socket()),
        )
    }
}

struct SocketDisplay(Option<SocketAddr>);

impl fmt::Display for SocketDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{}", addr),
            None => f.write_str("Unknown"),
        }
    }
}

/// Peer statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerStats {
    /// Peer id within its table
    pub id: u16,
    /// Role name
    pub type_name: String,
    /// Raw role tag
    pub type_tag: char,
    /// Address seen from outside any NAT
    pub public_socket: Option<SocketAddr>,
    /// Same-subnet address
    pub local_socket: Option<SocketAddr>,
    /// Address used for sending
    pub active_socket: Option<SocketAddr>,
    pub first_recv_usecs: u64,
    pub last_recv_usecs: u64,
    /// Datagrams counted by the bandwidth estimate
    pub packets_received: u32,
    pub packets_per_second: f64,
    pub kilobits_per_second: f64,
    /// Whether a payload is attached
    pub has_linked_data: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct AvatarData {
        position: [f32; 3],
        chat: Vec<String>,
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn manual_record(clock: &ManualClock, public: Option<SocketAddr>, local: Option<SocketAddr>) -> PeerRecord {
        PeerRecord::with_clock(public, local, PeerType::Client, 7, Arc::new(clock.clone()))
    }

    #[test]
    fn test_new_record() {
        let clock = ManualClock::new(5_000);
        let public = addr("10.0.0.5:5000");
        let record = manual_record(&clock, Some(public), None);

        assert_eq!(record.id(), 7);
        assert_eq!(record.peer_type(), PeerType::Client);
        assert_eq!(record.public_socket(), Some(public));
        assert_eq!(record.local_socket(), None);
        assert_eq!(record.active_socket(), None);
        assert_eq!(record.first_recv_time_usecs(), 5_000);
        assert_eq!(record.last_recv_time_usecs(), 5_000);
        assert!(record.linked_data().is_none());
        assert_eq!(record.packets_received(), 0);
    }

    #[test]
    fn test_fresh_guard_per_record() {
        let a = PeerRecord::new(None, None, PeerType::Domain, 1);
        let b = PeerRecord::new(None, None, PeerType::Domain, 1);
        assert!(!a.deletion_guard().same_lock(b.deletion_guard()));
    }

    #[test]
    fn test_matches_public_only() {
        let a = addr("10.0.0.5:5000");
        let b = addr("10.0.0.6:5000");
        let record = PeerRecord::new(Some(a), None, PeerType::Client, 1);

        assert!(record.matches(Some(a), None, PeerType::Client));
        assert!(!record.matches(Some(b), None, PeerType::Client));
        assert!(!record.matches(Some(a), None, PeerType::AudioMixer));
    }

    #[test]
    fn test_matches_compares_local_too() {
        let public = addr("10.0.0.5:5000");
        let mut record = PeerRecord::new(Some(public), None, PeerType::Client, 1);
        assert!(record.matches(Some(public), None, PeerType::Client));

        record.set_local_socket(Some(addr("192.168.0.5:5000")));
        assert!(!record.matches(Some(public), None, PeerType::Client));
        assert!(record.matches(Some(public), Some(addr("192.168.0.5:5000")), PeerType::Client));
    }

    #[test]
    fn test_equality_ignores_id_and_timestamps() {
        let clock = ManualClock::new(0);
        let public = addr("1.2.3.4:40102");
        let local = addr("192.168.1.2:40102");

        let a = PeerRecord::with_clock(Some(public), Some(local), PeerType::AvatarMixer, 1, Arc::new(clock.clone()));
        clock.advance(Duration::from_secs(3));
        let mut b = PeerRecord::with_clock(Some(public), Some(local), PeerType::AvatarMixer, 99, Arc::new(clock.clone()));
        b.set_linked_data(Some(Box::new(5u32)));

        assert_eq!(a, b);

        b.set_peer_type(PeerType::AudioMixer);
        assert_ne!(a, b);
    }

    #[test]
    fn test_activate_absent_local_is_noop() {
        let public = addr("1.2.3.4:40102");
        let mut record = PeerRecord::new(Some(public), None, PeerType::Client, 1);

        record.activate_local_socket();
        assert_eq!(record.active_socket(), None);

        record.activate_public_socket();
        record.activate_local_socket();
        assert_eq!(record.active_socket(), Some(public));
    }

    #[test]
    fn test_set_local_socket_does_not_touch_public() {
        let public = addr("1.2.3.4:40102");
        let mut record = PeerRecord::new(Some(public), None, PeerType::Client, 1);
        record.set_local_socket(Some(addr("192.168.1.2:40102")));
        assert_eq!(record.public_socket(), Some(public));
    }

    #[test]
    fn test_copy_is_deep() {
        let public = addr("1.2.3.4:40102");
        let mut record = PeerRecord::new(Some(public), None, PeerType::Client, 3);
        record.set_linked_data(Some(Box::new(AvatarData { position: [1.0, 0.0, 0.0], chat: vec![] })));

        let mut copy = record.clone();
        copy.linked_data_as_mut::<AvatarData>().unwrap().chat.push("hello".to_string());
        copy.linked_data_as_mut::<AvatarData>().unwrap().position[0] = 9.0;

        let source = record.linked_data_as::<AvatarData>().unwrap();
        assert!(source.chat.is_empty());
        assert_eq!(source.position[0], 1.0);
        assert_eq!(copy.linked_data_as::<AvatarData>().unwrap().chat, vec!["hello"]);
    }

    #[test]
    fn test_copy_active_socket_refers_to_own_storage() {
        let mut record = PeerRecord::new(
            Some(addr("1.2.3.4:40102")),
            Some(addr("192.168.1.2:40102")),
            PeerType::Client,
            3,
        );
        record.activate_local_socket();

        let mut copy = record.clone();
        assert_eq!(copy.active_socket(), Some(addr("192.168.1.2:40102")));

        copy.set_local_socket(Some(addr("192.168.1.9:40102")));
        assert_eq!(copy.active_socket(), Some(addr("192.168.1.9:40102")));
        assert_eq!(record.active_socket(), Some(addr("192.168.1.2:40102")));
    }

    #[test]
    fn test_copy_gets_its_own_guard() {
        let record = PeerRecord::new(None, None, PeerType::Domain, 1);
        let copy = record.clone();
        assert!(!copy.deletion_guard().same_lock(record.deletion_guard()));
        assert_eq!(record.deletion_guard().handle_count(), 1);
    }

    #[test]
    fn test_assign_keeps_destination_guard() {
        let mut target = PeerRecord::new(None, None, PeerType::Domain, 1);
        let target_guard = target.deletion_guard().clone();

        let mut source = PeerRecord::new(Some(addr("1.2.3.4:1")), None, PeerType::VoxelServer, 2);
        source.activate_public_socket();
        source.set_linked_data(Some(Box::new(vec![1u8, 2, 3])));

        target.assign_from(&source);

        assert_eq!(target, source);
        assert_eq!(target.id(), 2);
        assert_eq!(target.active_socket(), Some(addr("1.2.3.4:1")));
        assert_eq!(target.linked_data_as::<Vec<u8>>(), Some(&vec![1u8, 2, 3]));
        assert!(target.deletion_guard().same_lock(&target_guard));
        assert!(!target.deletion_guard().same_lock(source.deletion_guard()));
    }

    #[test]
    fn test_self_assignment_keeps_every_field() {
        let clock = ManualClock::new(1_000);
        let mut record = manual_record(&clock, Some(addr("1.2.3.4:1")), Some(addr("10.1.1.1:2")));
        record.activate_local_socket();
        record.record_bytes_received(100);
        clock.advance(Duration::from_millis(10));
        record.record_bytes_received(200);
        record.set_linked_data(Some(Box::new(AvatarData { position: [0.5; 3], chat: vec!["x".into()] })));
        let guard = record.deletion_guard().clone();
        let before = format!("{:?}", record);

        let snapshot = record.clone();
        record.clone_from(&snapshot);

        assert_eq!(format!("{:?}", record), before);
        assert!(record.deletion_guard().same_lock(&guard));
        assert_eq!(record.stats(), snapshot.stats());
    }

    #[test]
    fn test_no_bytes_received_rates_are_zero() {
        let record = PeerRecord::new(None, None, PeerType::Client, 1);
        assert_eq!(record.average_packets_per_second(), 0.0);
        assert_eq!(record.average_kilobits_per_second(), 0.0);
    }

    #[test]
    fn test_bandwidth_converges() {
        let clock = ManualClock::new(0);
        let mut record = manual_record(&clock, None, None);

        for i in 0..30 {
            if i > 0 {
                clock.advance(Duration::from_millis(100));
            }
            record.record_bytes_received(512);
        }

        let pps = record.average_packets_per_second();
        let kbps = record.average_kilobits_per_second();
        assert!((pps - 10.0).abs() < 0.5, "pps = {}", pps);
        assert!((kbps - 41.0).abs() < 1.5, "kbps = {}", kbps);
        assert_eq!(record.packets_received(), 30);
    }

    #[test]
    fn test_same_instant_burst_saturates() {
        let clock = ManualClock::new(0);
        let mut record = manual_record(&clock, None, None);
        for _ in 0..5 {
            record.record_bytes_received(64);
        }
        assert!(record.average_packets_per_second().is_finite());
        assert!(record.average_kilobits_per_second().is_finite());
    }

    #[test]
    fn test_copy_keeps_bandwidth_state() {
        let clock = ManualClock::new(0);
        let mut record = manual_record(&clock, None, None);
        record.record_bytes_received(512);
        clock.advance(Duration::from_millis(100));
        record.record_bytes_received(512);

        let copy = record.clone();
        assert_eq!(copy.packets_received(), 2);
        assert_eq!(copy.average_packets_per_second(), record.average_packets_per_second());

        let mut reset = copy.clone();
        reset.reset_bandwidth();
        assert_eq!(reset.average_packets_per_second(), 0.0);
        assert_eq!(copy.packets_received(), 2);
    }

    #[test]
    fn test_timestamps_stay_ordered() {
        let clock = ManualClock::new(1_000);
        let mut record = manual_record(&clock, None, None);

        record.set_last_recv_time_usecs(500);
        assert_eq!(record.last_recv_time_usecs(), 1_000);

        record.set_first_recv_time_usecs(2_000);
        assert_eq!(record.first_recv_time_usecs(), 2_000);
        assert_eq!(record.last_recv_time_usecs(), 2_000);

        clock.set(3_500);
        record.touch();
        assert_eq!(record.last_recv_time_usecs(), 3_500);
        assert_eq!(record.silence_usecs(4_000), 500);
    }

    #[test]
    fn test_display() {
        let record = PeerRecord::new(
            Some(addr("1.2.3.4:40102")),
            None,
            PeerType::AudioMixer,
            12,
        );
        assert_eq!(record.to_string(), "ID: 12 T: Audio Mixer (M) PA: 1.2.3.4:40102 LA: Unknown");

        let unknown = PeerRecord::new(None, Some(addr("192.168.0.2:55443")), PeerType::from_byte(b'Q'), 0);
        assert_eq!(unknown.to_string(), "ID: 0 T: Unknown (Q) PA: Unknown LA: 192.168.0.2:55443");
    }

    #[test]
    fn test_stats_serialize() {
        let mut record = PeerRecord::new(Some(addr("1.2.3.4:40102")), None, PeerType::Client, 4);
        record.activate_public_socket();

        let json = serde_json::to_value(record.stats()).unwrap();
        assert_eq!(json["id"], 4);
        assert_eq!(json["type_name"], "Client Interface");
        assert_eq!(json["type_tag"], "I");
        assert_eq!(json["active_socket"], "1.2.3.4:40102");
        assert!(json["local_socket"].is_null());
        assert_eq!(json["has_linked_data"], false);
    }

    #[test]
    fn test_destruction_waits_for_guarded_reader() {
        let record = Arc::new(PeerRecord::new(None, None, PeerType::AvatarMixer, 8));
        let guard = record.deletion_guard().clone();
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (reader_ready_tx, reader_ready_rx) = mpsc::channel();

        let reader = {
            let record = Arc::clone(&record);
            let guard = guard.clone();
            let events = Arc::clone(&events);
            thread::spawn(move || {
                let _held = guard.lock();
                reader_ready_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                let name = record.type_name();
                events.lock().push(format!("read {}", name));
            })
        };

        reader_ready_rx.recv().unwrap();

        let sweeper = {
            let guard = guard.clone();
            let events = Arc::clone(&events);
            let mut owned = Some(record);
            thread::spawn(move || {
                let _held = guard.lock();
                owned.take();
                events.lock().push("destroyed".to_string());
            })
        };

        reader.join().unwrap();
        sweeper.join().unwrap();

        assert_eq!(*events.lock(), vec!["read Avatar Mixer".to_string(), "destroyed".to_string()]);
        assert_eq!(guard.handle_count(), 1);
    }
}
