//! Peer address module
//!
//! Public/local address storage and active-path selection for NAT traversal.

use std::net::SocketAddr;

/// Which stored address is currently used for sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveSocket {
    /// Nothing selected yet
    #[default]
    None,
    /// The address seen from outside any NAT
    Public,
    /// The same-subnet address
    Local,
}

/// Compare two optional addresses by family, IP and port.
///
/// Two absent addresses are equal; absent never equals present.
pub fn socket_match(first: Option<&SocketAddr>, second: Option<&SocketAddr>) -> bool {
    match (first, second) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ip() == b.ip() && a.port() == b.port(),
        _ => false,
    }
}

/// Public and local address of a peer plus the active selection
#[derive(Debug, Clone, Default)]
pub struct AddressPair {
    public: Option<SocketAddr>,
    local: Option<SocketAddr>,
    active: ActiveSocket,
}

impl AddressPair {
    /// Create an address pair with nothing active
    pub fn new(public: Option<SocketAddr>, local: Option<SocketAddr>) -> Self {
        Self {
            public,
            local,
            active: ActiveSocket::None,
        }
    }

    pub fn public(&self) -> Option<SocketAddr> {
        self.public
    }

    pub fn local(&self) -> Option<SocketAddr> {
        self.local
    }

    /// Replace the public address; clearing it drops an active public selection
    pub fn set_public(&mut self, addr: Option<SocketAddr>) {
        self.public = addr;
        if addr.is_none() && self.active == ActiveSocket::Public {
            self.active = ActiveSocket::None;
        }
    }

    /// Replace the local address; clearing it drops an active local selection
    pub fn set_local(&mut self, addr: Option<SocketAddr>) {
        self.local = addr;
        if addr.is_none() && self.active == ActiveSocket::Local {
            self.active = ActiveSocket::None;
        }
    }

    /// Select the public address. No-op when it is unknown.
    pub fn activate_public(&mut self) {
        if self.public.is_some() {
            self.active = ActiveSocket::Public;
        }
    }

    /// Select the local address. No-op when it is unknown.
    pub fn activate_local(&mut self) {
        if self.local.is_some() {
            self.active = ActiveSocket::Local;
        }
    }

    /// Which slot is selected
    pub fn active_kind(&self) -> ActiveSocket {
        self.active
    }

    /// The selected address, if any
    pub fn active(&self) -> Option<SocketAddr> {
        match self.active {
            ActiveSocket::None => None,
            ActiveSocket::Public => self.public,
            ActiveSocket::Local => self.local,
        }
    }

    /// Check both addresses against another pair of candidates
    pub fn matches(&self, public: Option<&SocketAddr>, local: Option<&SocketAddr>) -> bool {
        socket_match(self.public.as_ref(), public) && socket_match(self.local.as_ref(), local)
    }
}

impl PartialEq for AddressPair {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.public.as_ref(), other.local.as_ref())
    }
}

impl Eq for AddressPair {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV6};

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_socket_match() {
        let a = addr("10.0.0.5:5000");
        let b = addr("10.0.0.5:5001");
        let c = addr("10.0.0.6:5000");

        assert!(socket_match(None, None));
        assert!(socket_match(Some(&a), Some(&a)));
        assert!(!socket_match(Some(&a), Some(&b)));
        assert!(!socket_match(Some(&a), Some(&c)));
        assert!(!socket_match(Some(&a), None));
        assert!(!socket_match(None, Some(&a)));
    }

    #[test]
    fn test_socket_match_family() {
        let v4 = SocketAddr::from((Ipv4Addr::new(0, 0, 0, 1), 4000));
        let v6 = SocketAddr::from((Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1), 4000));
        assert!(!socket_match(Some(&v4), Some(&v6)));
    }

    #[test]
    fn test_socket_match_ignores_v6_scope() {
        let ip = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
        let a = SocketAddr::V6(SocketAddrV6::new(ip, 4000, 0, 1));
        let b = SocketAddr::V6(SocketAddrV6::new(ip, 4000, 0, 2));
        assert!(socket_match(Some(&a), Some(&b)));
    }

    #[test]
    fn test_activate_absent_is_noop() {
        let public = addr("1.2.3.4:40102");
        let mut pair = AddressPair::new(Some(public), None);

        pair.activate_local();
        assert_eq!(pair.active(), None);

        pair.activate_public();
        assert_eq!(pair.active(), Some(public));

        pair.activate_local();
        assert_eq!(pair.active(), Some(public));
        assert_eq!(pair.active_kind(), ActiveSocket::Public);
    }

    #[test]
    fn test_active_follows_replaced_address() {
        let mut pair = AddressPair::new(None, Some(addr("192.168.1.2:40102")));
        pair.activate_local();

        pair.set_local(Some(addr("192.168.1.3:40102")));
        assert_eq!(pair.active(), Some(addr("192.168.1.3:40102")));

        pair.set_local(None);
        assert_eq!(pair.active_kind(), ActiveSocket::None);
        assert_eq!(pair.active(), None);
    }

    #[test]
    fn test_set_local_leaves_public() {
        let public = addr("1.2.3.4:40102");
        let mut pair = AddressPair::new(Some(public), None);
        pair.set_local(Some(addr("192.168.1.2:40102")));

        assert_eq!(pair.public(), Some(public));
        assert_eq!(pair.local(), Some(addr("192.168.1.2:40102")));
    }

    #[test]
    fn test_both_absent_never_active() {
        let mut pair = AddressPair::default();
        pair.activate_public();
        pair.activate_local();
        assert_eq!(pair.active(), None);
    }
}
