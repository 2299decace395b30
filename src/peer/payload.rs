//! Peer payload module
//!
//! Opaque, role-specific application state attached to a peer. The record
//! owns it and copies it through [`PeerData::clone_box`], never looking at
//! the concrete type.

use std::any::Any;
use std::fmt::Debug;

/// Capability every attached payload must provide
pub trait PeerData: Any + Debug + Send + Sync {
    /// Produce an independent deep copy of this payload
    fn clone_box(&self) -> Box<dyn PeerData>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> PeerData for T
where
    T: Any + Clone + Debug + Send + Sync,
{
    fn clone_box(&self) -> Box<dyn PeerData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Holds at most one payload
#[derive(Debug, Default)]
pub struct PayloadSlot {
    data: Option<Box<dyn PeerData>>,
}

impl PayloadSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&dyn PeerData> {
        self.data.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut (dyn PeerData + 'static)> {
        self.data.as_deref_mut()
    }

    /// Replace the payload, dropping the previous one
    pub fn set(&mut self, data: Option<Box<dyn PeerData>>) {
        self.data = data;
    }

    /// Detach the payload
    pub fn take(&mut self) -> Option<Box<dyn PeerData>> {
        self.data.take()
    }

    pub fn is_some(&self) -> bool {
        self.data.is_some()
    }

    /// Borrow the payload as a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|d| d.as_any().downcast_ref::<T>())
    }

    /// Mutably borrow the payload as a concrete type
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data
            .as_deref_mut()
            .and_then(|d| d.as_any_mut().downcast_mut::<T>())
    }
}

impl Clone for PayloadSlot {
    fn clone(&self) -> Self {
        Self {
            data: self.data.as_ref().map(|d| (**d).clone_box()),
        }
    }
}
