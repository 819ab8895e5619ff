// SPDX-License-Identifier: GPL-2.0
//! Peers: the destinations a transaction multicasts to.
//!
//! `spec.md` §1 lists the peer registry among the out-of-scope
//! collaborators. `Peer` and `PeerRegistry` here are the minimal in-process
//! stand-in the engine needs: a single lock guarding everything a commit
//! touches for one destination (queue, pool, handle table), matching the
//! one-lock-per-peer discipline the driver this crate grew out of uses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::credentials::NamespaceView;
use crate::handle::{HandleId, HandleTable, NodeId};
use crate::pool::SlicePool;
use crate::queue::Queue;

/// Identifies a peer independent of any one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u64);

/// Everything a commit against one peer needs, behind a single lock.
pub(crate) struct PeerState {
    pub(crate) queue: Queue,
    pub(crate) pool: SlicePool,
    pub(crate) handles: HandleTable,
    pub(crate) namespace: NamespaceView,
    pub(crate) dropped: u64,
    active: bool,
    pins: u64,
}

/// One multicast destination. Reached only through [`Arc`] so that a
/// transaction can hold a reference across the commit's staging and
/// finalization passes without the peer disappearing underneath it; the
/// peer's own teardown (`shutdown`) is independent of how many
/// transactions are currently pinning it.
pub struct Peer {
    id: PeerId,
    state: Mutex<PeerState>,
    wake_count: AtomicU64,
}

impl Peer {
    #[must_use]
    pub fn new(id: PeerId, pool_capacity: usize) -> Arc<Self> {
        Self::with_namespace(id, pool_capacity, NamespaceView::Identity)
    }

    #[must_use]
    pub fn with_namespace(id: PeerId, pool_capacity: usize, namespace: NamespaceView) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(PeerState {
                queue: Queue::new(),
                pool: SlicePool::new(pool_capacity),
                handles: HandleTable::new(),
                namespace,
                dropped: 0,
                active: true,
                pins: 0,
            }),
            wake_count: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, PeerState> {
        self.state.lock()
    }

    /// Takes a pin on this peer if it is still active. A sender must hold a
    /// pin on every destination for the duration of a commit pass so the
    /// peer can't be torn down out from under it (`spec.md` §4.3 "Resolve
    /// and pin").
    #[must_use]
    pub fn pin(self: &Arc<Self>) -> Option<PeerPin> {
        let mut state = self.state.lock();
        if !state.active {
            return None;
        }
        state.pins += 1;
        drop(state);
        Some(PeerPin(self.clone()))
    }

    /// Marks this peer inactive; existing pins remain valid until dropped,
    /// but no new pin will succeed. Models what `spec.md` §4.6/§9 calls
    /// "the receiver racing to destroy the node".
    pub fn shutdown(&self) {
        self.state.lock().active = false;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    #[must_use]
    pub fn pin_count(&self) -> u64 {
        self.state.lock().pins
    }

    /// Increments the wakeup counter; a receiver's queue-blocked reader
    /// would be the real target (`spec.md` §4.4 "became-head" wakeups). No
    /// actual blocking reader exists in this crate, so tests observe
    /// wakeups through this counter instead.
    pub(crate) fn notify(&self) {
        self.wake_count.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn wake_count(&self) -> u64 {
        self.wake_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().dropped
    }

    #[must_use]
    pub fn clock(&self) -> u64 {
        self.state.lock().queue.clock()
    }

    /// Registers a brand-new node owned by this peer and returns a local
    /// handle id addressing it. The handle-table equivalent of creating a
    /// fresh object for some other peer to send to; callers typically hand
    /// the returned [`HandleId`] to a sender's handle table via whatever
    /// out-of-band mechanism brokers handle transfer, which this crate does
    /// not model (`spec.md` §1).
    pub fn register_node(&self) -> (NodeId, HandleId) {
        self.state.lock().handles.register_new_node(self.id)
    }

    /// Inserts a handle into this peer's table addressing a node owned by
    /// some other peer, without going through a prior transaction. Real
    /// handle transfer between peers happens through the same multicast
    /// machinery this crate implements (a payload-embedded handle,
    /// instantiated per destination); this is the bootstrap primitive a
    /// test harness needs to seed that first handle before any transaction
    /// has run (`SPEC_FULL.md` §8).
    pub fn seed_handle_for(&self, node: NodeId, owner: PeerId) -> HandleId {
        self.state.lock().handles.translate_or_insert(node, owner)
    }

    /// Resolves a local handle id against this peer's own handle table.
    #[must_use]
    pub fn resolve(&self, id: HandleId) -> Option<(NodeId, PeerId)> {
        self.state.lock().handles.resolve(id)
    }

    /// Current reference count of a local handle, `None` if unknown.
    /// Intended for leak-detection assertions in tests.
    #[must_use]
    pub fn handle_refcount(&self, id: HandleId) -> Option<u32> {
        self.state.lock().handles.refcount(id)
    }

    #[must_use]
    pub fn pool_used(&self) -> usize {
        self.state.lock().pool.used()
    }

    #[must_use]
    pub fn pool_capacity(&self) -> usize {
        self.state.lock().pool.capacity()
    }

    /// The payload bytes of every message currently committed and visible
    /// on this peer's queue, oldest first.
    #[must_use]
    pub fn committed_payloads(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .queue
            .committed()
            .into_iter()
            .map(|(_, m)| m.slice.bytes().to_vec())
            .collect()
    }

    /// The commit timestamps of every message currently visible on this
    /// peer's queue, oldest first.
    #[must_use]
    pub fn committed_timestamps(&self) -> Vec<u64> {
        self.state.lock().queue.committed().into_iter().map(|(t, _)| t).collect()
    }
}

/// A live reference to a peer, held for the duration of one commit pass.
/// Dropping it releases the pin; it carries no other behavior.
pub struct PeerPin(Arc<Peer>);

impl PeerPin {
    #[must_use]
    pub fn peer(&self) -> &Arc<Peer> {
        &self.0
    }
}

impl Drop for PeerPin {
    fn drop(&mut self) {
        self.0.state.lock().pins -= 1;
    }
}

/// Resolves a [`PeerId`] to its live [`Peer`], the out-of-scope peer
/// registry's contract (`spec.md` §1).
pub trait PeerRegistry {
    fn peer(&self, id: PeerId) -> Option<Arc<Peer>>;
}

/// A plain in-memory registry sufficient for tests and for embedding this
/// crate where no external registry already exists.
#[derive(Default)]
pub struct InMemoryRegistry {
    peers: HashMap<PeerId, Arc<Peer>>,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, peer: Arc<Peer>) {
        self.peers.insert(peer.id(), peer);
    }
}

impl PeerRegistry for InMemoryRegistry {
    fn peer(&self, id: PeerId) -> Option<Arc<Peer>> {
        self.peers.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_fails_once_shut_down() {
        let peer = Peer::new(PeerId(1), 1024);
        assert!(peer.pin().is_some());
        peer.shutdown();
        assert!(peer.pin().is_none());
    }

    #[test]
    fn dropping_a_pin_decrements_the_count() {
        let peer = Peer::new(PeerId(1), 1024);
        let pin = peer.pin().unwrap();
        assert_eq!(peer.pin_count(), 1);
        drop(pin);
        assert_eq!(peer.pin_count(), 0);
    }

    #[test]
    fn seeded_handle_resolves_to_the_registered_node() {
        let dest = Peer::new(PeerId(2), 1024);
        let (node, _dest_local_id) = dest.register_node();
        let sender = Peer::new(PeerId(1), 1024);
        let seeded = sender.seed_handle_for(node, dest.id());
        assert_eq!(sender.resolve(seeded), Some((node, dest.id())));
    }

    #[test]
    fn registry_round_trips_by_id() {
        let mut registry = InMemoryRegistry::new();
        let peer = Peer::new(PeerId(7), 1024);
        registry.insert(peer.clone());
        assert!(Arc::ptr_eq(&registry.peer(PeerId(7)).unwrap(), &peer));
        assert!(registry.peer(PeerId(8)).is_none());
    }
}
