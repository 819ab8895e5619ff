// SPDX-License-Identifier: GPL-2.0
//! Handle table: translates sender-local handle ids to destination-local
//! ones and reference-counts the shared nodes they refer to.
//!
//! `spec.md` §1 lists the handle table among the out-of-scope collaborators
//! ("referenced only through their contracts"). This module supplies the
//! minimal in-process contract the transaction engine actually drives:
//! resolve a local id to the node (and owning peer) it denotes, and
//! translate/allocate a local id for a node in some other peer's table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::peer::PeerId;

/// Identifies a shared node globally, independent of any one peer's local
/// handle numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    /// Allocates a fresh, globally unique node id.
    #[must_use]
    pub fn new() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A sender-local (or destination-local) opaque handle id.
///
/// `HandleId(0)` is reserved as the invalid sentinel written back for
/// silently-dropped destinations (`spec.md` §6's `BUS1_HANDLE_INVALID`
/// analogue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl HandleId {
    pub const INVALID: HandleId = HandleId(0);
}

#[derive(Debug, Clone)]
pub(crate) struct HandleEntry {
    pub(crate) node: NodeId,
    pub(crate) owner: PeerId,
    refcount: u32,
}

/// One peer's table of handles: local id -> (node, owning peer).
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: HashMap<HandleId, HandleEntry>,
    by_node: HashMap<NodeId, HandleId>,
    next_id: u64,
}

impl HandleTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_node: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers a brand-new node owned by `owner`, returning the local
    /// handle id this table assigns it. Used by test/setup code to give a
    /// sender a handle that addresses some destination peer's node.
    pub fn register_new_node(&mut self, owner: PeerId) -> (NodeId, HandleId) {
        let node = NodeId::new();
        let id = self.insert(node, owner);
        (node, id)
    }

    fn insert(&mut self, node: NodeId, owner: PeerId) -> HandleId {
        let id = HandleId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            HandleEntry {
                node,
                owner,
                refcount: 1,
            },
        );
        self.by_node.insert(node, id);
        id
    }

    /// Resolves a local handle id to the node and owning peer it denotes.
    #[must_use]
    pub fn resolve(&self, id: HandleId) -> Option<(NodeId, PeerId)> {
        self.entries.get(&id).map(|e| (e.node, e.owner))
    }

    /// Takes an additional (inflight) reference on the node behind `id`,
    /// used while importing handles for a transaction payload (`spec.md`
    /// §4.2). Returns the node's owning peer alongside it so a
    /// payload-embedded handle can be translated against its *own* owner
    /// at each destination, independent of whichever peer the transaction's
    /// main destination handle happens to address.
    pub fn take_inflight(&mut self, id: HandleId) -> Option<(NodeId, PeerId)> {
        let entry = self.entries.get_mut(&id)?;
        entry.refcount += 1;
        Some((entry.node, entry.owner))
    }

    /// Releases a reference previously taken by [`Self::take_inflight`] or
    /// [`Self::translate_or_insert`]. Removes the entry once the refcount
    /// reaches zero.
    pub fn release(&mut self, id: HandleId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.refcount -= 1;
        if entry.refcount == 0 {
            let node = entry.node;
            self.entries.remove(&id);
            self.by_node.remove(&node);
        }
    }

    /// Translates `node` (owned by `owner`) into this table's local
    /// numbering, allocating a fresh id the first time it is seen and
    /// taking a reference either way (`spec.md` §4.3 step 6/7, §4.5 step 4).
    pub fn translate_or_insert(&mut self, node: NodeId, owner: PeerId) -> HandleId {
        if let Some(&id) = self.by_node.get(&node) {
            match self.entries.get_mut(&id) {
                Some(entry) => entry.refcount += 1,
                None => debug_assert!(false, "by_node entry for {node:?} points at dangling id {id:?}"),
            }
            return id;
        }
        self.insert(node, owner)
    }

    /// Current refcount for a handle, for leak-detection tests. `None` if
    /// unknown.
    #[must_use]
    pub fn refcount(&self, id: HandleId) -> Option<u32> {
        self.entries.get(&id).map(|e| e.refcount)
    }
}

/// One handle embedded in a transaction's payload content, imported from the
/// sender (`spec.md` §4.2: "Unknown or foreign ids are recorded for later
/// translation, not rejected here").
#[derive(Debug, Clone, Copy)]
pub(crate) enum TransferHandle {
    /// Resolved against the sender's table at import time; an inflight
    /// reference is already held. Carries the node's owning peer so
    /// instantiation can translate it into the correct destination table
    /// even when that owner differs from the transaction's main
    /// destination.
    Resolved(NodeId, PeerId),
    /// Did not resolve against the sender's table. Kept around rather than
    /// failing import; translation is attempted again per destination and
    /// otherwise silently yields no handle (full foreign-handle resolution
    /// belongs to the handle subsystem, out of scope per `spec.md` §1).
    #[allow(dead_code)]
    Unresolved(HandleId),
}

/// The batch of payload-embedded handles a transaction carries, imported
/// once and instantiated per destination (`spec.md` §3's "handle-transfer
/// descriptor").
#[derive(Debug, Default)]
pub(crate) struct HandleTransfer {
    handles: Vec<TransferHandle>,
}

impl HandleTransfer {
    pub(crate) fn import(ids: &[HandleId], sender_handles: &mut HandleTable) -> Self {
        let handles = ids
            .iter()
            .map(|&id| match sender_handles.take_inflight(id) {
                Some((node, owner)) => TransferHandle::Resolved(node, owner),
                None => TransferHandle::Unresolved(id),
            })
            .collect();
        Self { handles }
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Instantiates this batch's handles into `dest`'s local numbering,
    /// each translated against its own owning peer rather than the
    /// transaction's main destination (`spec.md` §3, §4.3 step 6).
    pub(crate) fn instantiate_for(&self, dest: &mut HandleTable) -> Vec<HandleId> {
        self.handles
            .iter()
            .filter_map(|h| match h {
                TransferHandle::Resolved(node, owner) => Some(dest.translate_or_insert(*node, *owner)),
                TransferHandle::Unresolved(_) => None,
            })
            .collect()
    }

    /// Releases the inflight references this batch holds against the
    /// sender's table (`spec.md` §4.6 teardown: "release the
    /// handle-transfer descriptor").
    pub(crate) fn release(&self, sender_handles: &mut HandleTable) {
        for h in &self.handles {
            if let TransferHandle::Resolved(node, _owner) = h {
                if let Some(&id) = sender_handles.by_node.get(node) {
                    sender_handles.release(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_or_insert_is_stable_per_node() {
        let mut table = HandleTable::new();
        let node = NodeId::new();
        let owner = PeerId(1);
        let a = table.translate_or_insert(node, owner);
        let b = table.translate_or_insert(node, owner);
        assert_eq!(a, b);
        assert_eq!(table.refcount(a), Some(2));
    }

    #[test]
    fn release_removes_entry_at_zero_refcount() {
        let mut table = HandleTable::new();
        let (_, id) = table.register_new_node(PeerId(1));
        assert_eq!(table.refcount(id), Some(1));
        table.release(id);
        assert_eq!(table.refcount(id), None);
    }

    #[test]
    fn resolve_returns_node_and_owner() {
        let mut table = HandleTable::new();
        let owner = PeerId(9);
        let (node, id) = table.register_new_node(owner);
        assert_eq!(table.resolve(id), Some((node, owner)));
        assert_eq!(table.resolve(HandleId(999)), None);
    }

    #[test]
    fn unresolved_transfer_handles_do_not_abort_import() {
        let mut sender = HandleTable::new();
        let transfer = HandleTransfer::import(&[HandleId(42)], &mut sender);
        assert_eq!(transfer.len(), 1);
        let mut dest = HandleTable::new();
        let slots = transfer.instantiate_for(&mut dest);
        assert!(slots.is_empty());
    }
}
