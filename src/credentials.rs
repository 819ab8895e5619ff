// SPDX-License-Identifier: GPL-2.0
//! Sender identity and its translation into a destination peer's namespace.
//!
//! `spec.md` §3 requires the header delivered to a destination to carry the
//! sender's uid/gid/pid/tid "mapped into the destination's namespace", with
//! unmappable ids rendered as an overflow id (§6). There is no real kernel
//! user/pid namespace in a single-address-space library, so each [`Peer`]
//! carries a [`NamespaceView`] standing in for that mapping.
//!
//! [`Peer`]: crate::peer::Peer

use std::collections::HashMap;

/// A snapshot of the sender's identity, captured once at transaction
/// construction (`spec.md` §4.1: "captures sender credentials ... exactly
/// once ... because the transaction is strictly task-local").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub tid: u32,
}

impl Credentials {
    #[must_use]
    pub fn new(uid: u32, gid: u32, pid: u32, tid: u32) -> Self {
        Self { uid, gid, pid, tid }
    }
}

/// The conventional "overflow" id rendered for an id that has no mapping in
/// a destination's namespace, matching the Linux `overflowuid`/`overflowgid`
/// convention referenced by `spec.md` §6.
pub const OVERFLOW_ID: u32 = 65534;

/// Maps ids from the sender's namespace into a destination peer's namespace.
#[derive(Debug, Clone)]
pub enum NamespaceView {
    /// No translation: every id maps to itself. The default for peers that
    /// share a namespace with every sender.
    Identity,
    /// Explicit uid/gid/pid/tid maps; anything absent renders as
    /// [`OVERFLOW_ID`].
    Mapped {
        uid: HashMap<u32, u32>,
        gid: HashMap<u32, u32>,
        pid: HashMap<u32, u32>,
    },
}

impl Default for NamespaceView {
    fn default() -> Self {
        NamespaceView::Identity
    }
}

impl NamespaceView {
    fn map(table: Option<&HashMap<u32, u32>>, id: u32) -> u32 {
        match table {
            None => id,
            Some(map) => map.get(&id).copied().unwrap_or(OVERFLOW_ID),
        }
    }

    /// Translates a full credential snapshot through this namespace view.
    #[must_use]
    pub fn translate(&self, cred: Credentials) -> Credentials {
        match self {
            NamespaceView::Identity => cred,
            NamespaceView::Mapped { uid, gid, pid } => Credentials {
                uid: Self::map(Some(uid), cred.uid),
                gid: Self::map(Some(gid), cred.gid),
                pid: Self::map(Some(pid), cred.pid),
                tid: Self::map(Some(pid), cred.tid),
            },
        }
    }
}
