// SPDX-License-Identifier: GPL-2.0
//! Per-destination message entries (`spec.md` §3 "Message entry").

use std::sync::atomic::{AtomicU64, Ordering};

use crate::files::FileCap;
use crate::handle::HandleId;
use crate::peer::PeerPin;
use crate::pool::Slice;
use std::sync::Arc;

use crate::peer::Peer;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one message entry for the lifetime of a single queue
/// (`spec.md` §4.4's "node" parameter to `stage`/`commit`/`remove`). Distinct
/// from [`crate::handle::NodeId`]: a node may receive many messages over
/// time, each with its own identity here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MessageId(pub(crate) u64);

impl MessageId {
    pub(crate) fn new() -> Self {
        MessageId(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The receiver-visible message header (`spec.md` §6 "Wire formats").
#[derive(Debug, Clone)]
pub struct MessageHeader {
    /// Sender uid, translated into the destination's namespace.
    pub uid: u32,
    /// Sender gid, translated into the destination's namespace.
    pub gid: u32,
    /// Sender pid, translated into the destination's namespace.
    pub pid: u32,
    /// Sender tid, translated into the destination's namespace.
    pub tid: u32,
    /// The destination-local handle id of the node this message addresses.
    /// Unset until commit (`spec.md` §3 invariants).
    pub destination: Option<HandleId>,
    /// Payload length within the slice.
    pub payload_len: usize,
}

/// A message as observed once committed and visible on a destination's
/// queue. Ownership of the slice, files and handles has moved here from the
/// transaction that produced it.
#[derive(Debug)]
pub struct DeliveredMessage {
    pub header: MessageHeader,
    pub slice: Slice,
    pub files: Vec<FileCap>,
    pub handles: Vec<HandleId>,
    pub silent: bool,
}

/// The transient binding resolved from a user-provided handle id: the
/// pinned target peer and the address at which to write the resulting
/// destination-local id (`spec.md` §3 "Handle destination (`dest`)").
///
/// `pin` is `None` for a destination that had already shut down by the time
/// it was resolved and whose unreachability was downgraded to a silent drop
/// under [`crate::params::Flags::CONTINUE`] (`spec.md` §7 stratum 2); there
/// is nothing left to pin, since the peer never entered the instantiation.
pub(crate) struct HandleDest {
    pub(crate) pin: Option<PeerPin>,
    pub(crate) peer: Arc<Peer>,
    pub(crate) node: crate::handle::NodeId,
    pub(crate) id_sink: Box<dyn crate::userio::IdSink>,
}

/// One per-destination message entry, staged on the transaction's list
/// until commit (or rollback) consumes it (`spec.md` §3).
pub(crate) struct MessageEntry {
    pub(crate) dest: HandleDest,
    pub(crate) message_id: MessageId,
    /// `None` means this destination's pool allocation failed and the
    /// failure was downgraded to a silent drop by `Flags::CONTINUE`
    /// (`spec.md` §4.3, §4.5, §7).
    pub(crate) slice: Option<Slice>,
    pub(crate) header: MessageHeader,
    pub(crate) files: Vec<FileCap>,
    pub(crate) handles: Vec<HandleId>,
    pub(crate) silent: bool,
}
