// SPDX-License-Identifier: GPL-2.0
//! The transaction engine itself (`spec.md` §3, §4).
//!
//! A [`Transaction`] is built once from a sender's send-call parameters,
//! grown by one [`Transaction::instantiate_for_id`] call per destination,
//! and then resolved by exactly one of [`Transaction::commit`] (multicast,
//! two staging passes) or [`Transaction::commit_for_id`] (single
//! destination, one pass). Dropping a transaction that was never committed
//! unwinds every destination it had already touched (`spec.md` §4.6).

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Limits;
use crate::credentials::Credentials;
use crate::error::{TxnError, TxnResult};
use crate::files::FileCap;
use crate::handle::{HandleId, HandleTransfer};
use crate::message::{DeliveredMessage, HandleDest, MessageEntry, MessageHeader, MessageId};
use crate::params::{Backing, Flags, SendParams};
use crate::peer::{Peer, PeerPin, PeerRegistry};
use crate::userio::IdSink;

/// The outcome of a successful commit. A fault in writing back a
/// destination-local id to the sender does not unwind an already-delivered
/// message (the receiver has no stake in the sender's memory faulting); it
/// is surfaced here instead (`spec.md` §4.5 "Fault latching", §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    faulted: bool,
}

impl CommitOutcome {
    #[must_use]
    pub fn faulted(&self) -> bool {
        self.faulted
    }

    #[must_use]
    pub fn status(&self) -> CommitStatus {
        if self.faulted {
            CommitStatus::Faulted
        } else {
            CommitStatus::Delivered
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Delivered,
    Faulted,
}

/// What finalizing one staged entry produced, matching the three outcomes
/// the C original's `bus1_transaction_consume` distinguishes (a plain
/// commit, an id write-back fault, or losing a race with node destruction)
/// (`examples/original_source/ipc/bus1/transaction.c`).
enum ConsumeOutcome {
    Delivered,
    Faulted,
    Unreachable,
}

/// A multicast send in progress: imported payload and handles, plus one
/// [`MessageEntry`] per destination resolved so far.
///
/// Not `Send`: every method call expects to run on the thread that holds
/// the sender's credentials and the borrowed `&dyn PeerRegistry`, matching
/// how the driver this grew out of always drives a transaction to
/// completion on the calling thread without handing it off
/// (`SPEC_FULL.md` §5). The `PhantomData<*const ()>` field is what actually
/// suppresses the auto-derived `Send`/`Sync`; every other field here would
/// otherwise qualify.
pub struct Transaction {
    sender: Arc<Peer>,
    sender_pin: PeerPin,
    cred: Credentials,
    flags: Flags,
    limits: Limits,
    payload: Vec<u8>,
    files: Vec<FileCap>,
    backing: Backing,
    handle_transfer: HandleTransfer,
    entries: Vec<MessageEntry>,
    committed: bool,
    _not_send: PhantomData<*const ()>,
}

impl Transaction {
    /// Imports a sender's send-call parameters into a new transaction:
    /// copies payload bytes out of user memory, checks the vector/fd/payload
    /// limits, and records the embedded handles for later translation
    /// (`spec.md` §4.2).
    pub fn new_from_user(sender: Arc<Peer>, params: SendParams, limits: Limits) -> TxnResult<Self> {
        if params.vecs.len() > limits.vec_max {
            return Err(TxnError::TooManyVecs(params.vecs.len(), limits.vec_max));
        }
        if params.files.len() > limits.fd_max {
            return Err(TxnError::TooManyFds(params.files.len(), limits.fd_max));
        }

        let sender_pin = sender.pin().ok_or(TxnError::PeerShutdown)?;

        let total_len: usize = params.vecs.iter().map(|v| v.len()).sum();
        if total_len > limits.max_payload_size {
            return Err(TxnError::PayloadTooLarge(total_len, limits.max_payload_size));
        }

        let mut payload = Vec::with_capacity(total_len);
        for vec in &params.vecs {
            vec.copy_into(&mut payload).map_err(|()| TxnError::Fault)?;
        }

        let handle_transfer = {
            let mut sender_state = sender.lock();
            HandleTransfer::import(&params.handles, &mut sender_state.handles)
        };

        debug!(
            payload_len = payload.len(),
            files = params.files.len(),
            handles = handle_transfer.len(),
            backing = ?params.backing,
            "transaction imported"
        );

        Ok(Self {
            sender,
            sender_pin,
            cred: params.cred,
            flags: params.flags,
            limits,
            payload,
            files: params.files,
            backing: params.backing,
            handle_transfer,
            entries: Vec::new(),
            committed: false,
            _not_send: PhantomData,
        })
    }

    /// How this transaction's payload bytes were sourced, as reported by
    /// the sender at import time. Cosmetic (`spec.md` §4.1); kept only so a
    /// caller inspecting a transaction can see the decision it was built
    /// with.
    #[must_use]
    pub fn backing(&self) -> Backing {
        self.backing
    }

    /// Resolves `dest_handle` against the sender's handle table, pins the
    /// owning peer, and instantiates this transaction's payload/handles
    /// into its pool, without linking the result onto `self.entries`
    /// (`spec.md` §4.3).
    ///
    /// Both the destination's pool being full and the destination having
    /// already shut down are target-caused failures
    /// ([`TxnError::is_target_caused`]): either propagated (aborting the
    /// whole transaction on drop) or, under [`Flags::CONTINUE`], downgraded
    /// to a silent drop recorded for this destination alone (`spec.md` §4.3
    /// step 4, §7 stratum 2).
    fn build_entry(
        &mut self,
        registry: &dyn PeerRegistry,
        dest_handle: HandleId,
        id_sink: Box<dyn IdSink>,
    ) -> TxnResult<MessageEntry> {
        let (node, owner) = {
            let sender_state = self.sender.lock();
            sender_state.handles.resolve(dest_handle).ok_or(TxnError::InvalidHandle)?
        };

        let dest_peer = registry.peer(owner).ok_or(TxnError::PeerShutdown)?;

        let dest_pin = match dest_peer.pin() {
            Some(pin) => Some(pin),
            None => {
                let err = TxnError::PeerShutdown;
                if err.is_target_caused() && self.flags.contains(Flags::CONTINUE) {
                    warn!(destination = owner.0, "destination shut down mid-instantiation, dropping silently");
                    None
                } else {
                    return Err(err);
                }
            }
        };

        let message_id = MessageId::new();
        let cred = dest_peer.lock().namespace.translate(self.cred);

        let (slice, handles) = match &dest_pin {
            None => (None, Vec::new()),
            Some(_) => {
                let mut dest_state = dest_peer.lock();
                match dest_state.pool.alloc(self.payload.len()) {
                    Ok(mut slice) => {
                        slice.bytes_mut().copy_from_slice(&self.payload);
                        let handles = self.handle_transfer.instantiate_for(&mut dest_state.handles);
                        (Some(slice), handles)
                    }
                    Err(err) if err.is_target_caused() && self.flags.contains(Flags::CONTINUE) => {
                        warn!(destination = owner.0, "pool quota exceeded, dropping silently");
                        (None, Vec::new())
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        debug!(destination = owner.0, has_slice = slice.is_some(), "destination instantiated");

        let header = MessageHeader {
            uid: cred.uid,
            gid: cred.gid,
            pid: cred.pid,
            tid: cred.tid,
            destination: None,
            payload_len: self.payload.len(),
        };

        Ok(MessageEntry {
            dest: HandleDest {
                pin: dest_pin,
                peer: dest_peer,
                node,
                id_sink,
            },
            message_id,
            slice,
            header,
            files: self.files.clone(),
            handles,
            silent: self.flags.contains(Flags::SILENT),
        })
    }

    /// Resolves `dest_handle` and records a per-destination entry, to be
    /// finalized later by [`Self::commit`] (`spec.md` §4.3).
    pub fn instantiate_for_id(
        &mut self,
        registry: &dyn PeerRegistry,
        dest_handle: HandleId,
        id_sink: Box<dyn IdSink>,
    ) -> TxnResult<()> {
        let entry = self.build_entry(registry, dest_handle, id_sink)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Commits every destination instantiated so far as one multicast: all
    /// destinations are staged under a single sender-clock timestamp before
    /// any of them is finalized, so the message becomes visible at the same
    /// logical instant everywhere (`spec.md` §4.4, §4.5, §8's "atomic
    /// timestamp" property).
    #[must_use]
    pub fn commit(mut self) -> CommitOutcome {
        let entries = std::mem::take(&mut self.entries);
        debug!(destinations = entries.len(), "committing multicast");
        let ts = Self::stage_pass(&self.sender, &entries);

        let mut faulted = false;
        for entry in entries {
            match Self::consume(entry, ts, true) {
                ConsumeOutcome::Delivered => {}
                ConsumeOutcome::Faulted => faulted = true,
                // A race with node destruction between staging and commit
                // is never surfaced through a multicast commit's outcome,
                // only through the single-destination fast path below
                // (`examples/original_source/ipc/bus1/transaction.c`'s
                // `bus1_transaction_commit`, which only ever WARN_ONs it).
                ConsumeOutcome::Unreachable => {}
            }
        }

        self.committed = true;
        CommitOutcome { faulted }
    }

    /// Staging and side-channel sync passes (`spec.md` §4.5 steps 1-3):
    /// computes the final commit timestamp `t0` and reserves it on every
    /// destination, split out from [`Self::commit`] so the window between
    /// staging and the commit pass — where a receiver racing to destroy the
    /// addressed node is silently dropped (`spec.md` §4.6, §9) — is a real
    /// seam between two calls rather than buried inside one function.
    fn stage_pass(sender: &Arc<Peer>, entries: &[MessageEntry]) -> u64 {
        let mut ts = sender.lock().queue.tick();

        // Staging pass: sync each destination up to the running t0, tick
        // it, and stage one below that tick. `t0` grows to the max of
        // every clock touched so far, so a destination whose clock already
        // ran ahead of the sender's (scenario 2 in `spec.md` §8) still ends
        // up strictly below the final commit timestamp.
        for entry in entries {
            let mut dest = entry.dest.peer.lock();
            ts = dest.queue.sync(ts);
            ts = dest.queue.tick();
            dest.queue.stage(entry.message_id, ts - 1);
        }

        // Side-channel sync pass: now that `t0` is final, bring every
        // destination's clock up to it so a message a receiver sends after
        // observing this one is ordered strictly after on every peer, not
        // just the one whose tick happened to produce the final `t0`.
        for entry in entries {
            entry.dest.peer.lock().queue.sync(ts);
        }

        ts
    }

    /// Fast path for a transaction with exactly one destination: resolves,
    /// instantiates and commits it in a single call, without ever linking
    /// the entry onto `self.entries` (`spec.md` §4.5 "single destination
    /// fast path"). Mirrors the C original's `bus1_transaction_commit_for_id`,
    /// which calls the raw instantiate helper and `bus1_transaction_consume`
    /// directly rather than going through the entries-linking
    /// `bus1_transaction_instantiate_for_id` path
    /// (`examples/original_source/ipc/bus1/transaction.c`). Any entries
    /// already instantiated through a separate `instantiate_for_id` call are
    /// left untouched in `self.entries`, for a later `commit()` or for
    /// `Drop`'s rollback.
    ///
    /// Losing a race with node destruction between this call's own staging
    /// and commit is surfaced as [`TxnError::Unreachable`] here (unlike
    /// [`Self::commit`], which only ignores it), matching the C original's
    /// `r = message->slice ? -EHOSTUNREACH : 0;` return value.
    pub fn commit_for_id(
        mut self,
        registry: &dyn PeerRegistry,
        dest_handle: HandleId,
        id_sink: Box<dyn IdSink>,
    ) -> TxnResult<CommitOutcome> {
        let entry = self.build_entry(registry, dest_handle, id_sink)?;

        let sender_ts = self.sender.lock().queue.tick();
        let ts = {
            let mut dest = entry.dest.peer.lock();
            dest.queue.sync(sender_ts);
            dest.queue.tick()
        };

        let result = match Self::consume(entry, ts, false) {
            ConsumeOutcome::Delivered => Ok(CommitOutcome { faulted: false }),
            ConsumeOutcome::Faulted => Ok(CommitOutcome { faulted: true }),
            ConsumeOutcome::Unreachable => Err(TxnError::Unreachable),
        };
        self.committed = true;
        result
    }

    /// Finalizes one staged entry: for a dropped (sliceless) destination,
    /// writes back [`HandleId::INVALID`] and leaves the destination's
    /// handle table untouched, since no message was ever queued there
    /// (`spec.md` §3's invariant that a written-back id is only ever one
    /// the sender can observe after the matching entry committed).
    /// Otherwise translates the addressed node into the destination's own
    /// numbering, writes that id back to the sender, and promotes the
    /// entry from staged to committed — or, if the receiver raced us and
    /// tore the node down first, unwinds this destination's half-applied
    /// state and reports [`ConsumeOutcome::Unreachable`].
    fn consume(entry: MessageEntry, ts: u64, already_staged: bool) -> ConsumeOutcome {
        let MessageEntry {
            dest,
            message_id,
            slice,
            mut header,
            files,
            handles,
            silent,
        } = entry;
        let HandleDest {
            pin: _pin,
            peer,
            node,
            mut id_sink,
        } = dest;

        let mut state = peer.lock();
        if !already_staged {
            state.queue.stage(message_id, ts);
        }

        let Some(slice) = slice else {
            state.queue.remove(message_id);
            state.dropped += 1;
            drop(state);
            let write_failed = id_sink.write(HandleId::INVALID).is_err();
            debug!(destination = peer.id().0, "destination dropped, wrote back invalid id");
            return if write_failed { ConsumeOutcome::Faulted } else { ConsumeOutcome::Delivered };
        };

        let dest_local_id = state.handles.translate_or_insert(node, peer.id());
        let write_failed = id_sink.write(dest_local_id).is_err();

        header.destination = Some(dest_local_id);
        let delivered = DeliveredMessage {
            header,
            slice,
            files,
            handles,
            silent,
        };

        let unreachable = match state.queue.commit(message_id, ts, delivered) {
            Ok(()) => {
                debug!(destination = peer.id().0, timestamp = ts, "destination committed");
                if !silent {
                    drop(state);
                    peer.notify();
                }
                false
            }
            Err(delivered) => {
                // The receiver tore the node down between staging and
                // commit (`spec.md` §4.6, §9). Unwind this destination's
                // half-applied effects; the message is dropped, not
                // delivered.
                warn!(
                    destination = peer.id().0,
                    error = %TxnError::Unreachable,
                    "race with node destruction, dropping"
                );
                state.pool.release(&delivered.slice);
                for h in &delivered.handles {
                    state.handles.release(*h);
                }
                state.handles.release(dest_local_id);
                state.dropped += 1;
                true
            }
        };

        if write_failed {
            ConsumeOutcome::Faulted
        } else if unreachable {
            ConsumeOutcome::Unreachable
        } else {
            ConsumeOutcome::Delivered
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.committed {
            for entry in self.entries.drain(..) {
                let mut dest = entry.dest.peer.lock();
                dest.queue.remove(entry.message_id);
                if let Some(slice) = &entry.slice {
                    dest.pool.release(slice);
                }
                for h in &entry.handles {
                    dest.handles.release(*h);
                }
            }
        }
        self.handle_transfer.release(&mut self.sender.lock().handles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{InMemoryRegistry, PeerId};
    use crate::userio::{ByteVec, HandleSlot};

    fn params(cred: Credentials, payload: &[u8], flags: Flags) -> SendParams {
        SendParams {
            vecs: vec![Box::new(ByteVec(payload.to_vec()))],
            files: Vec::new(),
            handles: Vec::new(),
            flags,
            cred,
            backing: Backing::default(),
        }
    }

    /// `spec.md` §8 scenario 5 and §9's open question: a receiver racing to
    /// destroy the addressed node between the staging and commit passes is
    /// silently dropped, while the rest of the multicast is unaffected.
    #[test]
    fn race_with_node_destruction_between_stage_and_commit() {
        let sender = Peer::new(PeerId(1), 4096);
        let a = Peer::new(PeerId(2), 4096);
        let c = Peer::new(PeerId(3), 4096);
        let mut registry = InMemoryRegistry::new();
        registry.insert(sender.clone());
        registry.insert(a.clone());
        registry.insert(c.clone());

        let (node_a, _) = a.register_node();
        let handle_a = sender.seed_handle_for(node_a, a.id());
        let (node_c, _) = c.register_node();
        let handle_c = sender.seed_handle_for(node_c, c.id());

        let mut txn = Transaction::new_from_user(
            sender.clone(),
            params(Credentials::new(0, 0, 0, 0), b"x", Flags::empty()),
            Limits::default(),
        )
        .unwrap();
        txn.instantiate_for_id(&registry, handle_a, Box::new(HandleSlot::default())).unwrap();
        txn.instantiate_for_id(&registry, handle_c, Box::new(HandleSlot::default())).unwrap();

        let entries = std::mem::take(&mut txn.entries);
        let ts = Transaction::stage_pass(&txn.sender, &entries);

        // The receiver races the commit: it destroys the staged node on C
        // after staging but before the commit pass reaches it.
        for entry in &entries {
            if Arc::ptr_eq(&entry.dest.peer, &c) {
                entry.dest.peer.lock().queue.remove(entry.message_id);
            }
        }

        let mut faulted = false;
        for entry in entries {
            faulted |= matches!(Transaction::consume(entry, ts, true), ConsumeOutcome::Faulted);
        }
        txn.committed = true;

        assert!(!faulted);
        assert_eq!(a.committed_payloads(), vec![b"x".to_vec()]);
        assert!(c.committed_payloads().is_empty());
        assert_eq!(c.dropped_count(), 1);
        assert_eq!(a.committed_timestamps(), vec![ts]);
    }

    /// `spec.md` §8 "Monotone clocks": a peer's queue timestamp sequence is
    /// strictly increasing across successive commits.
    #[test]
    fn repeated_unicast_commits_strictly_increase_the_destination_clock() {
        let sender = Peer::new(PeerId(1), 4096);
        let dest = Peer::new(PeerId(2), 4096);
        let mut registry = InMemoryRegistry::new();
        registry.insert(sender.clone());
        registry.insert(dest.clone());

        let (node, _) = dest.register_node();
        let handle = sender.seed_handle_for(node, dest.id());

        let mut last = 0;
        for _ in 0..5 {
            let txn = Transaction::new_from_user(
                sender.clone(),
                params(Credentials::new(0, 0, 0, 0), b"x", Flags::empty()),
                Limits::default(),
            )
            .unwrap();
            txn.commit_for_id(&registry, handle, Box::new(HandleSlot::default())).unwrap();
            let ts = *dest.committed_timestamps().last().unwrap();
            assert!(ts > last);
            last = ts;
        }
    }

    /// `spec.md` §8 "No leaks": after a transaction drops without
    /// committing, every destination pin and handle refcount it touched
    /// returns to its pre-transaction value.
    #[test]
    fn dropping_an_uncommitted_transaction_leaves_no_trace() {
        let sender = Peer::new(PeerId(1), 4096);
        let dest = Peer::new(PeerId(2), 4096);
        let mut registry = InMemoryRegistry::new();
        registry.insert(sender.clone());
        registry.insert(dest.clone());

        let (node, _) = dest.register_node();
        let handle = sender.seed_handle_for(node, dest.id());

        let mut txn = Transaction::new_from_user(
            sender.clone(),
            params(Credentials::new(0, 0, 0, 0), b"x", Flags::empty()),
            Limits::default(),
        )
        .unwrap();
        txn.instantiate_for_id(&registry, handle, Box::new(HandleSlot::default())).unwrap();
        assert_eq!(dest.pin_count(), 1);
        drop(txn);

        assert_eq!(sender.pin_count(), 0);
        assert_eq!(dest.pin_count(), 0);
        assert!(dest.committed_payloads().is_empty());
        assert_eq!(dest.pool_used(), 0);
    }

    /// `spec.md` §7 stratum 2: a destination that shut down between being
    /// resolved and being instantiated is target-caused, same as a quota
    /// failure, and `CONTINUE` downgrades it to a silent per-destination
    /// drop rather than aborting the whole transaction.
    #[test]
    fn continue_flag_downgrades_a_shutdown_destination_to_silent_drop() {
        let sender = Peer::new(PeerId(1), 4096);
        let a = Peer::new(PeerId(2), 4096);
        let b = Peer::new(PeerId(3), 4096);
        let mut registry = InMemoryRegistry::new();
        registry.insert(sender.clone());
        registry.insert(a.clone());
        registry.insert(b.clone());

        let (node_a, _) = a.register_node();
        let handle_a = sender.seed_handle_for(node_a, a.id());
        let (node_b, _) = b.register_node();
        let handle_b = sender.seed_handle_for(node_b, b.id());
        b.shutdown();

        let mut txn = Transaction::new_from_user(
            sender.clone(),
            params(Credentials::new(0, 0, 0, 0), b"hi", Flags::CONTINUE),
            Limits::default(),
        )
        .unwrap();
        txn.instantiate_for_id(&registry, handle_a, Box::new(HandleSlot::default())).unwrap();
        txn.instantiate_for_id(&registry, handle_b, Box::new(HandleSlot::default())).unwrap();

        let outcome = txn.commit();
        assert!(!outcome.faulted());
        assert_eq!(a.committed_payloads(), vec![b"hi".to_vec()]);
        assert_eq!(b.dropped_count(), 1);
    }

    /// `spec.md` §7 stratum 2: without `CONTINUE`, the same shutdown
    /// destination aborts resolution instead of being downgraded.
    #[test]
    fn shutdown_destination_without_continue_aborts() {
        let sender = Peer::new(PeerId(1), 4096);
        let b = Peer::new(PeerId(3), 4096);
        let mut registry = InMemoryRegistry::new();
        registry.insert(sender.clone());
        registry.insert(b.clone());

        let (node_b, _) = b.register_node();
        let handle_b = sender.seed_handle_for(node_b, b.id());
        b.shutdown();

        let mut txn = Transaction::new_from_user(
            sender.clone(),
            params(Credentials::new(0, 0, 0, 0), b"hi", Flags::empty()),
            Limits::default(),
        )
        .unwrap();
        let err = txn.instantiate_for_id(&registry, handle_b, Box::new(HandleSlot::default())).unwrap_err();
        assert!(matches!(err, TxnError::PeerShutdown));
    }

    /// `spec.md` §3's invariant: a sliceless, `CONTINUE`-dropped destination
    /// never gets a real destination-local id written back, only the
    /// invalid sentinel, since no entry for it is ever committed.
    #[test]
    fn dropped_destination_writes_back_invalid_handle() {
        let sender = Peer::new(PeerId(1), 4096);
        let b = Peer::new(PeerId(3), 1); // one byte of pool capacity
        let mut registry = InMemoryRegistry::new();
        registry.insert(sender.clone());
        registry.insert(b.clone());

        let (node_b, _) = b.register_node();
        let handle_b = sender.seed_handle_for(node_b, b.id());

        let txn = Transaction::new_from_user(
            sender.clone(),
            params(Credentials::new(0, 0, 0, 0), b"hello", Flags::CONTINUE),
            Limits::default(),
        )
        .unwrap();

        let sink = std::sync::Arc::new(std::sync::Mutex::new(None));
        struct RecordingSink(std::sync::Arc<std::sync::Mutex<Option<HandleId>>>);
        impl IdSink for RecordingSink {
            fn write(&mut self, id: HandleId) -> Result<(), ()> {
                *self.0.lock().unwrap() = Some(id);
                Ok(())
            }
        }

        let outcome = txn.commit_for_id(&registry, handle_b, Box::new(RecordingSink(sink.clone()))).unwrap();
        assert!(!outcome.faulted());
        assert_eq!(sink.lock().unwrap().unwrap(), HandleId::INVALID);
        assert_eq!(b.dropped_count(), 1);
    }

    /// The C original's `bus1_transaction_commit_for_id` never touches
    /// `transaction->entries`; entries already instantiated through a
    /// separate `instantiate_for_id` call must survive a `commit_for_id`
    /// call for a different destination, not be silently abandoned.
    #[test]
    fn commit_for_id_does_not_disturb_other_pending_entries() {
        let sender = Peer::new(PeerId(1), 4096);
        let a = Peer::new(PeerId(2), 4096);
        let b = Peer::new(PeerId(3), 4096);
        let mut registry = InMemoryRegistry::new();
        registry.insert(sender.clone());
        registry.insert(a.clone());
        registry.insert(b.clone());

        let (node_a, _) = a.register_node();
        let handle_a = sender.seed_handle_for(node_a, a.id());
        let (node_b, _) = b.register_node();
        let handle_b = sender.seed_handle_for(node_b, b.id());

        let mut txn = Transaction::new_from_user(
            sender.clone(),
            params(Credentials::new(0, 0, 0, 0), b"x", Flags::empty()),
            Limits::default(),
        )
        .unwrap();
        txn.instantiate_for_id(&registry, handle_a, Box::new(HandleSlot::default())).unwrap();
        assert_eq!(a.pin_count(), 1);

        let outcome = txn.commit_for_id(&registry, handle_b, Box::new(HandleSlot::default())).unwrap();
        assert!(!outcome.faulted());
        assert_eq!(b.committed_payloads(), vec![b"x".to_vec()]);

        // `a`'s entry is untouched by the commit_for_id call above; dropping
        // the transaction now rolls it back rather than leaking its pin.
        assert_eq!(a.pin_count(), 1);
        assert!(a.committed_payloads().is_empty());
        drop(txn);
        assert_eq!(a.pin_count(), 0);
    }
}
