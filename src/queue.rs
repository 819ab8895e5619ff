// SPDX-License-Identifier: GPL-2.0
//! Per-peer ordered queue: the logical clock and the five primitives the
//! transaction engine drives against it (`spec.md` §4.4).
//!
//! Out of scope per `spec.md` §1 ("referenced only through their
//! contracts"); this is the in-process reference implementation the engine
//! needs to actually run and be tested against.

use std::collections::HashMap;

use tracing::trace;

use crate::message::{DeliveredMessage, MessageId};

struct Slot {
    timestamp: u64,
    committed: bool,
    message: Option<DeliveredMessage>,
}

/// One peer's monotonic logical clock plus its staged/committed entries.
///
/// Timestamps are dense 64-bit integers; a staged entry at timestamp `t`
/// blocks any committed entry at `>= t` from becoming visible, which is
/// what makes the two-phase commit protocol in `spec.md` §4.5 produce a
/// consistent global order without a central sequencer.
#[derive(Default)]
pub struct Queue {
    clock: u64,
    slots: HashMap<MessageId, Slot>,
}

impl Queue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of this peer's logical clock.
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Atomically advances the clock and returns the new value.
    pub fn tick(&mut self) -> u64 {
        self.clock += 1;
        trace!(clock = self.clock, "tick");
        self.clock
    }

    /// Advances the clock to at least `t`; returns the resulting value.
    pub fn sync(&mut self, t: u64) -> u64 {
        if t > self.clock {
            self.clock = t;
        }
        trace!(clock = self.clock, synced_to = t, "sync");
        self.clock
    }

    fn earliest(&self) -> Option<u64> {
        self.slots.values().map(|s| s.timestamp).min()
    }

    /// Inserts `id` as a staged (invisible) entry at timestamp `t`. Returns
    /// `true` iff this entry is now the earliest pending one, signalling
    /// that a receiver blocked on "what's next" should be woken
    /// (`spec.md` §4.4).
    pub(crate) fn stage(&mut self, id: MessageId, t: u64) -> bool {
        let became_head = self.earliest().map_or(true, |e| t <= e);
        self.slots.insert(
            id,
            Slot {
                timestamp: t,
                committed: false,
                message: None,
            },
        );
        trace!(id = id.0, timestamp = t, became_head, "stage");
        became_head
    }

    /// Promotes a staged entry to committed at timestamp `t`, attaching the
    /// now-finalized message content. Returns `message` back to the caller
    /// if `id` is no longer present (the receiver raced us and destroyed
    /// the node between staging and commit — `spec.md` §4.6, §9's open
    /// question): the caller owns cleanup of the slice/handles/files in
    /// that case, since this queue never took them.
    pub(crate) fn commit(&mut self, id: MessageId, t: u64, message: DeliveredMessage) -> Result<(), DeliveredMessage> {
        let Some(slot) = self.slots.get_mut(&id) else {
            trace!(id = id.0, timestamp = t, "commit missed slot");
            return Err(message);
        };
        slot.timestamp = t;
        slot.committed = true;
        slot.message = Some(message);
        trace!(id = id.0, timestamp = t, "commit");
        Ok(())
    }

    /// Detaches `id` if still present, staged or committed. Returns whether
    /// it was present (used to decide whether a wakeup is warranted).
    pub(crate) fn remove(&mut self, id: MessageId) -> bool {
        let existed = self.slots.remove(&id).is_some();
        trace!(id = id.0, existed, "remove");
        existed
    }

    /// Whether `id` is still present (staged or committed).
    #[must_use]
    pub(crate) fn contains(&self, id: MessageId) -> bool {
        self.slots.contains_key(&id)
    }

    /// The committed, visible entries in this queue, ordered by commit
    /// timestamp.
    #[must_use]
    pub fn committed(&self) -> Vec<(u64, &DeliveredMessage)> {
        let mut out: Vec<_> = self
            .slots
            .values()
            .filter(|s| s.committed)
            .filter_map(|s| s.message.as_ref().map(|m| (s.timestamp, m)))
            .collect();
        out.sort_by_key(|(ts, _)| *ts);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_strictly_increasing() {
        let mut q = Queue::new();
        let a = q.tick();
        let b = q.tick();
        assert!(b > a);
    }

    #[test]
    fn sync_never_moves_the_clock_backwards() {
        let mut q = Queue::new();
        q.tick();
        q.tick();
        let before = q.clock();
        assert_eq!(q.sync(1), before);
        assert_eq!(q.sync(before + 10), before + 10);
    }

    #[test]
    fn commit_without_prior_stage_is_a_silent_no_op() {
        let mut q = Queue::new();
        let id = MessageId::new();
        let delivered = super::super::message::DeliveredMessage {
            header: crate::message::MessageHeader {
                uid: 0,
                gid: 0,
                pid: 0,
                tid: 0,
                destination: None,
                payload_len: 0,
            },
            slice: crate::pool::SlicePool::new(16).alloc(0).unwrap(),
            files: vec![],
            handles: vec![],
            silent: false,
        };
        assert!(q.commit(id, 1, delivered).is_err());
    }

    #[test]
    fn remove_reports_presence() {
        let mut q = Queue::new();
        let id = MessageId::new();
        assert!(!q.remove(id));
        q.stage(id, 1);
        assert!(q.remove(id));
        assert!(!q.contains(id));
    }
}
