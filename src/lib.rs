// SPDX-License-Identifier: GPL-2.0
//! A multicast message transaction engine for a capability-passing IPC bus.
//!
//! A sender builds a [`transaction::Transaction`] from its send-call
//! parameters ([`params::SendParams`]), resolves one [`handle::HandleId`]
//! per destination via [`transaction::Transaction::instantiate_for_id`],
//! and finalizes the whole multicast with
//! [`transaction::Transaction::commit`]. Every destination becomes visible
//! under the same logical timestamp, or none do: an uncommitted
//! transaction unwinds every destination it touched when dropped.
//!
//! The peer registry, per-peer queue, handle table, and slice pool this
//! engine drives are reference implementations of collaborators that, in
//! the system this crate models, live elsewhere; see [`peer`], [`queue`],
//! [`handle`], and [`pool`] respectively.

pub mod config;
pub mod credentials;
pub mod error;
pub mod files;
pub mod handle;
pub mod message;
pub mod params;
pub mod peer;
pub mod pool;
pub mod queue;
pub mod transaction;
pub mod userio;

pub use error::{TxnError, TxnResult};
pub use params::{Flags, SendParams};
pub use peer::{InMemoryRegistry, Peer, PeerId, PeerRegistry};
pub use transaction::{CommitOutcome, CommitStatus, Transaction};
