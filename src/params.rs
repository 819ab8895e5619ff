// SPDX-License-Identifier: GPL-2.0
//! Send-call parameters and flags (`spec.md` §4.1, §6).

use bitflags::bitflags;

use crate::credentials::Credentials;
use crate::files::FileCap;
use crate::handle::HandleId;
use crate::userio::UserVec;

bitflags! {
    /// Flags a sender passes alongside a send call (`spec.md` §4.1, §7).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// Deliver the message without waking a blocked reader; a silent
        /// send still participates in ordering.
        const SILENT = 1 << 0;
        /// Downgrade a per-destination quota failure to a silent drop for
        /// that destination instead of failing the whole transaction
        /// (`spec.md` §4.3 step 4, §4.5, §7).
        const CONTINUE = 1 << 1;
    }
}

/// Upper bound on the number of payload vectors a single send may carry
/// (`spec.md` §4.1 edge cases). Overridable via [`crate::config::Limits`].
pub const VEC_MAX: usize = 65_535;

/// Upper bound on the number of file descriptors a single send may carry
/// (`spec.md` §4.1 edge cases). Overridable via [`crate::config::Limits`].
pub const FD_MAX: usize = 65_535;

/// How a payload vector's bytes are sourced, cosmetic at this layer
/// (`spec.md` §4.1: "Backing (inline vs. heap) is a transport decision").
/// Carried on [`SendParams`] and copied onto the [`crate::transaction::Transaction`]
/// built from it purely so the decision survives as far as the import-time
/// log line; it otherwise has no effect on how the payload is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Inline,
    Heap,
}

impl Default for Backing {
    fn default() -> Self {
        Backing::Inline
    }
}

/// The arguments to a single multicast send call, gathered from user space
/// before a [`crate::transaction::Transaction`] is constructed from them.
pub struct SendParams {
    pub vecs: Vec<Box<dyn UserVec>>,
    pub files: Vec<FileCap>,
    pub handles: Vec<HandleId>,
    pub flags: Flags,
    pub cred: Credentials,
    pub backing: Backing,
}
