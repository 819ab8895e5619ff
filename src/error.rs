// SPDX-License-Identifier: GPL-2.0
//! Failure codes surfaced by the transaction engine (`spec.md` §6-§7).

use thiserror::Error;

/// Result alias used throughout the crate.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors a caller of the transaction engine can observe.
///
/// Sender-caused and target-caused (non-`CONTINUE`) errors abort whatever
/// call produced them; race-caused errors never abort and are instead
/// latched into [`crate::transaction::CommitOutcome`].
#[derive(Debug, Error)]
pub enum TxnError {
    /// Allocation failed (stack buffer too small and heap allocation failed,
    /// or a destination pool could not be allocated at all).
    #[error("no memory available to satisfy the request")]
    NoMemory,

    /// The supplied handle id does not resolve to a reachable node.
    #[error("handle id does not resolve to a reachable node")]
    InvalidHandle,

    /// The destination peer has already shut down.
    #[error("destination peer has shut down")]
    PeerShutdown,

    /// The destination's pool is full. Promoted to a silent drop when the
    /// sender set [`crate::params::Flags::CONTINUE`].
    #[error("destination pool quota exceeded")]
    QuotaExceeded,

    /// Lost a race with node destruction between staging and commit. Always
    /// silent by the time it reaches a caller-visible return code.
    #[error("destination unreachable due to a race with node destruction")]
    Unreachable,

    /// A user-memory access (payload copy or id write-back) faulted.
    #[error("user-memory access faulted")]
    Fault,

    /// `n_vecs` exceeded the configured maximum.
    #[error("{0} vectors exceeds the configured maximum of {1}")]
    TooManyVecs(usize, usize),

    /// `n_fds` exceeded the configured maximum.
    #[error("{0} file descriptors exceeds the configured maximum of {1}")]
    TooManyFds(usize, usize),

    /// The sum of vector lengths overflowed the configured maximum payload
    /// size.
    #[error("payload length {0} exceeds the configured maximum of {1}")]
    PayloadTooLarge(usize, usize),

    /// Importing a file capability failed.
    #[error("failed to import file descriptor at index {0}")]
    BadFile(usize),

    /// Failed to read or parse a configuration file.
    #[cfg(feature = "config")]
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error while loading configuration.
    #[cfg(feature = "config")]
    #[error("I/O error loading configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl TxnError {
    /// Whether this error represents a target-caused failure that
    /// `Flags::CONTINUE` downgrades to a silent per-destination drop
    /// (`spec.md` §7, stratum 2).
    #[must_use]
    pub fn is_target_caused(&self) -> bool {
        matches!(self, TxnError::QuotaExceeded | TxnError::PeerShutdown)
    }
}
