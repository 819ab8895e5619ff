// SPDX-License-Identifier: GPL-2.0
//! Configurable limits (`SPEC_FULL.md` §4.9: ambient configuration layer).
//!
//! Loading from TOML is gated behind the `config` feature so that embedders
//! who only want the in-memory defaults don't pull in `serde`/`toml`.

use crate::params::{FD_MAX, VEC_MAX};

/// Per-instance overrides of the spec's hard-coded limits. Fields mirror
/// `spec.md` §4.1's edge cases and §4.3 step 4's quota check.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct Limits {
    pub vec_max: usize,
    pub fd_max: usize,
    pub max_payload_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            vec_max: VEC_MAX,
            fd_max: FD_MAX,
            max_payload_size: 1 << 20,
        }
    }
}

#[cfg(feature = "config")]
impl Limits {
    /// Parses limits from a TOML document, falling back to
    /// [`Limits::default`] for any field left unspecified.
    pub fn from_toml_str(s: &str) -> crate::error::TxnResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses limits from a file on disk.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> crate::error::TxnResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
