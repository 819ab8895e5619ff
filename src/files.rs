// SPDX-License-Identifier: GPL-2.0
//! File capability handles.
//!
//! `spec.md` §3: "the transaction owns each imported file capability exactly
//! once; on successful instantiation per destination, one additional
//! reference is taken for the message." The user-space file-descriptor
//! table and the real open-file-description refcount are out of scope
//! (`spec.md` §1); this is a cheap-clone refcounted stand-in sufficient to
//! verify the "no leaks" property (`spec.md` §8).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct FileCapInner {
    id: u64,
}

/// A reference-counted capability standing in for an imported file
/// descriptor.
#[derive(Debug, Clone)]
pub struct FileCap(Arc<FileCapInner>);

impl FileCap {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(FileCapInner {
            id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
        }))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// The number of outstanding references to this file capability,
    /// counting this clone.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl Default for FileCap {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for FileCap {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloning_increments_the_shared_refcount() {
        let a = FileCap::new();
        assert_eq!(a.strong_count(), 1);
        let b = a.clone();
        assert_eq!(a.strong_count(), 2);
        assert_eq!(b.strong_count(), 2);
        drop(b);
        assert_eq!(a.strong_count(), 1);
    }

    #[test]
    fn distinct_caps_have_distinct_ids() {
        let a = FileCap::new();
        let b = FileCap::new();
        assert_ne!(a.id(), b.id());
    }
}
