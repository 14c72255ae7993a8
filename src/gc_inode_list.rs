// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! GC inode list (spec §3 "GC inode list"): the per-round `ino →
//! inode-handle` cache that keeps a data-migration pass from re-pinning
//! the same inode once per block. Built at the start of a reclaim round
//! and torn down at its end, even on failure (spec §3 "Lifecycle").

use crate::collaborators::Ino;
use rustc_hash::FxHashMap;

/// Per-round `ino → inode-handle` map, with an insertion-ordered list for
/// deterministic teardown.
///
/// Invariant: each `ino` is inserted at most once per round; a second
/// insertion releases the duplicate handle instead of growing the list
/// (spec §3).
pub struct GcInodeList<H> {
    index: FxHashMap<Ino, usize>,
    order: Vec<H>,
}

impl<H> GcInodeList<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Index of `ino`'s handle, if it's already pinned this round.
    #[must_use]
    pub fn index_of(&self, ino: Ino) -> Option<usize> {
        self.index.get(&ino).copied()
    }

    /// Inserts a freshly-fetched handle for `ino`. If `ino` is already
    /// present, `release` runs on the duplicate and the existing entry's
    /// index is returned unchanged; otherwise `handle` is appended and its
    /// new index returned.
    pub fn insert_or_release(&mut self, ino: Ino, handle: H, release: impl FnOnce(H)) -> usize {
        if let Some(&idx) = self.index.get(&ino) {
            release(handle);
            idx
        } else {
            let idx = self.order.len();
            self.order.push(handle);
            self.index.insert(ino, idx);
            idx
        }
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut H {
        &mut self.order[idx]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tears down every pinned inode in insertion order, the "auxiliary
    /// ordered list for deterministic teardown" spec §3 calls for.
    pub fn teardown(self, mut release: impl FnMut(H)) {
        for handle in self.order {
            release(handle);
        }
    }
}

impl<H> Default for GcInodeList<H> {
    fn default() -> Self {
        Self::new()
    }
}
