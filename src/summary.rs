// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segment summary blocks (spec §3 "Summary block").

use crate::collaborators::{NodeId, NodeVersion};

/// Footer tag identifying what a segment's blocks are (spec §4.4 "Dispatch
/// on summary footer type").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SummaryFooterType {
    Node,
    Data,
}

/// One entry of a summary block: identifies the owner of the block at a
/// given segment-relative offset (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SummaryEntry {
    /// Owning node (inode or indirect node).
    pub nid: NodeId,

    /// Slot within the owning node that should point at this block.
    pub ofs_in_node: u32,

    /// Must match the node-table version for the entry to be live
    /// (spec §4.2).
    pub version: NodeVersion,
}

/// A per-segment table of `B` summary entries plus its footer tag.
#[derive(Clone, Debug)]
pub struct SummaryBlock {
    pub footer: SummaryFooterType,
    pub entries: Vec<SummaryEntry>,
}

impl SummaryBlock {
    #[must_use]
    pub fn new(footer: SummaryFooterType, entries: Vec<SummaryEntry>) -> Self {
        Self { footer, entries }
    }

    /// The summary entry at segment-relative offset `k`, if any.
    #[must_use]
    pub fn entry(&self, k: usize) -> Option<&SummaryEntry> {
        self.entries.get(k)
    }
}
