// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Validity cross-checker (spec §4.2 "Validity cross-checker").
//!
//! A summary entry on its own is just a claim ("block `k` belongs to node
//! `nid`, slot `ofs_in_node`"); this module confirms the claim still holds
//! against the live node/inode metadata before a block is migrated, and
//! decodes a node's tree offset back into the logical block index a data
//! block would occupy within its file.

use crate::collaborators::{BlockAddr, NodeManager, NodePage};
use crate::error::Result;
use crate::summary::SummaryEntry;

/// Direct node pointers per indirect node, ported from f2fs's
/// `NIDS_PER_BLOCK` (4096-byte node page, 4-byte pointers, minus the node
/// footer). Fixed for the lifetime of a filesystem image.
pub const NIDS_PER_BLOCK: u32 = 1018;

/// Data-block addresses per direct node, ported from f2fs's
/// `ADDRS_PER_BLOCK`. Numerically identical to `NIDS_PER_BLOCK` (same
/// 4096-byte page, same 4-byte pointer width, same node footer), but kept
/// as its own name since the two count different things.
pub const ADDRS_PER_BLOCK: u32 = NIDS_PER_BLOCK;

/// Decodes a node's offset within its inode's node tree (`node_ofs`, as
/// reported by [`NodePage::ofs_of_node`]) into the logical block index of
/// the first data block that node is responsible for.
///
/// Ported from f2fs's `start_bidx_of_node`: offset 0 is the inode itself;
/// offsets 1-2 are direct nodes; offsets up to `2N+4` sit under the first
/// two single/double indirect levels; beyond that, the triple-indirect
/// level repeats the same `N+1`-sized stride indefinitely. The
/// node-relative index is then scaled by `ADDRS_PER_BLOCK` and offset by
/// `addrs_per_inode` (the inode's own address-per-inode `A`, which varies
/// per inode with how much of the inode block is spent on extra
/// attributes), per spec §4.2's final "multiply... and add `A`" step.
#[must_use]
pub fn start_bidx_of_node(node_ofs: u32, addrs_per_inode: u32) -> u64 {
    let n = u64::from(NIDS_PER_BLOCK);
    let ofs = u64::from(node_ofs);

    let bidx = if ofs == 0 {
        0
    } else if ofs <= 2 {
        ofs - 1
    } else if ofs <= 2 * n + 4 {
        ofs - 2 - (ofs - 4) / (n + 1)
    } else {
        ofs - 5 - (ofs - (2 * n + 4) - 3) / (n + 1)
    };

    bidx * u64::from(ADDRS_PER_BLOCK) + u64::from(addrs_per_inode)
}

/// Whether a node-block summary entry still points at a live node: the
/// node-table's current version for `nid` must match the version recorded
/// in the summary when the block was written (spec §4.2).
pub fn is_valid_node_block<N: NodeManager>(nodes: &N, entry: &SummaryEntry) -> Result<bool> {
    let info = nodes.get_node_info(entry.nid)?;
    Ok(info.version == entry.version)
}

/// Whether a data-block summary entry still points at a live block: the
/// owning node must still carry `addr` at slot `ofs_in_node` (spec §4.2).
///
/// `addr` is the physical address the block currently occupies (i.e. the
/// segment being scanned); if the node's indirection table points
/// somewhere else, the block was already overwritten or truncated and is
/// stale.
pub fn is_valid_data_block<N: NodeManager>(
    nodes: &N,
    entry: &SummaryEntry,
    addr: BlockAddr,
) -> Result<bool> {
    let page = nodes.get_node_page(entry.nid)?;
    Ok(page.datablock_addr(entry.ofs_in_node) == addr)
}

/// The logical file block index a data block owned by `nid` at
/// `ofs_in_node` occupies, given the owning node's tree offset and the
/// owning inode's addresses-per-inode `A`.
#[must_use]
pub fn logical_bidx(node_ofs: u32, ofs_in_node: u32, addrs_per_inode: u32) -> u64 {
    start_bidx_of_node(node_ofs, addrs_per_inode) + u64::from(ofs_in_node)
}
