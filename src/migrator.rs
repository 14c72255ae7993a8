// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block migration (spec §4.3): moves one still-live block out of a
//! victim segment, after the validity cross-checker has confirmed it's
//! worth moving at all.
//!
//! Node, plain-data and encrypted-data migration are really one shape —
//! validate, decide whether a remap suffices or a full read-and-rewrite is
//! required, then hand off to the allocator — collapsed here into a single
//! `remap_allowed: bool` decision per the "Collapsing the per-kind
//! migration paths" design note (spec §9), rather than three near-duplicate
//! functions.

use crate::collaborators::{
    Allocator, BlockAddr, CacheState, InodeHandle, InodeManager, NodeManager, NodePage, PageCache,
};
use crate::error::Result;
use crate::gc_inode_list::GcInodeList;
use crate::segment::DirtyClass;
use crate::summary::SummaryEntry;
use crate::validity;

/// Outcome of attempting to migrate one block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The summary entry was stale; nothing to do.
    Stale,
    /// The block was relocated via a bare remap (no data read).
    Remapped(BlockAddr),
    /// The block was relocated by a full read-and-rewrite.
    Rewritten(BlockAddr),
}

/// Migrates one node block (spec §4.3 "Node migration").
///
/// Node pages are always small and already resident once fetched, so
/// there's no cache-state decision to make: a stale entry is skipped, a
/// live one is always rewritten in full (a node's indirection must be
/// read to be walked, so a bare remap buys nothing).
pub fn migrate_node_block<N: NodeManager>(
    nodes: &N,
    allocator: &impl Allocator,
    entry: &SummaryEntry,
    src_addr: BlockAddr,
    dest_class: DirtyClass,
) -> Result<MigrationOutcome> {
    if !validity::is_valid_node_block(nodes, entry)? {
        return Ok(MigrationOutcome::Stale);
    }

    nodes.ra_node_page(entry.nid);
    let page = nodes.get_node_page(entry.nid)?;

    let new_addr = allocator.allocate_data_block(src_addr, None, dest_class)?;
    nodes.write_node_page(&page)?;

    Ok(MigrationOutcome::Rewritten(new_addr))
}

/// Migrates one data block (spec §4.3 "Data migration").
///
/// `gc_inodes` is the round's [`GcInodeList`] (spec §3): the owning inode
/// is pinned at most once per round regardless of how many of its blocks
/// this segment holds, and its `appended` / `first-block-written` flags
/// (spec §4.3's common migrator contract) are set here rather than by the
/// caller.
///
/// Cache residency decides the strategy: an encrypted regular file's
/// ciphertext can only be reproduced by the page-cache/crypto layer, so
/// it always takes the full read-and-rewrite path (spec §4.3 "Encrypted
/// data migration") regardless of cache state; otherwise
/// [`CacheState::Dirty`] needs the in-memory bytes folded in before the
/// rewrite, while [`CacheState::Clean`] and [`CacheState::Uncached`] are
/// cheaper as a bare remap.
#[allow(clippy::too_many_arguments)]
pub fn migrate_data_block<N, I, C, A>(
    nodes: &N,
    inodes: &I,
    gc_inodes: &mut GcInodeList<I::Handle>,
    cache: &C,
    allocator: &A,
    entry: &SummaryEntry,
    src_addr: BlockAddr,
    node_ofs: u32,
    dest_class: DirtyClass,
) -> Result<MigrationOutcome>
where
    N: NodeManager,
    I: InodeManager,
    C: PageCache,
    A: Allocator,
{
    if !validity::is_valid_data_block(nodes, entry, src_addr)? {
        return Ok(MigrationOutcome::Stale);
    }

    let info = nodes.get_node_info(entry.nid)?;

    let idx = pin_inode(inodes, gc_inodes, info.ino)?;
    let handle = gc_inodes.get_mut(idx);
    let encrypted = handle.is_encrypted();
    let addrs_per_inode = handle.addrs_per_inode();
    let bidx = validity::logical_bidx(node_ofs, entry.ofs_in_node, addrs_per_inode);

    let state = cache.cache_state(info.ino, bidx);
    let remap_allowed = !encrypted && state != CacheState::Dirty;

    let (outcome, new_addr) = if remap_allowed {
        let new_addr = allocator.allocate_data_block(src_addr, None, dest_class)?;
        (MigrationOutcome::Remapped(new_addr), new_addr)
    } else {
        let page = cache.get_lock_data_page(info.ino, bidx)?;
        cache.wait_on_writeback(&page);

        let bytes = cache.page_bytes(&page).to_vec();
        let new_addr = allocator.allocate_data_block(src_addr, Some(&bytes), dest_class)?;

        cache.clear_dirty_for_io(&page);
        (MigrationOutcome::Rewritten(new_addr), new_addr)
    };

    // Repoint the owning node's indirection at the relocated block (spec
    // §4.3's common migrator contract; spec §8 "Migration conservation").
    let mut owner = nodes.get_node_page(entry.nid)?;
    owner.set_datablock_addr(entry.ofs_in_node, new_addr);
    nodes.write_node_page(&owner)?;

    let handle = gc_inodes.get_mut(idx);
    handle.mark_appended();
    if bidx == 0 {
        handle.mark_first_block_written();
    }

    Ok(outcome)
}

/// Pins `ino` in the round's inode list, fetching it only the first time
/// it's needed (spec §3 "GC inode list").
fn pin_inode<I: InodeManager>(
    inodes: &I,
    gc_inodes: &mut GcInodeList<I::Handle>,
    ino: crate::collaborators::Ino,
) -> Result<usize> {
    if let Some(idx) = gc_inodes.index_of(ino) {
        return Ok(idx);
    }
    let handle = inodes.iget(ino)?;
    Ok(gc_inodes.insert_or_release(ino, handle, |h| inodes.iput(h)))
}
