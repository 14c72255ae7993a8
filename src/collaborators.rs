// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Traits modeling the external collaborators the engine calls into
//! (spec §6). Only their interfaces are in scope; the superblock parser,
//! checkpoint writer, block allocator, page cache, node/inode table,
//! SIT storage, read-ahead layer and device are all implemented
//! elsewhere and injected here. `src/testkit.rs` provides an in-memory
//! implementation of every trait for the engine's own test suite.
//!
//! Per the "Global mutable state" design note (spec §9), a single
//! generic struct ([`crate::driver::Mount`]) threads one instance of each
//! trait through every operation instead of relying on ambient globals.

use crate::error::Result;
use crate::segment::{SegEntry, SegmentId};
use crate::summary::SummaryBlock;

/// Node identifier (inode or indirect node).
pub type NodeId = u64;

/// Physical block address on the underlying device.
pub type BlockAddr = u64;

/// Inode number.
pub type Ino = u64;

/// Node-table version, used to detect stale summary entries (spec §4.2).
pub type NodeVersion = u32;

/// Information about a node, as reported by the node layer (spec §6
/// `get_node_info`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub version: NodeVersion,
    pub blk_addr: BlockAddr,
    pub ino: Ino,
}

/// An in-memory handle on a fetched node page. Opaque to the engine
/// beyond the operations below.
pub trait NodePage {
    /// Offset of this node within its owning inode's node tree
    /// (spec §4.2 "nofs").
    fn ofs_of_node(&self) -> u32;

    /// The block address currently stored at `ofs` within this node.
    fn datablock_addr(&self, ofs: u32) -> BlockAddr;

    /// Rewrites the block address stored at `ofs` (used by the migrator
    /// to repoint node indirection at the new physical location).
    fn set_datablock_addr(&mut self, ofs: u32, addr: BlockAddr);
}

/// Segment-information-table accessor (spec §6).
///
/// Per-segment storage (the bitmap, mtime, checkpoint snapshot) lives
/// outside the engine; `SitAccessor` is the read/write seam into it.
pub trait SitAccessor {
    /// Total number of segments known to the filesystem.
    fn segment_count(&self) -> u32;

    /// Fetches the current metadata for one segment.
    fn get_seg_entry(&self, segno: SegmentId) -> Result<SegEntry>;

    /// Sum of valid-block counts across `span` consecutive segments
    /// starting at `segno` (used by the Greedy/LFS cost function).
    fn get_valid_blocks(&self, segno: SegmentId, span: u32) -> Result<u32>;

    /// The segment's summary block, recording which node owns each of its
    /// `B` blocks (spec §3 "Summary block").
    fn get_summary_block(&self, segno: SegmentId) -> Result<SummaryBlock>;
}

/// Node layer (spec §6).
pub trait NodeManager {
    type Page: NodePage;

    /// Synchronously fetches and locks the node page for `nid`.
    fn get_node_page(&self, nid: NodeId) -> Result<Self::Page>;

    /// Issues an asynchronous prefetch; errors are swallowed by callers
    /// per spec §7 (read-ahead failures just mean a later synchronous
    /// fetch pays the full cost).
    fn ra_node_page(&self, nid: NodeId);

    fn get_node_info(&self, nid: NodeId) -> Result<NodeInfo>;

    /// Persists a dirtied node page. On the foreground path the engine
    /// waits for this to complete before returning from the migrator.
    fn write_node_page(&self, page: &Self::Page) -> Result<()>;
}

/// A handle on an inode, pinned for the duration of migration.
pub trait InodeHandle {
    fn ino(&self) -> Ino;
    fn is_encrypted(&self) -> bool;
    fn is_regular(&self) -> bool;

    /// This inode's addresses-per-inode `A` (spec §4.2's final decode
    /// step): how many direct data-block slots the inode block itself
    /// carries, which varies per inode with how much of the block is
    /// spent on extra attributes.
    fn addrs_per_inode(&self) -> u32;

    /// Marks the inode as having appended data during this round
    /// (spec §4.3 "the inode's `appended` flag is set").
    fn mark_appended(&mut self);

    /// Marks the inode as having had its first block written
    /// (spec §4.3, only when the rewritten index is 0).
    fn mark_first_block_written(&mut self);
}

/// Inode layer (spec §6).
pub trait InodeManager {
    type Handle: InodeHandle;

    fn iget(&self, ino: Ino) -> Result<Self::Handle>;
    fn iput(&self, handle: Self::Handle);
}

/// Page-cache residency state for a data block, used to classify the
/// migration strategy in data-migration phase 2/3 (spec §4.3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CacheState {
    /// Page is resident and dirty: must be read (if not already in
    /// memory) and fully rewritten.
    Dirty,
    /// Page is resident and clean: bytes are already known-good, so a
    /// remap write avoids the read.
    Clean,
    /// Page isn't cached: a remap write is equally cheap, since there's
    /// nothing to preserve by reading.
    Uncached,
}

/// Page cache (spec §6).
pub trait PageCache {
    type Data;

    fn grab_cache_page(&self, ino: Ino, bidx: u64) -> Result<Self::Data>;
    fn get_cached_data_page(&self, ino: Ino, bidx: u64) -> Option<Self::Data>;
    fn get_lock_data_page(&self, ino: Ino, bidx: u64) -> Result<Self::Data>;

    fn cache_state(&self, ino: Ino, bidx: u64) -> CacheState;

    fn wait_on_writeback(&self, page: &Self::Data);
    fn clear_dirty_for_io(&self, page: &Self::Data);
    fn set_page_dirty(&self, page: &Self::Data);

    /// Raw page contents, needed whenever the migrator can't avoid a full
    /// read-and-rewrite (spec §4.3 phases where a remap isn't allowed).
    fn page_bytes<'a>(&self, page: &'a Self::Data) -> &'a [u8];
}

/// Block allocator (spec §6).
pub trait Allocator {
    /// Allocates a fresh physical block for a relocated block, writing
    /// `data` (if `Some`) or performing a bare remap (if `None`), and
    /// updates the destination segment's summary. Returns the new
    /// physical address.
    fn allocate_data_block(
        &self,
        src_addr: BlockAddr,
        data: Option<&[u8]>,
        dest_class: crate::segment::DirtyClass,
    ) -> Result<BlockAddr>;

    /// Submits the merged write batch accumulated during one reclaim
    /// round (spec §5 "single plugged bio batch").
    fn submit_write_batch(&self) -> Result<()>;
}

/// Checkpoint / mount-state collaborator (spec §6).
pub trait Checkpoint {
    fn write_checkpoint(&self) -> Result<()>;
    fn prefree_segments(&self) -> u32;
    fn free_segments(&self) -> u32;
    fn has_not_enough_free_secs(&self, extra: u32) -> bool;
    fn is_idle(&self) -> bool;
    fn is_frozen(&self) -> bool;
    fn is_unmounting(&self) -> bool;

    /// Periodic metadata balancing, called once per background
    /// reclaimer tick (spec §4.5 step 7).
    fn balance_metadata(&self);
}

/// Vendor-specific "tell the device about an impending reclaim range"
/// hint (spec §6 "Optional device hint", §9). Ignorable on any device
/// without the capability; the default build compiles calls to this to
/// a no-op so the call site always exists regardless of the `ssd-hint`
/// feature.
pub trait DeviceHint {
    fn reclaim_hint_start(&self, _lba: u64) {}
    fn reclaim_hint_end(&self, _lba: u64) {}
}

/// No-op implementor, used whenever the `ssd-hint` feature is disabled
/// or a collaborator set doesn't wire up a real device hint.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoDeviceHint;

impl DeviceHint for NoDeviceHint {}

/// Logs the reclaim-range hint instead of forwarding it to a real device,
/// gated behind the `ssd-hint` feature so the crate can exercise the call
/// sites without depending on a vendor ioctl (spec §6 "Optional device
/// hint").
#[cfg(feature = "ssd-hint")]
#[derive(Copy, Clone, Debug, Default)]
pub struct SsdHint;

#[cfg(feature = "ssd-hint")]
impl DeviceHint for SsdHint {
    fn reclaim_hint_start(&self, lba: u64) {
        log::trace!("ssd-hint: reclaim range start lba={lba}");
    }

    fn reclaim_hint_end(&self, lba: u64) {
        log::trace!("ssd-hint: reclaim range end lba={lba}");
    }
}
