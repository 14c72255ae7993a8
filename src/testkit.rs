// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! In-memory implementations of every collaborator trait (spec §6), used
//! by this crate's own test suite so `driver`/`background` can be
//! exercised without a real filesystem underneath them.

use crate::bitmap::Bitmap;
use crate::collaborators::{
    Allocator, BlockAddr, CacheState, Checkpoint, Ino, InodeHandle, InodeManager, NodeId,
    NodeInfo, NodeManager, NodePage, PageCache,
};
use crate::error::Result;
use crate::segment::{BlockCategory, SegEntry, SegmentId, SegmentType, Temperature};
use crate::summary::{SummaryBlock, SummaryFooterType};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;

/// A segment-information table entirely held in memory.
pub struct FakeSit {
    entries: Vec<SegEntry>,
    summaries: Vec<SummaryBlock>,
}

impl FakeSit {
    #[must_use]
    pub fn new(segment_count: u32, blocks_per_seg: usize) -> Self {
        let entries = (0..segment_count)
            .map(|_| SegEntry {
                mtime: 0,
                cur_valid_map: Bitmap::with_len(blocks_per_seg),
                ckpt_valid_blocks: 0,
                seg_type: SegmentType::new(BlockCategory::Data, Temperature::Cold),
            })
            .collect();
        let summaries = (0..segment_count)
            .map(|_| SummaryBlock::new(SummaryFooterType::Data, vec![]))
            .collect();

        Self { entries, summaries }
    }

    pub fn set_entry(&mut self, segno: SegmentId, entry: SegEntry) {
        self.entries[segno.0 as usize] = entry;
    }

    pub fn set_summary(&mut self, segno: SegmentId, summary: SummaryBlock) {
        self.summaries[segno.0 as usize] = summary;
    }
}

impl crate::collaborators::SitAccessor for FakeSit {
    fn segment_count(&self) -> u32 {
        self.entries.len() as u32
    }

    fn get_seg_entry(&self, segno: SegmentId) -> Result<SegEntry> {
        Ok(self.entries[segno.0 as usize].clone())
    }

    fn get_valid_blocks(&self, segno: SegmentId, span: u32) -> Result<u32> {
        Ok((segno.0..segno.0 + span)
            .map(|i| self.entries[i as usize].live_blocks())
            .sum())
    }

    fn get_summary_block(&self, segno: SegmentId) -> Result<SummaryBlock> {
        Ok(self.summaries[segno.0 as usize].clone())
    }
}

#[derive(Clone)]
pub struct FakeNodePage {
    pub nid: NodeId,
    pub ofs: u32,
    pub addrs: Vec<BlockAddr>,
}

impl NodePage for FakeNodePage {
    fn ofs_of_node(&self) -> u32 {
        self.ofs
    }

    fn datablock_addr(&self, ofs: u32) -> BlockAddr {
        self.addrs.get(ofs as usize).copied().unwrap_or(0)
    }

    fn set_datablock_addr(&mut self, ofs: u32, addr: BlockAddr) {
        if let Some(slot) = self.addrs.get_mut(ofs as usize) {
            *slot = addr;
        }
    }
}

/// Node table entirely held in memory; nodes not explicitly registered
/// fall back to version 0 / ino 0 / an empty page, which is enough for
/// tests that never reach a node's data.
#[derive(Default)]
pub struct FakeNodes {
    info: Mutex<HashMap<NodeId, NodeInfo>>,
    pages: Mutex<HashMap<NodeId, FakeNodePage>>,
}

impl FakeNodes {
    pub fn register(&self, nid: NodeId, info: NodeInfo, page: FakeNodePage) {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.info.lock().expect("lock is poisoned").insert(nid, info);
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.pages.lock().expect("lock is poisoned").insert(nid, page);
    }
}

impl NodeManager for FakeNodes {
    type Page = FakeNodePage;

    fn get_node_page(&self, nid: NodeId) -> Result<Self::Page> {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let pages = self.pages.lock().expect("lock is poisoned");
        Ok(pages.get(&nid).cloned().unwrap_or(FakeNodePage {
            nid,
            ofs: 0,
            addrs: vec![],
        }))
    }

    fn ra_node_page(&self, _nid: NodeId) {}

    fn get_node_info(&self, nid: NodeId) -> Result<NodeInfo> {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let info = self.info.lock().expect("lock is poisoned");
        Ok(info.get(&nid).copied().unwrap_or(NodeInfo {
            version: 0,
            blk_addr: 0,
            ino: 0,
        }))
    }

    fn write_node_page(&self, page: &Self::Page) -> Result<()> {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.pages.lock().expect("lock is poisoned").insert(page.nid, page.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeInodeHandle {
    pub ino: Ino,
    pub encrypted: bool,
    pub addrs_per_inode: u32,
}

impl InodeHandle for FakeInodeHandle {
    fn ino(&self) -> Ino {
        self.ino
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn is_regular(&self) -> bool {
        true
    }

    fn addrs_per_inode(&self) -> u32 {
        self.addrs_per_inode
    }

    fn mark_appended(&mut self) {}
    fn mark_first_block_written(&mut self) {}
}

/// Inode table entirely held in memory.
#[derive(Default)]
pub struct FakeInodes {
    encrypted: Mutex<HashMap<Ino, bool>>,
}

impl FakeInodes {
    pub fn mark_encrypted(&self, ino: Ino) {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.encrypted.lock().expect("lock is poisoned").insert(ino, true);
    }
}

impl InodeManager for FakeInodes {
    type Handle = FakeInodeHandle;

    fn iget(&self, ino: Ino) -> Result<Self::Handle> {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let encrypted = self
            .encrypted
            .lock()
            .expect("lock is poisoned")
            .get(&ino)
            .copied()
            .unwrap_or(false);
        Ok(FakeInodeHandle { ino, encrypted })
    }

    fn iput(&self, _handle: Self::Handle) {}
}

/// Page cache entirely held in memory; every block not explicitly seeded
/// reports as [`CacheState::Uncached`].
#[derive(Default)]
pub struct FakeCache {
    pages: Mutex<HashMap<(Ino, u64), Vec<u8>>>,
    states: Mutex<HashMap<(Ino, u64), CacheState>>,
}

impl FakeCache {
    pub fn seed(&self, ino: Ino, bidx: u64, bytes: Vec<u8>, state: CacheState) {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.pages.lock().expect("lock is poisoned").insert((ino, bidx), bytes);
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.states.lock().expect("lock is poisoned").insert((ino, bidx), state);
    }
}

impl PageCache for FakeCache {
    type Data = Vec<u8>;

    fn grab_cache_page(&self, ino: Ino, bidx: u64) -> Result<Self::Data> {
        self.get_lock_data_page(ino, bidx)
    }

    fn get_cached_data_page(&self, ino: Ino, bidx: u64) -> Option<Self::Data> {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.pages.lock().expect("lock is poisoned").get(&(ino, bidx)).cloned()
    }

    fn get_lock_data_page(&self, ino: Ino, bidx: u64) -> Result<Self::Data> {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        Ok(self
            .pages
            .lock()
            .expect("lock is poisoned")
            .get(&(ino, bidx))
            .cloned()
            .unwrap_or_default())
    }

    fn cache_state(&self, ino: Ino, bidx: u64) -> CacheState {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.states
            .lock()
            .expect("lock is poisoned")
            .get(&(ino, bidx))
            .copied()
            .unwrap_or(CacheState::Uncached)
    }

    fn wait_on_writeback(&self, _page: &Self::Data) {}
    fn clear_dirty_for_io(&self, _page: &Self::Data) {}
    fn set_page_dirty(&self, _page: &Self::Data) {}

    fn page_bytes<'a>(&self, page: &'a Self::Data) -> &'a [u8] {
        page
    }
}

/// Block allocator that just records calls and hands back a
/// deterministic offset address, plus a destination bitmap if a caller
/// wants to assert on `dest_class` routing.
#[derive(Default)]
pub struct FakeAllocator {
    pub calls: RefCell<Vec<(BlockAddr, bool)>>,
    next_addr: RefCell<BlockAddr>,
}

impl Allocator for FakeAllocator {
    fn allocate_data_block(
        &self,
        src_addr: BlockAddr,
        data: Option<&[u8]>,
        _dest_class: crate::segment::DirtyClass,
    ) -> Result<BlockAddr> {
        self.calls.borrow_mut().push((src_addr, data.is_some()));
        let mut next = self.next_addr.borrow_mut();
        *next += 1;
        Ok(1_000_000 + *next)
    }

    fn submit_write_batch(&self) -> Result<()> {
        Ok(())
    }
}

/// Checkpoint collaborator with freely-settable free-space state, enough
/// to drive the driver's `has_not_enough_free_secs`/`is_frozen` checks in
/// tests without a real checkpoint area.
///
/// `needed_free_secs` models how many sections still need freeing before
/// `has_not_enough_free_secs(extra)` reports satisfied: `extra <
/// needed_free_secs`, so a caller that credits this round's own reclaims
/// (the `extra` argument) can observe the shortfall resolve mid-loop.
pub struct FakeCheckpoint {
    pub needed_free_secs: u32,
    pub prefree_segments: u32,
    pub frozen: bool,
    pub unmounting: bool,
    pub balance_calls: RefCell<u32>,
    pub checkpoint_calls: RefCell<u32>,
}

impl Default for FakeCheckpoint {
    fn default() -> Self {
        Self {
            needed_free_secs: 0,
            prefree_segments: 0,
            frozen: false,
            unmounting: false,
            balance_calls: RefCell::new(0),
            checkpoint_calls: RefCell::new(0),
        }
    }
}

impl Checkpoint for FakeCheckpoint {
    fn write_checkpoint(&self) -> Result<()> {
        *self.checkpoint_calls.borrow_mut() += 1;
        Ok(())
    }

    fn prefree_segments(&self) -> u32 {
        self.prefree_segments
    }

    fn free_segments(&self) -> u32 {
        0
    }

    fn has_not_enough_free_secs(&self, extra: u32) -> bool {
        extra < self.needed_free_secs
    }

    fn is_idle(&self) -> bool {
        true
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn is_unmounting(&self) -> bool {
        self.unmounting
    }

    fn balance_metadata(&self) {
        *self.balance_calls.borrow_mut() += 1;
    }
}

/// Lets a test keep an observable handle on a [`FakeCheckpoint`] after
/// moving one into a [`crate::driver::Mount`].
impl Checkpoint for std::sync::Arc<FakeCheckpoint> {
    fn write_checkpoint(&self) -> Result<()> {
        (**self).write_checkpoint()
    }

    fn prefree_segments(&self) -> u32 {
        (**self).prefree_segments()
    }

    fn free_segments(&self) -> u32 {
        (**self).free_segments()
    }

    fn has_not_enough_free_secs(&self, extra: u32) -> bool {
        (**self).has_not_enough_free_secs(extra)
    }

    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }

    fn is_frozen(&self) -> bool {
        (**self).is_frozen()
    }

    fn is_unmounting(&self) -> bool {
        (**self).is_unmounting()
    }

    fn balance_metadata(&self) {
        (**self).balance_metadata();
    }
}
