// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The reclaim driver (spec §4.4 "do_garbage_collect", §4.5 "f2fs_gc"):
//! ties victim selection, validity checking and migration together into
//! one reclaim round, and owns every external collaborator (spec §9
//! "Global mutable state").

use crate::collaborators::{
    Allocator, Checkpoint, DeviceHint, InodeManager, NodeManager, NodePage, NoDeviceHint,
    PageCache, SitAccessor,
};
use crate::config::Config;
use crate::dirty_segmap::DirtySegmap;
use crate::error::{Error, Result};
use crate::gc_inode_list::GcInodeList;
use crate::migrator::{self, MigrationOutcome};
use crate::segment::{DirtyClass, SegEntry, SegmentId};
use crate::sit::SitView;
use crate::stop_signal::StopSignal;
use crate::summary::{SummaryBlock, SummaryFooterType};
use crate::victim::{self, AllocMode, GcType};
use log::{debug, trace, warn};
use std::sync::Mutex;

/// Per-round outcome, used by the background reclaimer to pace its sleep
/// interval (spec §4.5 step 5).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub segments_reclaimed: u32,
    pub blocks_migrated: u32,
    pub blocks_skipped_stale: u32,
}

/// Bundles every external collaborator the engine needs plus its own
/// reclaim-local state (dirty-segment map, victim reservations, the
/// round-serializing mutex). One instance lives for the life of the mount.
pub struct Mount<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint = NoDeviceHint>
where
    Sit: SitAccessor,
{
    sit: SitView<Sit>,
    nodes: Nodes,
    inodes: Inodes,
    cache: Cache,
    allocator: Alloc,
    checkpoint: Ckpt,
    hint: Hint,
    config: Config,

    /// `seglist_lock`: guards the dirty-segment map (spec §5). Must be
    /// acquired before `SitView`'s internal `sentry_lock`.
    dirty: Mutex<DirtySegmap>,

    /// Serializes reclaim rounds against one another.
    gc_mutex: Mutex<()>,

    pub stop: StopSignal,
}

impl<Sit, Nodes, Inodes, Cache, Alloc, Ckpt> Mount<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, NoDeviceHint>
where
    Sit: SitAccessor,
    Nodes: NodeManager,
    Inodes: InodeManager,
    Cache: PageCache,
    Alloc: Allocator,
    Ckpt: Checkpoint,
{
    pub fn new(
        sit: Sit,
        nodes: Nodes,
        inodes: Inodes,
        cache: Cache,
        allocator: Alloc,
        checkpoint: Ckpt,
        config: Config,
    ) -> Self {
        Self::with_hint(sit, nodes, inodes, cache, allocator, checkpoint, config, NoDeviceHint)
    }
}

impl<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint> Mount<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint>
where
    Sit: SitAccessor,
    Nodes: NodeManager,
    Inodes: InodeManager,
    Cache: PageCache,
    Alloc: Allocator,
    Ckpt: Checkpoint,
    Hint: DeviceHint,
{
    #[allow(clippy::too_many_arguments)]
    pub fn with_hint(
        sit: Sit,
        nodes: Nodes,
        inodes: Inodes,
        cache: Cache,
        allocator: Alloc,
        checkpoint: Ckpt,
        config: Config,
        hint: Hint,
    ) -> Self {
        let segment_count = sit.segment_count();
        let section_count = segment_count.div_ceil(config.segs_per_sec.max(1));

        Self {
            sit: SitView::new(sit),
            nodes,
            inodes,
            cache,
            allocator,
            checkpoint,
            hint,
            config,
            dirty: Mutex::new(DirtySegmap::new(segment_count, section_count)),
            gc_mutex: Mutex::new(()),
            stop: StopSignal::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Marks a segment dirty under `class`, e.g. once an allocator's write
    /// cursor moves off it (spec §3 "DirtySegmap").
    pub fn mark_dirty(&self, class: DirtyClass, segno: SegmentId) {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.dirty.lock().expect("lock is poisoned").mark_dirty(class, segno);
    }

    /// Periodic metadata balancing, run once per background reclaimer tick
    /// rather than as part of `f2fs_gc` itself (spec §4.5 step 7).
    pub fn balance_metadata(&self) {
        self.checkpoint.balance_metadata();
    }

    fn guard_abortable(&self) -> Result<()> {
        if self.checkpoint.is_frozen() {
            return Err(Error::FsFrozen);
        }
        if self.checkpoint.is_unmounting() {
            return Err(Error::Unmounting);
        }
        Ok(())
    }

    /// Reclaims one victim segment (spec §4.4): walks its summary block,
    /// migrates every still-live entry, then lets the caller's allocator
    /// reuse the freed space.
    pub fn do_garbage_collect(&self, segno: SegmentId, gc_type: GcType) -> Result<RoundReport> {
        self.guard_abortable()?;

        let seg_entry = self.sit.get_seg_entry(segno)?;
        let summary = self.sit.get_summary_block(segno)?;
        let blocks_per_seg = self.config.blocks_per_seg();

        self.hint
            .reclaim_hint_start(u64::from(segno.0) * u64::from(blocks_per_seg));

        // The round's GC inode list (spec §3): pins each distinct owning
        // inode at most once no matter how many of its blocks this segment
        // holds, and is always torn down below, success or failure.
        let mut gc_inodes = GcInodeList::new();
        let result = self.migrate_summary(segno, &summary, &seg_entry, blocks_per_seg, &mut gc_inodes);
        gc_inodes.teardown(|handle| self.inodes.iput(handle));

        let mut report = result?;

        self.hint
            .reclaim_hint_end(u64::from(segno.0 + 1) * u64::from(blocks_per_seg));

        self.allocator.submit_write_batch()?;
        report.segments_reclaimed = 1;

        let section = segno.section(self.config.segs_per_sec);
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let mut dirty = self.dirty.lock().expect("lock is poisoned");
        dirty.clear_dirty(DirtyClass::Dirty, segno);
        dirty.clear_reservation(section);

        debug!(
            "gc: reclaimed segno={segno} migrated={} stale={}",
            report.blocks_migrated, report.blocks_skipped_stale
        );

        Ok(report)
    }

    /// Walks one segment's summary entries, migrating every still-live
    /// block (spec §4.3/§4.4). Split out from [`Self::do_garbage_collect`]
    /// so the caller can guarantee the round's [`GcInodeList`] is torn down
    /// regardless of whether this returns `Ok` or `Err`.
    fn migrate_summary(
        &self,
        segno: SegmentId,
        summary: &SummaryBlock,
        seg_entry: &SegEntry,
        blocks_per_seg: u32,
        gc_inodes: &mut GcInodeList<Inodes::Handle>,
    ) -> Result<RoundReport> {
        let mut report = RoundReport::default();

        for (ofs, entry) in summary.entries.iter().enumerate() {
            let src_addr = u64::from(segno.0) * u64::from(blocks_per_seg) + ofs as u64;

            let outcome = match summary.footer {
                SummaryFooterType::Node => migrator::migrate_node_block(
                    &self.nodes,
                    &self.allocator,
                    entry,
                    src_addr,
                    seg_entry.seg_type.temperature.into_node_class(),
                )?,
                SummaryFooterType::Data => {
                    let node_ofs = self.nodes.get_node_page(entry.nid)?.ofs_of_node();

                    migrator::migrate_data_block(
                        &self.nodes,
                        &self.inodes,
                        gc_inodes,
                        &self.cache,
                        &self.allocator,
                        entry,
                        src_addr,
                        node_ofs,
                        seg_entry.seg_type.temperature.into_data_class(),
                    )?
                }
            };

            match outcome {
                MigrationOutcome::Stale => report.blocks_skipped_stale += 1,
                MigrationOutcome::Remapped(_) | MigrationOutcome::Rewritten(_) => {
                    report.blocks_migrated += 1;
                }
            }

            trace!("gc: segno={segno} ofs={ofs} outcome={outcome:?}");
        }

        Ok(report)
    }

    /// Selects one victim segment for `gc_type` under this mount's current
    /// dirty state (spec §4.1). GC's own victim search always allocates
    /// under [`AllocMode::Lfs`] — `SSR` is only ever used by the regular
    /// write-path allocator picking where to place new data, never by
    /// `f2fs_gc` itself.
    fn select_victim(&self, gc_type: GcType) -> Option<SegmentId> {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let mut dirty = self.dirty.lock().expect("lock is poisoned");
        victim::get_victim(
            &mut dirty,
            &self.sit,
            &self.config,
            AllocMode::Lfs,
            gc_type,
            DirtyClass::Dirty,
            |_section| false,
        )
    }

    /// One top-level reclaim invocation (spec §4.5 "f2fs_gc"): selects a
    /// victim section and reclaims every segment in it, escalating from
    /// background to foreground GC when free space is still short (spec §8
    /// scenario 6 "BG→FG escalation"), and looping for a foreground caller
    /// until the free-space shortfall it's blocking on is resolved.
    pub fn f2fs_gc(&self, gc_type: GcType) -> Result<RoundReport> {
        self.guard_abortable()?;

        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let _serialize = self.gc_mutex.lock().expect("lock is poisoned");

        let mut total = RoundReport::default();
        let mut gc_type = gc_type;
        if self.config.force_fg_gc {
            gc_type = GcType::Fg;
        }
        let sync = gc_type == GcType::Fg;
        let mut sections_freed = 0u32;
        let mut any_victim_found = false;
        let segs_per_sec = self.config.segs_per_sec.max(1);

        loop {
            self.guard_abortable()?;

            let mut victim = None;

            // gc-more loop (spec §4.5): a BG round that still can't spare
            // enough free sections, counting what this round already
            // freed, escalates to FG before selecting again.
            if gc_type == GcType::Bg && self.checkpoint.has_not_enough_free_secs(sections_freed) {
                gc_type = GcType::Fg;
                victim = self.select_victim(gc_type);
                if victim.is_some() || self.checkpoint.prefree_segments() > 0 {
                    self.checkpoint.write_checkpoint()?;
                }
            }

            let victim = victim.or_else(|| self.select_victim(gc_type));

            let Some(segno) = victim else {
                // Matches the source's `ret` contract: a synchronous (FG)
                // caller needs at least one fully-completed section to
                // count as success; an async (BG) caller just needs to have
                // found a victim at all, even on an escalated later round.
                let succeeded = if sync { sections_freed > 0 } else { any_victim_found };
                if !succeeded {
                    warn!("gc: no victim found");
                    return Err(Error::NoVictim);
                }
                break;
            };
            any_victim_found = true;

            // Reclaim every segment in the victim's section; on FG, abort
            // the section at the first segment that frees nothing (the
            // remaining segments are presumed expensive to chase).
            let mut section_completed = true;
            for i in 0..segs_per_sec {
                let round = self.do_garbage_collect(SegmentId(segno.0 + i), gc_type)?;
                total.segments_reclaimed += round.segments_reclaimed;
                total.blocks_migrated += round.blocks_migrated;
                total.blocks_skipped_stale += round.blocks_skipped_stale;

                if round.blocks_migrated == 0 && gc_type == GcType::Fg {
                    section_completed = false;
                    break;
                }
            }

            if section_completed && gc_type == GcType::Fg {
                sections_freed += 1;
            }

            if !sync {
                if self.checkpoint.has_not_enough_free_secs(sections_freed) {
                    continue;
                }
                if gc_type == GcType::Fg {
                    self.checkpoint.write_checkpoint()?;
                }
            }
            break;
        }

        Ok(total)
    }
}

impl crate::segment::Temperature {
    fn into_node_class(self) -> DirtyClass {
        match self {
            Self::Hot => DirtyClass::HotNode,
            Self::Warm => DirtyClass::WarmNode,
            Self::Cold => DirtyClass::ColdNode,
        }
    }

    fn into_data_class(self) -> DirtyClass {
        match self {
            Self::Hot => DirtyClass::HotData,
            Self::Warm => DirtyClass::WarmData,
            Self::Cold => DirtyClass::ColdData,
        }
    }
}
