// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! SegmentInfo accessor (spec §2 "SegmentInfo accessor (SIT)").
//!
//! Segment bitmap/mtime/count storage itself is external (spec §1); this
//! module is the in-scope bookkeeping layer on top of it: it tracks the
//! running `(min_mtime, max_mtime)` range the Cost-Benefit cost function
//! needs, guarded by `sentry_lock` exactly as spec §4.1's concurrency note
//! describes ("`get_cb_cost` additionally mutates `min_mtime`/`max_mtime`
//! and therefore requires the SIT lock").

use crate::collaborators::SitAccessor;
use crate::error::Result;
use crate::segment::{SegEntry, SegmentId};
use crate::summary::SummaryBlock;
use std::sync::Mutex;

#[derive(Copy, Clone, Debug)]
struct MtimeRange {
    min: u64,
    max: u64,
}

impl Default for MtimeRange {
    fn default() -> Self {
        Self { min: u64::MAX, max: 0 }
    }
}

impl MtimeRange {
    fn observe(&mut self, mtime: u64) {
        self.min = self.min.min(mtime);
        self.max = self.max.max(mtime);
    }
}

/// Wraps a [`SitAccessor`] collaborator with the engine-owned
/// `(min_mtime, max_mtime)` tracker used by the Cost-Benefit cost
/// function. This corresponds to `sit_i->sentry_lock` in the source
/// design (spec §5).
pub struct SitView<S> {
    accessor: S,
    sentry_lock: Mutex<MtimeRange>,
}

impl<S: SitAccessor> SitView<S> {
    pub fn new(accessor: S) -> Self {
        Self {
            accessor,
            sentry_lock: Mutex::new(MtimeRange::default()),
        }
    }

    #[must_use]
    pub fn segment_count(&self) -> u32 {
        self.accessor.segment_count()
    }

    /// Fetches a segment's metadata and folds its mtime into the running
    /// range. Every call that will feed `get_cb_cost` must go through
    /// this path rather than a bare accessor call, so the range stays
    /// accurate (spec §4.1).
    pub fn get_seg_entry(&self, segno: SegmentId) -> Result<SegEntry> {
        let entry = self.accessor.get_seg_entry(segno)?;

        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let mut range = self.sentry_lock.lock().expect("lock is poisoned");
        range.observe(entry.mtime);

        Ok(entry)
    }

    pub fn get_valid_blocks(&self, segno: SegmentId, span: u32) -> Result<u32> {
        self.accessor.get_valid_blocks(segno, span)
    }

    pub fn get_summary_block(&self, segno: SegmentId) -> Result<SummaryBlock> {
        self.accessor.get_summary_block(segno)
    }

    /// Current `(min_mtime, max_mtime)` range observed so far.
    #[must_use]
    pub fn mtime_range(&self) -> (u64, u64) {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let range = self.sentry_lock.lock().expect("lock is poisoned");
        (range.min, range.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap;
    use crate::segment::{BlockCategory, SegmentType, Temperature};

    struct FixedAccessor(Vec<SegEntry>);

    impl SitAccessor for FixedAccessor {
        fn segment_count(&self) -> u32 {
            self.0.len() as u32
        }

        fn get_seg_entry(&self, segno: SegmentId) -> Result<SegEntry> {
            Ok(self.0[segno.0 as usize].clone())
        }

        fn get_valid_blocks(&self, segno: SegmentId, span: u32) -> Result<u32> {
            Ok((segno.0..segno.0 + span)
                .map(|i| self.0[i as usize].live_blocks())
                .sum())
        }

        fn get_summary_block(&self, _segno: SegmentId) -> Result<SummaryBlock> {
            Ok(SummaryBlock::new(
                crate::summary::SummaryFooterType::Data,
                vec![],
            ))
        }
    }

    fn entry(mtime: u64) -> SegEntry {
        SegEntry {
            mtime,
            cur_valid_map: Bitmap::with_len(8),
            ckpt_valid_blocks: 0,
            seg_type: SegmentType::new(BlockCategory::Data, Temperature::Cold),
        }
    }

    #[test]
    fn tracks_mtime_range() {
        let view = SitView::new(FixedAccessor(vec![entry(120), entry(800), entry(500)]));

        view.get_seg_entry(SegmentId(0)).unwrap();
        assert_eq!((120, 120), view.mtime_range());

        view.get_seg_entry(SegmentId(1)).unwrap();
        assert_eq!((120, 800), view.mtime_range());

        view.get_seg_entry(SegmentId(2)).unwrap();
        assert_eq!((120, 800), view.mtime_range());
    }
}
