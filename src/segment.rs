// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Core data-model types: segments, sections, segment types and the
//! dirty-class taxonomy (spec §3).

use crate::bitmap::Bitmap;
use std::fmt;

/// Identifies a single segment (a fixed-size run of `B` contiguous blocks).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg#{}", self.0)
    }
}

impl From<u32> for SegmentId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Identifies a section (`segs_per_sec` consecutive segments), the
/// allocation granularity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionId(pub u32);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sec#{}", self.0)
    }
}

impl SegmentId {
    /// The section this segment belongs to, given `segs_per_sec`.
    #[must_use]
    pub fn section(self, segs_per_sec: u32) -> SectionId {
        SectionId(self.0 / segs_per_sec)
    }

    /// First segment of `self`'s section.
    #[must_use]
    pub fn section_start(self, segs_per_sec: u32) -> SegmentId {
        SegmentId((self.0 / segs_per_sec) * segs_per_sec)
    }
}

impl SectionId {
    /// First segment of this section.
    #[must_use]
    pub fn first_segment(self, segs_per_sec: u32) -> SegmentId {
        SegmentId(self.0 * segs_per_sec)
    }
}

/// Whether a segment's blocks are owned by nodes (inodes / indirect nodes)
/// or by plain data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockCategory {
    Node,
    Data,
}

/// Write temperature classification, used to pick the dirty class a
/// segment belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Temperature {
    Hot,
    Warm,
    Cold,
}

/// `(category, temperature)` pair identifying a segment's type tag
/// (spec §3 "Segment ... type tag").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SegmentType {
    pub category: BlockCategory,
    pub temperature: Temperature,
}

impl SegmentType {
    #[must_use]
    pub const fn new(category: BlockCategory, temperature: Temperature) -> Self {
        Self {
            category,
            temperature,
        }
    }
}

/// Per-segment metadata as reported by the SIT accessor (spec §6
/// `get_seg_entry`).
#[derive(Clone, Debug)]
pub struct SegEntry {
    /// Monotone-ish wall-clock timestamp of the latest write into the
    /// segment.
    pub mtime: u64,

    /// Current-valid-bitmap: one bit per block, set iff the block is live.
    pub cur_valid_map: Bitmap,

    /// Checkpoint-valid-block count: a stable snapshot, used by SSR cost.
    pub ckpt_valid_blocks: u32,

    pub seg_type: SegmentType,
}

impl SegEntry {
    /// Live-block count per the invariant `popcount(cur_valid_map) ==
    /// live_blocks` (spec §8).
    #[must_use]
    pub fn live_blocks(&self) -> u32 {
        self.cur_valid_map.count_ones() as u32
    }
}

/// Classes the dirty-segment map tracks independently (spec §3
/// "DirtySegmap"). `Dirty` is the generic LFS scan class; the others
/// partition segments by category/temperature for SSR scans.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DirtyClass {
    Dirty,
    HotData,
    WarmData,
    ColdData,
    HotNode,
    WarmNode,
    ColdNode,
}

impl DirtyClass {
    pub const ALL: [DirtyClass; 7] = [
        DirtyClass::Dirty,
        DirtyClass::HotData,
        DirtyClass::WarmData,
        DirtyClass::ColdData,
        DirtyClass::HotNode,
        DirtyClass::WarmNode,
        DirtyClass::ColdNode,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_section_math() {
        let seg = SegmentId(17);
        assert_eq!(SectionId(8), seg.section(2));
        assert_eq!(SegmentId(16), seg.section_start(2));
        assert_eq!(SegmentId(16), SectionId(8).first_segment(2));
    }

    #[test]
    fn live_blocks_matches_popcount() {
        let mut map = Bitmap::with_len(8);
        map.set(0);
        map.set(3);
        map.set(7);

        let entry = SegEntry {
            mtime: 10,
            cur_valid_map: map,
            ckpt_valid_blocks: 3,
            seg_type: SegmentType::new(BlockCategory::Data, Temperature::Cold),
        };

        assert_eq!(3, entry.live_blocks());
    }
}
