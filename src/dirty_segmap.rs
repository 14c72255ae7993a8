// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Dirty-segment policy state (spec §3 "DirtySegmap", §2 "DirtySegmap
//! policy state"). Guarded as a whole by `seglist_lock` (spec §5); the
//! lock itself lives one level up in [`crate::driver::Mount`] so the
//! selector can additionally take `sentry_lock` *inside* it, matching
//! the documented lock order.

use crate::segment::{DirtyClass, SectionId, SegmentId};
use crate::victim::GcMode;
use rustc_hash::FxHashMap;

use crate::bitmap::Bitmap;

/// Bitmap per dirty-class, plus the victim-reservation map and
/// round-robin scan cursors.
pub struct DirtySegmap {
    classes: [Bitmap; DirtyClass::ALL.len()],
    nr_dirty: [usize; DirtyClass::ALL.len()],

    /// Sections already committed to by a prior background pass, so a
    /// later foreground pass can reuse the selection without rescanning
    /// (spec §4.1 "Fast path").
    victim_secmap: Bitmap,

    /// `last_victim[gc_mode]`: where the last scan under that mode
    /// stopped, for round-robin fairness (spec §3, §8 scenario 4).
    last_victim: FxHashMap<GcMode, u32>,
}

impl DirtySegmap {
    /// Creates an empty map sized for `segment_count` segments and
    /// `section_count` sections.
    #[must_use]
    pub fn new(segment_count: u32, section_count: u32) -> Self {
        Self {
            classes: std::array::from_fn(|_| Bitmap::with_len(segment_count as usize)),
            nr_dirty: [0; DirtyClass::ALL.len()],
            victim_secmap: Bitmap::with_len(section_count as usize),
            last_victim: FxHashMap::default(),
        }
    }

    /// Marks a segment dirty under `class`. Idempotent.
    pub fn mark_dirty(&mut self, class: DirtyClass, segno: SegmentId) {
        let idx = class.index();
        let Some(bitmap) = self.classes.get_mut(idx) else {
            return;
        };
        if !bitmap.get(segno.0 as usize) {
            bitmap.set(segno.0 as usize);
            self.nr_dirty[idx] += 1;
        }
    }

    /// Clears a segment's dirty bit under `class`. Idempotent.
    pub fn clear_dirty(&mut self, class: DirtyClass, segno: SegmentId) {
        let idx = class.index();
        let Some(bitmap) = self.classes.get_mut(idx) else {
            return;
        };
        if bitmap.get(segno.0 as usize) {
            bitmap.clear_bit(segno.0 as usize);
            self.nr_dirty[idx] -= 1;
        }
    }

    #[must_use]
    pub fn bitmap(&self, class: DirtyClass) -> &Bitmap {
        &self.classes[class.index()]
    }

    #[must_use]
    pub fn nr_dirty(&self, class: DirtyClass) -> usize {
        self.nr_dirty[class.index()]
    }

    #[must_use]
    pub fn victim_secmap(&self) -> &Bitmap {
        &self.victim_secmap
    }

    pub fn reserve_victim(&mut self, section: SectionId) {
        self.victim_secmap.set(section.0 as usize);
    }

    pub fn is_reserved(&self, section: SectionId) -> bool {
        self.victim_secmap.get(section.0 as usize)
    }

    /// Clears a section's reservation, e.g. once it becomes the current
    /// write cursor (spec §8 "Victim reservation monotonicity").
    pub fn clear_reservation(&mut self, section: SectionId) {
        self.victim_secmap.clear_bit(section.0 as usize);
    }

    #[must_use]
    pub fn last_victim(&self, mode: GcMode) -> u32 {
        self.last_victim.get(&mode).copied().unwrap_or(0)
    }

    pub fn set_last_victim(&mut self, mode: GcMode, segno: u32) {
        self.last_victim.insert(mode, segno);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_clear_dirty_idempotent() {
        let mut dirty = DirtySegmap::new(16, 4);

        dirty.mark_dirty(DirtyClass::Dirty, SegmentId(3));
        dirty.mark_dirty(DirtyClass::Dirty, SegmentId(3));
        assert_eq!(1, dirty.nr_dirty(DirtyClass::Dirty));

        dirty.clear_dirty(DirtyClass::Dirty, SegmentId(3));
        dirty.clear_dirty(DirtyClass::Dirty, SegmentId(3));
        assert_eq!(0, dirty.nr_dirty(DirtyClass::Dirty));
    }

    #[test]
    fn victim_reservation_roundtrip() {
        let mut dirty = DirtySegmap::new(16, 4);
        assert!(!dirty.is_reserved(SectionId(2)));

        dirty.reserve_victim(SectionId(2));
        assert!(dirty.is_reserved(SectionId(2)));

        dirty.clear_reservation(SectionId(2));
        assert!(!dirty.is_reserved(SectionId(2)));
    }

    #[test]
    fn cursor_persists_per_mode() {
        let mut dirty = DirtySegmap::new(16, 4);
        dirty.set_last_victim(GcMode::Greedy, 17);
        dirty.set_last_victim(GcMode::CostBenefit, 3);

        assert_eq!(17, dirty.last_victim(GcMode::Greedy));
        assert_eq!(3, dirty.last_victim(GcMode::CostBenefit));
    }
}
