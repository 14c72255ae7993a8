// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Victim selector (spec §4.1): scans the dirty set under a policy and
//! returns one segment, or none.

use crate::collaborators::SitAccessor;
use crate::config::{Config, GcIdle};
use crate::dirty_segmap::DirtySegmap;
use crate::segment::{DirtyClass, SectionId, SegmentId};
use crate::sit::SitView;

/// `LFS` writes append-only, one section at a time; `SSR` recycles
/// partially-valid segments.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocMode {
    Lfs,
    Ssr,
}

/// Background (best-effort) vs. foreground (must make progress) GC.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GcType {
    Fg,
    Bg,
}

/// Which cost function drives victim selection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GcMode {
    Greedy,
    CostBenefit,
}

fn select_gc_type(gc_idle: GcIdle, gc_type: GcType) -> GcMode {
    let base = if gc_type == GcType::Bg {
        GcMode::CostBenefit
    } else {
        GcMode::Greedy
    };

    match gc_idle {
        GcIdle::Auto => base,
        GcIdle::CostBenefit => GcMode::CostBenefit,
        GcIdle::Greedy => GcMode::Greedy,
    }
}

struct Policy {
    alloc_mode: AllocMode,
    gc_mode: GcMode,
    ofs_unit: u32,
    max_search: usize,
    offset: u32,
}

fn select_policy(
    dirty: &DirtySegmap,
    cfg: &Config,
    alloc_mode: AllocMode,
    gc_type: GcType,
    class: DirtyClass,
) -> Policy {
    let (gc_mode, nr_dirty, ofs_unit) = if alloc_mode == AllocMode::Ssr {
        (GcMode::Greedy, dirty.nr_dirty(class), 1)
    } else {
        let gc_mode = select_gc_type(cfg.gc_idle, gc_type);
        (gc_mode, dirty.nr_dirty(DirtyClass::Dirty), cfg.segs_per_sec)
    };

    let max_search = nr_dirty.min(cfg.max_victim_search);
    let offset = dirty.last_victim(gc_mode);

    Policy {
        alloc_mode,
        gc_mode,
        ofs_unit,
        max_search,
        offset,
    }
}

fn get_max_cost(cfg: &Config, p: &Policy) -> u64 {
    if p.alloc_mode == AllocMode::Ssr {
        u64::from(cfg.blocks_per_seg())
    } else if p.gc_mode == GcMode::Greedy {
        u64::from(cfg.blocks_per_seg()) * u64::from(p.ofs_unit)
    } else {
        u64::from(u32::MAX)
    }
}

fn get_cb_cost<S: SitAccessor>(sit: &SitView<S>, cfg: &Config, segno: SegmentId) -> crate::error::Result<u64> {
    let section_start = segno.section_start(cfg.segs_per_sec);

    let mut mtime_sum = 0u64;
    for i in 0..cfg.segs_per_sec {
        let entry = sit.get_seg_entry(SegmentId(section_start.0 + i))?;
        mtime_sum += entry.mtime;
    }
    let mtime = mtime_sum / u64::from(cfg.segs_per_sec);

    let vblocks = sit.get_valid_blocks(section_start, cfg.segs_per_sec)? / cfg.segs_per_sec;

    let u = (u64::from(vblocks) * 100) >> cfg.log_blocks_per_seg;

    let (min_mtime, max_mtime) = sit.mtime_range();
    let age = if max_mtime != min_mtime {
        100 - (100 * (mtime.saturating_sub(min_mtime))) / (max_mtime - min_mtime)
    } else {
        0
    };

    Ok(u64::from(u32::MAX) - (100 * (100 - u) * age) / (100 + u))
}

fn get_gc_cost<S: SitAccessor>(
    sit: &SitView<S>,
    cfg: &Config,
    segno: SegmentId,
    p: &Policy,
) -> crate::error::Result<u64> {
    if p.alloc_mode == AllocMode::Ssr {
        return Ok(u64::from(sit.get_seg_entry(segno)?.ckpt_valid_blocks));
    }

    if p.gc_mode == GcMode::Greedy {
        Ok(u64::from(sit.get_valid_blocks(
            segno.section_start(cfg.segs_per_sec),
            cfg.segs_per_sec,
        )?))
    } else {
        get_cb_cost(sit, cfg, segno)
    }
}

/// Scans `dirty`/`victim_secmap` under `victim_secmap` reservations and
/// returns a section already committed to by a prior background pass, if
/// any is still usable (spec §4.1 "Fast path").
fn check_bg_victims(
    dirty: &mut DirtySegmap,
    section_count: u32,
    segs_per_sec: u32,
    is_excluded: &impl Fn(SectionId) -> bool,
) -> Option<SegmentId> {
    for secno in 0..section_count {
        let section = SectionId(secno);
        if !dirty.is_reserved(section) {
            continue;
        }
        if is_excluded(section) {
            continue;
        }
        dirty.clear_reservation(section);
        return Some(section.first_segment(segs_per_sec));
    }
    None
}

/// Selects one victim segment under the given policy (spec §4.1).
///
/// `is_excluded` reports whether a section is ineligible because a
/// write cursor currently points into it (or it's otherwise pinned);
/// this generalizes `sec_usage_check` from the source design.
pub fn get_victim<S: SitAccessor>(
    dirty: &mut DirtySegmap,
    sit: &SitView<S>,
    cfg: &Config,
    alloc_mode: AllocMode,
    gc_type: GcType,
    class: DirtyClass,
    is_excluded: impl Fn(SectionId) -> bool,
) -> Option<SegmentId> {
    let section_count = sit.segment_count().div_ceil(cfg.segs_per_sec.max(1));

    let mut p = select_policy(dirty, cfg, alloc_mode, gc_type, class);
    let max_cost = get_max_cost(cfg, &p);
    let mut min_cost = max_cost;

    if p.max_search == 0 {
        return None;
    }

    if p.alloc_mode == AllocMode::Lfs && gc_type == GcType::Fg {
        if let Some(segno) = check_bg_victims(dirty, section_count, cfg.segs_per_sec, &is_excluded)
        {
            return Some(segno);
        }
    }

    let scan_bitmap = dirty.bitmap(if p.alloc_mode == AllocMode::Ssr {
        class
    } else {
        DirtyClass::Dirty
    });

    let find_next_bit = |from: u32, upto: u32| -> Option<u32> {
        (from..upto).find(|&i| scan_bitmap.get(i as usize))
    };

    let mut last_segment = sit.segment_count();
    let mut min_segno: Option<u32> = None;
    let mut nsearched = 0usize;
    let mut offset = p.offset;

    'scan: loop {
        let Some(segno) = find_next_bit(offset, last_segment) else {
            let wrapped = dirty.last_victim(p.gc_mode);
            if wrapped != 0 {
                last_segment = wrapped;
                dirty.set_last_victim(p.gc_mode, 0);
                offset = 0;
                continue 'scan;
            }
            break 'scan;
        };

        offset = segno + p.ofs_unit;
        if p.ofs_unit > 1 {
            offset -= segno % p.ofs_unit;
        }

        let section = SegmentId(segno).section(cfg.segs_per_sec);
        if is_excluded(section) {
            continue 'scan;
        }
        if gc_type == GcType::Bg && dirty.is_reserved(section) {
            continue 'scan;
        }

        let cost = match get_gc_cost(sit, cfg, SegmentId(segno), &p) {
            Ok(c) => c,
            Err(_) => continue 'scan,
        };

        if min_cost > cost {
            min_segno = Some(segno);
            min_cost = cost;
        } else if cost == max_cost {
            continue 'scan;
        }

        nsearched += 1;
        if nsearched >= p.max_search {
            dirty.set_last_victim(p.gc_mode, segno);
            break 'scan;
        }
    }

    let min_segno = min_segno?;

    if p.alloc_mode == AllocMode::Lfs {
        let section = SegmentId(min_segno).section(cfg.segs_per_sec);
        if gc_type == GcType::Bg {
            dirty.reserve_victim(section);
        }
    }

    Some(SegmentId((min_segno / p.ofs_unit) * p.ofs_unit))
}
