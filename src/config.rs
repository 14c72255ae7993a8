// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::time::Duration;

const DEFAULT_LOG_BLOCKS_PER_SEG: u32 = 9; // 2^9 = 512 blocks/segment
const DEFAULT_SEGS_PER_SEC: u32 = 1;

const DEFAULT_MIN_SLEEP: Duration = Duration::from_millis(30_000);
const DEFAULT_MAX_SLEEP: Duration = Duration::from_millis(60_000);
const DEFAULT_NO_GC_SLEEP: Duration = Duration::from_millis(300_000);

const DEFAULT_MAX_VICTIM_SEARCH: usize = 4096;

/// Selects which cost function the background reclaimer idles into when no
/// explicit allocation-mode-driven choice applies (spec §4.1 "gc_idle
/// override").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum GcIdle {
    /// Derive the mode from `(alloc_mode, gc_type)` as usual.
    #[default]
    Auto,
    /// Always use the Cost-Benefit cost function.
    CostBenefit,
    /// Always use the Greedy cost function.
    Greedy,
}

/// Tunables for the segment-reclaim engine (spec §6 "Tunables").
///
/// Constructed with [`Config::new`] and refined with the builder methods,
/// mirroring how the rest of the ambient stack configures itself.
#[derive(Clone, Debug)]
pub struct Config {
    /// `log2` of the number of blocks per segment (`B = 2^log_blocks_per_seg`).
    pub log_blocks_per_seg: u32,

    /// Number of consecutive segments making up one section.
    pub segs_per_sec: u32,

    /// Lower bound of the background reclaimer's sleep interval.
    pub min_sleep_time: Duration,

    /// Upper bound of the background reclaimer's sleep interval.
    pub max_sleep_time: Duration,

    /// Sleep interval used after a tick that found no victim at all.
    pub no_gc_sleep_time: Duration,

    /// Idle-mode cost-function override.
    pub gc_idle: GcIdle,

    /// Hard cap on the number of candidates a single victim search
    /// examines before giving up.
    pub max_victim_search: usize,

    /// Promotes every background GC trigger to foreground.
    pub force_fg_gc: bool,

    /// Fraction of invalid blocks (0.0-1.0) considered "enough" to shrink
    /// the background reclaimer's sleep interval (spec §4.5 step 5).
    pub enough_invalid_ratio: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Creates a configuration with the engine's default tunables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log_blocks_per_seg: DEFAULT_LOG_BLOCKS_PER_SEG,
            segs_per_sec: DEFAULT_SEGS_PER_SEC,
            min_sleep_time: DEFAULT_MIN_SLEEP,
            max_sleep_time: DEFAULT_MAX_SLEEP,
            no_gc_sleep_time: DEFAULT_NO_GC_SLEEP,
            gc_idle: GcIdle::default(),
            max_victim_search: DEFAULT_MAX_VICTIM_SEARCH,
            force_fg_gc: false,
            enough_invalid_ratio: 0.2,
        }
    }

    /// Number of blocks per segment (`B`).
    #[must_use]
    pub fn blocks_per_seg(&self) -> u32 {
        1 << self.log_blocks_per_seg
    }

    #[must_use]
    pub fn log_blocks_per_seg(mut self, log_blocks_per_seg: u32) -> Self {
        self.log_blocks_per_seg = log_blocks_per_seg;
        self
    }

    #[must_use]
    pub fn segs_per_sec(mut self, segs_per_sec: u32) -> Self {
        assert!(segs_per_sec > 0, "segs_per_sec must be positive");
        self.segs_per_sec = segs_per_sec;
        self
    }

    #[must_use]
    pub fn min_sleep_time(mut self, value: Duration) -> Self {
        self.min_sleep_time = value;
        self
    }

    #[must_use]
    pub fn max_sleep_time(mut self, value: Duration) -> Self {
        self.max_sleep_time = value;
        self
    }

    #[must_use]
    pub fn no_gc_sleep_time(mut self, value: Duration) -> Self {
        self.no_gc_sleep_time = value;
        self
    }

    #[must_use]
    pub fn gc_idle(mut self, value: GcIdle) -> Self {
        self.gc_idle = value;
        self
    }

    #[must_use]
    pub fn max_victim_search(mut self, value: usize) -> Self {
        self.max_victim_search = value;
        self
    }

    #[must_use]
    pub fn force_fg_gc(mut self, value: bool) -> Self {
        self.force_fg_gc = value;
        self
    }
}
