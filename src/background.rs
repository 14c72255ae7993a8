// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The background reclaimer thread (spec §4.5 "Background driver loop").
//!
//! Mirrors the shape of the teacher's compaction worker: a single
//! `JoinHandle` parked on a `Condvar` with a timeout, woken early by
//! [`StopSignal`] or an explicit nudge, adjusting its own sleep interval
//! based on how much free space the last round actually freed up.

use crate::collaborators::{Allocator, Checkpoint, DeviceHint, InodeManager, NodeManager, PageCache, SitAccessor};
use crate::driver::Mount;
use crate::stop_signal::StopSignal;
use crate::victim::GcType;
use log::{debug, error, trace};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Wakes the background reclaimer early, e.g. right after a foreground
/// allocation failed to find free space (spec §4.5 "explicit nudge").
#[derive(Clone, Default)]
pub struct Nudge(Arc<(Mutex<bool>, Condvar)>);

impl Nudge {
    pub fn send(&self) {
        let (lock, cvar) = &*self.0;
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let mut pending = lock.lock().expect("lock is poisoned");
        *pending = true;
        cvar.notify_one();
    }

    fn wait(&self, timeout: Duration) {
        let (lock, cvar) = &*self.0;
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let pending = lock.lock().expect("lock is poisoned");
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        let (mut pending, _timeout_result) = cvar.wait_timeout(pending, timeout).expect("lock is poisoned");
        *pending = false;
    }
}

/// Owns the background reclaimer's thread handle. Dropping this without
/// calling [`Background::stop`] leaves the thread running detached, same
/// as the teacher's worker handles.
pub struct Background {
    handle: Option<JoinHandle<()>>,
    stop: StopSignal,
    nudge: Nudge,
}

impl Background {
    /// Spawns the reclaimer loop against `mount`, ticking at the interval
    /// described by `mount.config()`'s sleep tunables (spec §4.5 steps
    /// 1-7).
    pub fn spawn<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint>(
        mount: Arc<Mount<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint>>,
    ) -> Self
    where
        Sit: SitAccessor + Send + Sync + 'static,
        Nodes: NodeManager + Send + Sync + 'static,
        Inodes: InodeManager + Send + Sync + 'static,
        Cache: PageCache + Send + Sync + 'static,
        Alloc: Allocator + Send + Sync + 'static,
        Ckpt: Checkpoint + Send + Sync + 'static,
        Hint: DeviceHint + Send + Sync + 'static,
    {
        let stop = mount.stop.clone();
        let nudge = Nudge::default();
        let loop_nudge = nudge.clone();

        let handle = std::thread::Builder::new()
            .name("gc-reclaimer".into())
            .spawn(move || run(&mount, &loop_nudge))
            .expect("failed to spawn background reclaimer thread");

        Self {
            handle: Some(handle),
            stop,
            nudge,
        }
    }

    /// Wakes the reclaimer immediately instead of waiting out its current
    /// sleep interval.
    pub fn nudge(&self) {
        self.nudge.send();
    }

    /// Signals the thread to stop and joins it.
    pub fn stop(&mut self) {
        self.stop.send();
        self.nudge.send();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("gc: background reclaimer thread panicked");
            }
        }
    }
}

impl Drop for Background {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint>(
    mount: &Mount<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint>,
    nudge: &Nudge,
) where
    Sit: SitAccessor,
    Nodes: NodeManager,
    Inodes: InodeManager,
    Cache: PageCache,
    Alloc: Allocator,
    Ckpt: Checkpoint,
    Hint: DeviceHint,
{
    let mut sleep = mount.config().min_sleep_time;

    while !mount.stop.is_stopped() {
        match mount.f2fs_gc(GcType::Bg) {
            Ok(report) => {
                trace!("gc: background round migrated {} blocks", report.blocks_migrated);
                sleep = next_sleep(mount, report.blocks_migrated > 0);
            }
            Err(crate::error::Error::NoVictim) => {
                sleep = mount.config().no_gc_sleep_time;
            }
            Err(crate::error::Error::FsFrozen | crate::error::Error::Unmounting) => break,
            Err(err) => {
                error!("gc: background round failed: {err}");
                sleep = mount.config().max_sleep_time;
            }
        }

        // Spec §4.5 step 7: periodic metadata balancing runs every tick,
        // independent of whether this round found a victim.
        mount.balance_metadata();

        nudge.wait(sleep);
    }
}

/// Shrinks the sleep interval toward `min_sleep_time` while reclaims keep
/// finding work, and grows it back toward `max_sleep_time` otherwise
/// (spec §4.5 step 5, driven by `enough_invalid_ratio`).
fn next_sleep<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint>(
    mount: &Mount<Sit, Nodes, Inodes, Cache, Alloc, Ckpt, Hint>,
    made_progress: bool,
) -> Duration
where
    Sit: SitAccessor,
    Nodes: NodeManager,
    Inodes: InodeManager,
    Cache: PageCache,
    Alloc: Allocator,
    Ckpt: Checkpoint,
    Hint: DeviceHint,
{
    let cfg = mount.config();
    if made_progress {
        cfg.min_sleep_time
    } else {
        debug!("gc: no progress this round, backing off");
        (cfg.max_sleep_time).min(cfg.min_sleep_time * 2)
    }
}
