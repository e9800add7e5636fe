use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::assets::PumpReport;

static SNAPSHOT_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_snapshot_poison_once(operation: &'static str) {
    if SNAPSHOT_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "loop metrics lock poisoned; recovered inner value");
    }
}

/// Asset queue activity over one reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetLoadMetrics {
    /// Loads still waiting for a pump when the interval closed.
    pub pending: usize,
    /// Loads that completed during the interval.
    pub completed: usize,
    /// Failures since startup.
    pub failed_total: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub worst_frame_ms: f32,
    pub loads: AssetLoadMetrics,
    pub scene_depth: usize,
    pub active_tweens: usize,
}

/// Engine state sampled once per rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EngineCounters {
    pub(crate) pending_loads: usize,
    pub(crate) failed_loads: usize,
    pub(crate) scene_depth: usize,
    pub(crate) active_tweens: usize,
}

/// Latest published snapshot, readable from outside the loop thread.
#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    latest: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.latest.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_snapshot_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        let mut guard = match self.latest.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_snapshot_poison_once("write");
                poisoned.into_inner()
            }
        };
        *guard = snapshot;
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    window_start: Instant,
    window: Duration,
    frames: u32,
    ticks: u32,
    frame_time_total: Duration,
    worst_frame: Duration,
    completed_loads: usize,
    counters: EngineCounters,
}

impl MetricsAccumulator {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            window,
            frames: 0,
            ticks: 0,
            frame_time_total: Duration::ZERO,
            worst_frame: Duration::ZERO,
            completed_loads: 0,
            counters: EngineCounters::default(),
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration, counters: EngineCounters) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_total = self.frame_time_total.saturating_add(frame_dt);
        self.worst_frame = self.worst_frame.max(frame_dt);
        self.counters = counters;
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn record_pump(&mut self, report: PumpReport) {
        self.completed_loads = self.completed_loads.saturating_add(report.completed);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = match self.frames {
            0 => 0.0,
            frames => self.frame_time_total.as_secs_f32() * 1000.0 / frames as f32,
        };
        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / seconds,
            tps: self.ticks as f32 / seconds,
            frame_time_ms,
            worst_frame_ms: self.worst_frame.as_secs_f32() * 1000.0,
            loads: AssetLoadMetrics {
                pending: self.counters.pending_loads,
                completed: self.completed_loads,
                failed_total: self.counters.failed_loads,
            },
            scene_depth: self.counters.scene_depth,
            active_tweens: self.counters.active_tweens,
        };

        let counters = self.counters;
        *self = Self::new(self.window);
        self.window_start = now;
        self.counters = counters;
        Some(snapshot)
    }
}
