//! Adaptive flow control between the entry stream and the sink.

use std::collections::VecDeque;
use std::time::Duration;

use crate::memory::MemoryUsageSnapshot;
use crate::pool::BufferClass;

pub const BASE_HIGH_WATER_MARK: u64 = 64 * 1024;
pub const MAX_HIGH_WATER_MARK: u64 = 256 * 1024;
pub const MIN_HIGH_WATER_MARK: u64 = 8 * 1024;

const FAST_CHUNKS_PER_SEC: f64 = 2000.0;
const SLOW_CHUNKS_PER_SEC: f64 = 50.0;
const MAX_SCALE_UP: f64 = 4.0;
const PRESSURE_PERCENT: f64 = 80.0;

const MIN_PAUSE_MS: f64 = 10.0;
const MAX_PAUSE_MS: f64 = 100.0;

const DEFAULT_WINDOW: usize = 16;

/// Rolling samples of `(chunks, elapsed)`.
#[derive(Clone, Debug)]
pub struct ThroughputWindow {
    samples: VecDeque<(u64, Duration)>,
    capacity: usize,
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ThroughputWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, chunks: u64, elapsed: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((chunks, elapsed));
    }

    /// Chunks per second across the window, `None` until time has been observed.
    pub fn chunks_per_second(&self) -> Option<f64> {
        let (chunks, elapsed) = self
            .samples
            .iter()
            .fold((0u64, Duration::ZERO), |(c, e), (chunks, elapsed)| {
                (c + chunks, e + *elapsed)
            });
        let secs = elapsed.as_secs_f64();
        (secs > 0.0).then(|| chunks as f64 / secs)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Decides how much may sit in the sink before the producer pauses, how long
/// to pause, and which buffer class to read with.
#[derive(Clone, Debug, Default)]
pub struct BackpressureController {
    window: ThroughputWindow,
    last_snapshot: Option<MemoryUsageSnapshot>,
    memory_percent: f64,
    ceiling: Option<u64>,
}

impl BackpressureController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never let the high-water mark exceed `ceiling` bytes.
    pub fn high_water_mark_override(mut self, ceiling: Option<u64>) -> Self {
        self.ceiling = ceiling.map(|c| c.max(1));
        self
    }

    pub fn set_high_water_mark_override(&mut self, ceiling: Option<u64>) {
        self.ceiling = ceiling.map(|c| c.max(1));
    }

    pub fn high_water_mark_ceiling(&self) -> Option<u64> {
        self.ceiling
    }

    pub fn window(&self) -> &ThroughputWindow {
        &self.window
    }

    pub fn record(&mut self, chunks: u64, elapsed: Duration) {
        self.window.record(chunks, elapsed);
    }

    pub fn observe_memory(&mut self, snapshot: MemoryUsageSnapshot, usage_percent: f64) {
        self.last_snapshot = Some(snapshot);
        self.memory_percent = usage_percent;
    }

    pub fn last_snapshot(&self) -> Option<&MemoryUsageSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn under_memory_pressure(&self) -> bool {
        self.memory_percent > PRESSURE_PERCENT
    }

    /// Forget throughput history, e.g. between runs.
    pub fn reset(&mut self) {
        self.window.clear();
        self.last_snapshot = None;
        self.memory_percent = 0.0;
    }

    pub fn adaptive_high_water_mark(&self) -> u64 {
        let mut hwm = BASE_HIGH_WATER_MARK as f64;
        if let Some(cps) = self.window.chunks_per_second() {
            if cps > FAST_CHUNKS_PER_SEC {
                hwm *= (cps / FAST_CHUNKS_PER_SEC).min(MAX_SCALE_UP);
            } else if cps < SLOW_CHUNKS_PER_SEC {
                hwm *= cps / SLOW_CHUNKS_PER_SEC;
            }
        }
        let mut hwm = (hwm as u64).clamp(MIN_HIGH_WATER_MARK, MAX_HIGH_WATER_MARK);

        // Memory pressure overrides whatever throughput asked for.
        if self.under_memory_pressure() {
            hwm = (hwm / 2).max(MIN_HIGH_WATER_MARK);
        }
        match self.ceiling {
            Some(ceiling) => hwm.min(ceiling),
            None => hwm,
        }
    }

    pub fn should_pause(&self, buffered: u64) -> bool {
        buffered > self.adaptive_high_water_mark()
    }

    /// Scales with how far `buffered` overshoots the mark, within 10..=100 ms.
    pub fn pause_delay(&self, buffered: u64) -> Duration {
        let hwm = self.adaptive_high_water_mark();
        let overflow = buffered.saturating_sub(hwm) as f64;
        let ms = (overflow / hwm as f64 * 50.0).clamp(MIN_PAUSE_MS, MAX_PAUSE_MS);
        Duration::from_millis(ms as u64)
    }

    pub fn buffer_class_for(&self, entry_size: u64) -> BufferClass {
        let class = BufferClass::for_len(entry_size.min(self.adaptive_high_water_mark()));
        if self.under_memory_pressure() {
            class.smaller().unwrap_or(class)
        } else {
            class
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_rate(chunks_per_sec: u64) -> BackpressureController {
        let mut c = BackpressureController::new();
        c.record(chunks_per_sec, Duration::from_secs(1));
        c
    }

    fn pressured(mut c: BackpressureController, percent: f64) -> BackpressureController {
        c.observe_memory(MemoryUsageSnapshot::default(), percent);
        c
    }

    #[test]
    fn base_mark_without_samples() {
        let c = BackpressureController::new();
        assert_eq!(c.adaptive_high_water_mark(), BASE_HIGH_WATER_MARK);
        assert_eq!(at_rate(500).adaptive_high_water_mark(), BASE_HIGH_WATER_MARK);
    }

    #[test]
    fn fast_throughput_raises_mark_up_to_cap() {
        assert_eq!(at_rate(4000).adaptive_high_water_mark(), 128 * 1024);
        assert_eq!(at_rate(100_000).adaptive_high_water_mark(), MAX_HIGH_WATER_MARK);
    }

    #[test]
    fn slow_throughput_lowers_mark_to_floor() {
        assert_eq!(at_rate(25).adaptive_high_water_mark(), 32 * 1024);
        assert_eq!(at_rate(1).adaptive_high_water_mark(), MIN_HIGH_WATER_MARK);
    }

    #[test]
    fn memory_pressure_dominates_throughput() {
        let c = pressured(at_rate(100_000), 90.0);
        assert_eq!(c.adaptive_high_water_mark(), 128 * 1024);
        let c = pressured(at_rate(1), 90.0);
        assert_eq!(c.adaptive_high_water_mark(), MIN_HIGH_WATER_MARK);
        let c = pressured(BackpressureController::new(), 80.0);
        assert_eq!(c.adaptive_high_water_mark(), BASE_HIGH_WATER_MARK);
    }

    #[test]
    fn override_is_a_ceiling() {
        let c = at_rate(100_000).high_water_mark_override(Some(16 * 1024));
        assert_eq!(c.adaptive_high_water_mark(), 16 * 1024);
        let c = at_rate(1).high_water_mark_override(Some(1 << 20));
        assert_eq!(c.adaptive_high_water_mark(), MIN_HIGH_WATER_MARK);
    }

    #[test]
    fn pause_threshold_and_delay() {
        let c = BackpressureController::new();
        let hwm = c.adaptive_high_water_mark();
        assert!(!c.should_pause(hwm));
        assert!(c.should_pause(hwm + 1));

        assert_eq!(c.pause_delay(hwm + 1), Duration::from_millis(10));
        assert_eq!(c.pause_delay(hwm + hwm / 2), Duration::from_millis(25));
        assert_eq!(c.pause_delay(hwm * 10), Duration::from_millis(100));
    }

    #[test]
    fn buffer_class_follows_mark_and_pressure() {
        let c = BackpressureController::new();
        assert_eq!(c.buffer_class_for(100), BufferClass::Small);
        assert_eq!(c.buffer_class_for(10 << 20), BufferClass::Medium);
        assert_eq!(at_rate(100_000).buffer_class_for(10 << 20), BufferClass::Large);

        let c = pressured(BackpressureController::new(), 95.0);
        assert_eq!(c.buffer_class_for(10 << 20), BufferClass::Small);
        assert_eq!(c.buffer_class_for(100), BufferClass::Small);
    }

    #[test]
    fn window_is_bounded() {
        let mut window = ThroughputWindow::new(2);
        assert_eq!(window.chunks_per_second(), None);
        window.record(10, Duration::from_secs(1));
        window.record(20, Duration::from_secs(1));
        window.record(30, Duration::from_secs(1));
        assert_eq!(window.len(), 2);
        assert_eq!(window.chunks_per_second(), Some(25.0));
        window.record(5, Duration::ZERO);
        assert_eq!(window.chunks_per_second(), Some(35.0));
    }
}
