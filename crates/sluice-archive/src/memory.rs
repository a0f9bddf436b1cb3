//! Memory accounting and limit checks for an extraction run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Point-in-time memory reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsageSnapshot {
    pub heap_used: u64,
    pub heap_total: u64,
    pub external: u64,
    pub rss: u64,
}

/// Byte counters for memory the extractor itself holds.
///
/// `heap_used` is checked-out buffers + staged entry bytes + bytes buffered in
/// the sink + a fixed overhead. Pooled (free) buffers count toward
/// `heap_total` only, since they can be dropped at any time to shed load.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    in_use: AtomicU64,
    pooled: AtomicU64,
    staged: AtomicU64,
    external: AtomicU64,
    overhead: u64,
    peak: AtomicU64,
}

impl MemoryLedger {
    pub fn new(overhead: u64) -> Self {
        Self {
            overhead,
            peak: AtomicU64::new(overhead),
            ..Default::default()
        }
    }

    pub fn add_in_use(&self, bytes: u64) {
        self.in_use.fetch_add(bytes, Ordering::Relaxed);
        self.update_peak();
    }

    pub fn sub_in_use(&self, bytes: u64) {
        self.in_use.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn add_pooled(&self, bytes: u64) {
        self.pooled.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn sub_pooled(&self, bytes: u64) {
        self.pooled.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Bytes of an entry held in memory ahead of a single write.
    pub fn set_staged(&self, bytes: u64) {
        self.staged.store(bytes, Ordering::Relaxed);
        self.update_peak();
    }

    /// Bytes the sink has accepted but not yet stored.
    pub fn set_external(&self, bytes: u64) {
        self.external.store(bytes, Ordering::Relaxed);
        self.update_peak();
    }

    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn pooled(&self) -> u64 {
        self.pooled.load(Ordering::Relaxed)
    }

    pub fn external(&self) -> u64 {
        self.external.load(Ordering::Relaxed)
    }

    pub fn heap_used(&self) -> u64 {
        self.in_use() + self.staged.load(Ordering::Relaxed) + self.external() + self.overhead
    }

    /// Highest `heap_used` observed since creation or the last reset.
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn reset_peak(&self) {
        self.peak.store(self.heap_used(), Ordering::Relaxed);
    }

    fn update_peak(&self) {
        self.peak.fetch_max(self.heap_used(), Ordering::Relaxed);
    }
}

/// Resident memory of the current process, via `sysinfo`.
pub struct ProcessProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// `(resident, virtual)` bytes, or zeros when the platform can't say.
    pub fn sample(&self) -> (u64, u64) {
        let (Some(pid), Ok(mut system)) = (self.pid, self.system.lock()) else {
            return (0, 0);
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system
            .process(pid)
            .map_or((0, 0), |p| (p.memory(), p.virtual_memory()))
    }
}

pub enum MemorySource {
    /// Bytes accounted by the extractor (deterministic, per run).
    Ledger(Arc<MemoryLedger>),
    /// Whole-process resident memory.
    Process(ProcessProbe),
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger(ledger) => f.debug_tuple("Ledger").field(ledger).finish(),
            Self::Process(_) => f.write_str("Process"),
        }
    }
}

/// Which [`MemorySource`] an engine builds when none is supplied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySourceKind {
    #[default]
    Ledger,
    Process,
}

pub type AlertCallback = Box<dyn FnMut(&MemoryUsageSnapshot) + Send>;

pub const DEFAULT_WARNING_THRESHOLD_PERCENT: f64 = 80.0;

/// Compares current usage against a limit and a warning threshold.
pub struct MemoryMonitor {
    source: MemorySource,
    limit: Option<u64>,
    warning_threshold_percent: f64,
    alert: Option<AlertCallback>,
    armed: bool,
}

impl fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("source", &self.source)
            .field("limit", &self.limit)
            .field("warning_threshold_percent", &self.warning_threshold_percent)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl MemoryMonitor {
    pub fn new(source: MemorySource) -> Self {
        Self {
            source,
            limit: None,
            warning_threshold_percent: DEFAULT_WARNING_THRESHOLD_PERCENT,
            alert: None,
            armed: true,
        }
    }

    /// A monitor over a fresh ledger with no fixed overhead.
    pub fn accounted() -> Self {
        Self::new(MemorySource::Ledger(Arc::new(MemoryLedger::new(0))))
    }

    pub fn process() -> Self {
        Self::new(MemorySource::Process(ProcessProbe::new()))
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn warning_threshold_percent(mut self, percent: f64) -> Self {
        self.warning_threshold_percent = percent.clamp(0.0, 100.0);
        self
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn ledger(&self) -> Option<&Arc<MemoryLedger>> {
        match &self.source {
            MemorySource::Ledger(ledger) => Some(ledger),
            MemorySource::Process(_) => None,
        }
    }

    pub fn current_usage(&self) -> MemoryUsageSnapshot {
        match &self.source {
            MemorySource::Ledger(ledger) => {
                let heap_used = ledger.heap_used();
                MemoryUsageSnapshot {
                    heap_used,
                    heap_total: heap_used + ledger.pooled(),
                    external: ledger.external(),
                    rss: 0,
                }
            }
            MemorySource::Process(probe) => {
                let (rss, virt) = probe.sample();
                MemoryUsageSnapshot {
                    heap_used: rss,
                    heap_total: virt.max(rss),
                    external: 0,
                    rss,
                }
            }
        }
    }

    pub fn is_limit_exceeded(&self) -> bool {
        self.exceeds_limit(&self.current_usage())
    }

    pub fn exceeds_limit(&self, snapshot: &MemoryUsageSnapshot) -> bool {
        self.limit.is_some_and(|limit| snapshot.heap_used >= limit)
    }

    pub fn is_warning_threshold_exceeded(&self) -> bool {
        self.exceeds_warning(&self.current_usage())
    }

    fn exceeds_warning(&self, snapshot: &MemoryUsageSnapshot) -> bool {
        self.limit.is_some_and(|limit| {
            limit == 0
                || snapshot.heap_used as f64 / limit as f64 >= self.warning_threshold_percent / 100.0
        })
    }

    pub fn usage_percentage(&self) -> f64 {
        self.percentage_of(&self.current_usage())
    }

    pub fn percentage_of(&self, snapshot: &MemoryUsageSnapshot) -> f64 {
        match self.limit {
            None => 0.0,
            Some(0) => 100.0,
            Some(limit) => (100.0 * snapshot.heap_used as f64 / limit as f64).min(100.0),
        }
    }

    pub fn set_alert_callback(&mut self, callback: impl FnMut(&MemoryUsageSnapshot) + Send + 'static) {
        self.alert = Some(Box::new(callback));
        self.armed = true;
    }

    /// Fire the alert callback once per upward crossing of the warning
    /// threshold. Returns the snapshot when an alert fired.
    pub fn check_and_alert(&mut self) -> Option<MemoryUsageSnapshot> {
        let snapshot = self.current_usage();
        self.alert_on(&snapshot).then_some(snapshot)
    }

    /// Edge detection against an already-taken snapshot.
    pub(crate) fn alert_on(&mut self, snapshot: &MemoryUsageSnapshot) -> bool {
        if !self.exceeds_warning(snapshot) {
            self.armed = true;
            return false;
        }
        if !self.armed {
            return false;
        }
        self.armed = false;
        if let Some(alert) = self.alert.as_mut() {
            alert(snapshot);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn monitor(limit: u64) -> (MemoryMonitor, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new(0));
        let monitor =
            MemoryMonitor::new(MemorySource::Ledger(Arc::clone(&ledger))).limit(Some(limit));
        (monitor, ledger)
    }

    #[test]
    fn unbounded_monitor_never_trips() {
        let monitor = MemoryMonitor::accounted();
        monitor.ledger().unwrap().add_in_use(u64::MAX / 2);
        assert!(!monitor.is_limit_exceeded());
        assert!(!monitor.is_warning_threshold_exceeded());
        assert_eq!(monitor.usage_percentage(), 0.0);
    }

    #[test]
    fn limit_is_inclusive() {
        let (monitor, ledger) = monitor(1000);
        ledger.add_in_use(999);
        assert!(!monitor.is_limit_exceeded());
        ledger.add_in_use(1);
        assert!(monitor.is_limit_exceeded());
    }

    #[test]
    fn percentage_and_warning() {
        let (monitor, ledger) = monitor(1000);
        ledger.add_in_use(790);
        assert!((monitor.usage_percentage() - 79.0).abs() < 1e-9);
        assert!(!monitor.is_warning_threshold_exceeded());
        ledger.add_in_use(10);
        assert!(monitor.is_warning_threshold_exceeded());
        ledger.add_in_use(5000);
        assert_eq!(monitor.usage_percentage(), 100.0);
    }

    #[test]
    fn alert_is_edge_triggered_and_rearms() {
        let (mut monitor, ledger) = monitor(100);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        monitor.set_alert_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        ledger.add_in_use(85);
        assert!(monitor.check_and_alert().is_some());
        assert!(monitor.check_and_alert().is_none());
        assert!(monitor.check_and_alert().is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        ledger.sub_in_use(50);
        assert!(monitor.check_and_alert().is_none());
        ledger.add_in_use(50);
        assert!(monitor.check_and_alert().is_some());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ledger_peak_and_overhead() {
        let ledger = MemoryLedger::new(100);
        assert_eq!(ledger.heap_used(), 100);
        ledger.add_in_use(50);
        ledger.set_staged(25);
        ledger.set_external(5);
        assert_eq!(ledger.heap_used(), 180);
        ledger.sub_in_use(50);
        ledger.set_staged(0);
        assert_eq!(ledger.peak(), 180);
        ledger.reset_peak();
        assert_eq!(ledger.peak(), 105);
    }

    #[test]
    fn pooled_bytes_count_toward_total_only() {
        let (monitor, ledger) = monitor(1 << 20);
        ledger.add_pooled(4096);
        let snapshot = monitor.current_usage();
        assert_eq!(snapshot.heap_used, 0);
        assert_eq!(snapshot.heap_total, 4096);
    }

    #[test]
    fn process_probe_reports_something() {
        let monitor = MemoryMonitor::process();
        let snapshot = monitor.current_usage();
        assert!(snapshot.heap_total >= snapshot.heap_used);
    }
}
