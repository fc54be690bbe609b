use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter used for gate pass/skip/total tallies.
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub fn new(name: &'static str) -> Self {
        Counter {
            name,
            value: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }
}

impl Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "# TYPE {} counter\n{} {}\n", self.name, self.name, self.get())
    }
}

/// Per-gate pass/skip/total counters with a derived skip rate.
pub struct GateStats {
    pub passed: Counter,
    pub skipped: Counter,
    pub total: Counter,
}

impl GateStats {
    pub fn new(name: &'static str) -> Self {
        GateStats {
            passed: Counter::new(name),
            skipped: Counter::new(name),
            total: Counter::new(name),
        }
    }

    pub fn record(&self, passed: bool) {
        self.total.increment();
        if passed {
            self.passed.increment();
        } else {
            self.skipped.increment();
        }
    }

    pub fn skip_rate(&self) -> f64 {
        let total = self.total.get();
        if total == 0 {
            0.0
        } else {
            self.skipped.get() as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> GateStatsSnapshot {
        GateStatsSnapshot {
            passed: self.passed.get(),
            skipped: self.skipped.get(),
            total: self.total.get(),
            skip_rate: self.skip_rate(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateStatsSnapshot {
    pub passed: u64,
    pub skipped: u64,
    pub total: u64,
    pub skip_rate: f64,
}
