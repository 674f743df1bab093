use std::fmt;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub completed: usize,
    pub total: usize,
}

impl Snapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}% ({}/{})", self.percent(), self.completed, self.total)
    }
}

/// Completed/total window counter shared by the worker pool.
#[derive(Debug)]
pub struct Progress {
    inner: Mutex<Snapshot>,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(Snapshot {
                completed: 0,
                total,
            }),
        }
    }

    /// Marks one window terminal and returns the counter right after it.
    pub fn record_done(&self) -> Snapshot {
        let mut guard = self.inner.lock();
        guard.completed += 1;
        *guard
    }

    pub fn snapshot(&self) -> Snapshot {
        *self.inner.lock()
    }
}
