//! Launch futures and their state machine

use parking_lot::{Condvar, Mutex};
use std::fmt;

/// Outcome of one kernel launch
pub trait LaunchFuture: Send + Sync + fmt::Debug {
    /// Whether the future refers to a pending or completed launch
    fn is_valid(&self) -> bool;

    /// Whether the launch finished successfully
    fn is_complete(&self) -> bool;

    /// Elapsed execution time in nanoseconds, once known
    fn time_ns(&self) -> Option<u64>;
}

/// Launch state; transitions only leave `Pending`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FutureState {
    /// Enqueued, not finished
    Pending,
    /// Finished with a measured duration
    Completed {
        /// Elapsed nanoseconds
        time_ns: u64,
    },
    /// Failed or abandoned
    Invalid,
}

/// Thread-safe holder of a [`FutureState`]
#[derive(Debug)]
pub struct FutureCell {
    state: Mutex<FutureState>,
    settled: Condvar,
}

impl Default for FutureCell {
    fn default() -> Self {
        Self::new()
    }
}

impl FutureCell {
    /// Create a pending cell
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FutureState::Pending),
            settled: Condvar::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> FutureState {
        *self.state.lock()
    }

    /// Move `Pending -> Completed`; returns false if already settled
    pub fn complete(&self, time_ns: u64) -> bool {
        self.settle(FutureState::Completed { time_ns })
    }

    /// Move `Pending -> Invalid`; returns false if already settled
    pub fn invalidate(&self) -> bool {
        self.settle(FutureState::Invalid)
    }

    /// Block until the state leaves `Pending`
    pub fn wait(&self) -> FutureState {
        let mut state = self.state.lock();
        while *state == FutureState::Pending {
            self.settled.wait(&mut state);
        }
        *state
    }

    fn settle(&self, next: FutureState) -> bool {
        let mut state = self.state.lock();
        if *state != FutureState::Pending {
            return false;
        }
        *state = next;
        self.settled.notify_all();
        true
    }
}

impl LaunchFuture for FutureCell {
    fn is_valid(&self) -> bool {
        self.state() != FutureState::Invalid
    }

    fn is_complete(&self) -> bool {
        matches!(self.state(), FutureState::Completed { .. })
    }

    fn time_ns(&self) -> Option<u64> {
        match self.state() {
            FutureState::Completed { time_ns } => Some(time_ns),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_pending_is_valid_without_time() {
        let cell = FutureCell::new();
        assert!(cell.is_valid());
        assert!(!cell.is_complete());
        assert_eq!(cell.time_ns(), None);
    }

    #[test]
    fn test_never_transitions_backward() {
        let cell = FutureCell::new();
        assert!(cell.complete(42));
        assert!(!cell.invalidate());
        assert!(!cell.complete(7));
        assert_eq!(cell.time_ns(), Some(42));

        let failed = FutureCell::new();
        assert!(failed.invalidate());
        assert!(!failed.complete(1));
        assert!(!failed.is_valid());
        assert_eq!(failed.time_ns(), None);
    }

    #[test]
    fn test_wait_observes_completion_from_other_thread() {
        let cell = Arc::new(FutureCell::new());
        let worker = {
            let cell = cell.clone();
            std::thread::spawn(move || {
                cell.complete(5);
            })
        };
        assert_eq!(cell.wait(), FutureState::Completed { time_ns: 5 });
        worker.join().unwrap();
    }
}
