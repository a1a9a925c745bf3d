//! Counting semaphore for gating access to a shared backend.
//!
//! Uses `Mutex + Condvar` from std. The inference client holds a
//! single-permit instance so at most one request reaches the model runner.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A counting semaphore that limits concurrent access to a shared resource.
pub struct Semaphore {
    state: Mutex<usize>,
    cond: Condvar,
}

/// RAII guard that releases one permit on drop.
pub struct SemaphoreGuard<'a>(&'a Semaphore);

impl Semaphore {
    /// Create a semaphore with `permits` initial permits.
    pub const fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    // A panic while holding the count cannot leave it inconsistent.
    fn count(&self) -> MutexGuard<'_, usize> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is available, then acquire it.
    pub fn acquire(&self) -> SemaphoreGuard<'_> {
        let mut count = self.count();
        while *count == 0 {
            count = self
                .cond
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
        SemaphoreGuard(self)
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.0.count();
        *count += 1;
        self.0.cond.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Run `threads` workers through `sem`, returning the peak number inside at once.
    fn peak_holders(permits: usize, threads: usize) -> usize {
        let sem = Arc::new(Semaphore::new(permits));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let (sem, inside, peak) = (sem.clone(), inside.clone(), peak.clone());
                std::thread::spawn(move || {
                    let _g = sem.acquire();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        peak.load(Ordering::SeqCst)
    }

    #[test]
    fn single_permit_serializes() {
        assert_eq!(peak_holders(1, 6), 1);
    }

    #[test]
    fn permits_bound_concurrency() {
        assert!(peak_holders(2, 6) <= 2);
    }

    #[test]
    fn blocking_acquire() {
        let sem = Arc::new(Semaphore::new(1));
        let guard = sem.acquire();

        let sem2 = sem.clone();
        let handle = std::thread::spawn(move || {
            let _g = sem2.acquire();
            42
        });

        // Give thread time to block
        std::thread::sleep(Duration::from_millis(50));
        drop(guard);

        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn static_gate_is_reusable() {
        static GATE: Semaphore = Semaphore::new(1);
        drop(GATE.acquire());
        drop(GATE.acquire());
    }
}
