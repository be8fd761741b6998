//! Admission gate for parallel streams: a counting semaphore over
//! `parking_lot::{Mutex, Condvar}`.

use parking_lot::{Condvar, Mutex};

pub struct AdmissionGate {
    limit: usize,
    running: Mutex<usize>,
    released: Condvar,
    peak: Mutex<usize>,
}

impl AdmissionGate {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            running: Mutex::new(0),
            released: Condvar::new(),
            peak: Mutex::new(0),
        }
    }

    /// Blocks until fewer than `limit` permits are held, then takes one.
    pub fn admit(&self) -> Permit<'_> {
        let mut running = self.running.lock();
        while *running >= self.limit {
            self.released.wait(&mut running);
        }
        *running += 1;

        let mut peak = self.peak.lock();
        *peak = (*peak).max(*running);

        Permit { gate: self }
    }

    #[must_use]
    pub fn running(&self) -> usize {
        *self.running.lock()
    }

    /// Highest number of permits held at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        *self.peak.lock()
    }

    /// Maximum number of permits held at once. Never zero.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A held admission slot. Dropping it wakes the waiters.
#[must_use]
pub struct Permit<'g> {
    gate: &'g AdmissionGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut running = self.gate.running.lock();
        *running -= 1;
        drop(running);
        self.gate.released.notify_all();
    }
}
