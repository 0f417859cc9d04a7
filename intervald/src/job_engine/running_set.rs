// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of currently executing runs of one job, capped at `limit`.
#[derive(Debug, Clone)]
pub struct RunningSet {
    count: Arc<AtomicUsize>,
    limit: usize,
}

/// Held for the duration of one run; releases its slot on drop.
#[derive(Debug)]
pub struct RunPermit {
    count: Arc<AtomicUsize>,
}

impl RunningSet {
    pub fn new(limit: usize) -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Takes a slot unless `limit` runs are already active.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current >= self.limit {
                return None;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(RunPermit {
                        count: self.count.clone(),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}
