use std::collections::HashSet;
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::error::StompError;

struct Pool {
    in_use: HashSet<u32>,
    next: u32,
}

fn pool() -> &'static Mutex<Pool> {
    static POOL: OnceLock<Mutex<Pool>> = OnceLock::new();
    POOL.get_or_init(|| {
        Mutex::new(Pool {
            in_use: HashSet::new(),
            next: 1,
        })
    })
}

/// Allocator of ids that are unique among all live ids in the process.
///
/// All generators draw from one process-wide pool, so two sessions can
/// never hold the same subscription or transaction id at the same time. An
/// instance tracks the ids it handed out and returns them to the pool on
/// [`IdGenerator::release`] or when dropped.
#[derive(Debug, Default)]
pub struct IdGenerator {
    held: HashSet<u32>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            held: HashSet::new(),
        }
    }

    /// Hand out a fresh id, or fail with [`StompError::IdsExhausted`] when
    /// every id in the space is live.
    pub fn generate(&mut self) -> Result<u32, StompError> {
        let mut pool = pool().lock().unwrap_or_else(PoisonError::into_inner);
        let start = pool.next;
        loop {
            let candidate = pool.next;
            pool.next = if pool.next == u32::MAX { 1 } else { pool.next + 1 };
            if pool.in_use.insert(candidate) {
                self.held.insert(candidate);
                return Ok(candidate);
            }
            if pool.next == start {
                return Err(StompError::IdsExhausted);
            }
        }
    }

    /// Return an id to the pool. Ids generated by other instances are left
    /// alone.
    pub fn release(&mut self, id: u32) {
        if self.held.remove(&id) {
            let mut pool = pool().lock().unwrap_or_else(PoisonError::into_inner);
            pool.in_use.remove(&id);
        }
    }

    /// Ids currently held by this instance.
    pub fn held(&self) -> usize {
        self.held.len()
    }
}

impl Drop for IdGenerator {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let mut pool = pool().lock().unwrap_or_else(PoisonError::into_inner);
        for id in self.held.drain() {
            pool.in_use.remove(&id);
        }
    }
}
