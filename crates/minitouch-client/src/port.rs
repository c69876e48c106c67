//! Local port selection for `adb forward`

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;
use std::sync::Mutex;

use rand::seq::IteratorRandom;

use crate::error::{MinitouchError, Result};

/// Hands out unused local TCP ports from a fixed range.
///
/// Candidates are picked at random and probed by binding them on the
/// loopback interface; ports found busy are dropped from the pool. The pool
/// sits behind a mutex so an `Arc<PortAllocator>` can be shared by several
/// sessions.
#[derive(Debug)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    free: Mutex<BTreeSet<u16>>,
}

impl PortAllocator {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        let free = range.clone().collect();
        Self {
            range,
            free: Mutex::new(free),
        }
    }

    /// Take a free port out of the pool
    pub fn acquire(&self) -> Result<u16> {
        let mut free = self.lock();
        let mut rng = rand::rng();

        loop {
            let Some(port) = free.iter().copied().choose(&mut rng) else {
                break;
            };
            free.remove(&port);
            if is_port_free(port) {
                tracing::debug!(port, "Allocated local port");
                return Ok(port);
            }
            tracing::debug!(port, "Local port in use, skipping");
        }

        Err(MinitouchError::PortsExhausted {
            start: *self.range.start(),
            end: *self.range.end(),
        })
    }

    /// Return a port to the pool. Ports outside the range are ignored.
    pub fn release(&self, port: u16) {
        if self.range.contains(&port) {
            self.lock().insert(port);
        }
    }

    /// Number of ports still available
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<u16>> {
        // The set stays consistent even if a holder panicked
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(20000..=20999)
    }
}

fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}
