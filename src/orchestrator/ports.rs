//! Rotating allocator for worker callback ports.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use super::registry::SessionRegistry;
use crate::{AppError, Result};

/// Hands out ports from `min..=max` in rotation, skipping ports held by
/// live sessions.
#[derive(Debug)]
pub struct PortAllocator {
    min: u16,
    max: u16,
    next: Mutex<u16>,
}

impl PortAllocator {
    /// Allocator over an inclusive range; `min` must not exceed `max`.
    #[must_use]
    pub fn new(min: u16, max: u16) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            next: Mutex::new(min),
        }
    }

    /// Next port not used by any live session in `registry`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::WorkerLaunch` when every port in the range is taken.
    pub fn allocate(&self, registry: &SessionRegistry) -> Result<u16> {
        let in_use: HashSet<u16> = registry.snapshot().iter().map(|s| s.http_port()).collect();
        let span = u32::from(self.max - self.min) + 1;

        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..span {
            let candidate = *next;
            *next = if candidate >= self.max {
                self.min
            } else {
                candidate + 1
            };
            if !in_use.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(AppError::WorkerLaunch(format!(
            "no free callback port in {}..={}",
            self.min, self.max
        )))
    }
}
