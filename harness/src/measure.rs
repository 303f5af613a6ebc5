//! Measurement wrapper
//!
//! Wall-clock timing around exactly one backend operation, followed right
//! away by a host memory/swap sample. Connection setup and teardown happen
//! outside the timed region.

use sensorbench_shared::utils::bytes_to_gib;
use std::future::Future;
use std::time::{Duration, Instant};
use sysinfo::System;

/// Host memory pressure at one instant, in GiB.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceSample {
    pub ram_used_gb: f64,
    pub swap_used_gb: f64,
}

/// Samples host RAM and swap usage on demand.
pub struct ResourceProbe {
    system: System,
}

impl ResourceProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    pub fn sample(&mut self) -> ResourceSample {
        self.system.refresh_memory();
        ResourceSample {
            ram_used_gb: bytes_to_gib(self.system.used_memory()),
            swap_used_gb: bytes_to_gib(self.system.used_swap()),
        }
    }
}

impl Default for ResourceProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one measured operation.
#[derive(Debug)]
pub struct Measurement<T> {
    pub output: T,
    pub elapsed: Duration,
    pub resources: ResourceSample,
}

impl<T> Measurement<T> {
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Await `operation`, returning its output and the time it took.
pub async fn timed<F: Future>(operation: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let output = operation.await;
    (output, start.elapsed())
}

/// Time `operation`, then sample host resources immediately after it returns.
pub async fn measure<F: Future>(probe: &mut ResourceProbe, operation: F) -> Measurement<F::Output> {
    let (output, elapsed) = timed(operation).await;
    let resources = probe.sample();
    Measurement {
        output,
        elapsed,
        resources,
    }
}
