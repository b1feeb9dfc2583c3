//! In-memory provider for tests and dry runs

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::TelemetryProvider;
use crate::error::ProviderError;
use crate::snapshot::GpuSnapshot;

/// Mock telemetry provider with configurable devices, failures and latency
pub struct MockTelemetryProvider {
    gpus: Mutex<Vec<GpuSnapshot>>,
    error_mode: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
    queries: AtomicUsize,
}

impl MockTelemetryProvider {
    pub fn new() -> Self {
        Self {
            gpus: Mutex::new(Vec::new()),
            error_mode: Mutex::new(false),
            delay: Mutex::new(None),
            queries: AtomicUsize::new(0),
        }
    }

    /// Snapshot with fixed counters, distinguished by name only
    pub fn gpu(name: &str) -> GpuSnapshot {
        GpuSnapshot {
            name: name.to_string(),
            memory_total: 24576,
            memory_used: 1024,
            temperature: 45,
            utilization: 12,
            fan_speed: 30,
        }
    }

    pub fn set_gpus(&self, gpus: Vec<GpuSnapshot>) {
        *self.gpus.lock().unwrap() = gpus;
    }

    /// Enable or disable error mode for testing error handling
    pub fn set_error_mode(&self, enabled: bool) {
        *self.error_mode.lock().unwrap() = enabled;
    }

    /// Make every query block for the given duration first
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl Default for MockTelemetryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryProvider for MockTelemetryProvider {
    fn list_gpus(&self) -> Result<Vec<GpuSnapshot>, ProviderError> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        if *self.error_mode.lock().unwrap() {
            return Err(ProviderError::Query("mock provider in error mode".to_string()));
        }

        Ok(self.gpus.lock().unwrap().clone())
    }
}
