//! Device telemetry provider seam
//!
//! The reporter only needs the ordered list of visible GPUs. Backends map
//! their vendor-specific counters onto [`GpuSnapshot`].

pub mod mock;
pub mod nvml;

use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub use self::nvml::NvmlProvider;
use crate::error::ProviderError;
use crate::snapshot::GpuSnapshot;

type QueryResult = Result<Vec<GpuSnapshot>, ProviderError>;

/// Source of per-GPU telemetry
pub trait TelemetryProvider {
    /// List visible GPUs in device index order
    fn list_gpus(&self) -> Result<Vec<GpuSnapshot>, ProviderError>;
}

impl<T> TelemetryProvider for Box<T>
where
    T: TelemetryProvider + ?Sized,
{
    fn list_gpus(&self) -> Result<Vec<GpuSnapshot>, ProviderError> {
        (**self).list_gpus()
    }
}

impl<T> TelemetryProvider for Arc<T>
where
    T: TelemetryProvider + ?Sized,
{
    fn list_gpus(&self) -> Result<Vec<GpuSnapshot>, ProviderError> {
        (**self).list_gpus()
    }
}

/// Bounds the wrapped provider's query with a deadline.
///
/// The query runs on a helper thread and at most one helper exists at a
/// time. A query that outlives its deadline stays pending: later calls wait
/// on it again instead of starting another one, and return its result once
/// it arrives.
pub struct TimeoutProvider<P> {
    inner: Arc<P>,
    timeout: Duration,
    pending: Mutex<Option<Receiver<QueryResult>>>,
}

impl<P> TimeoutProvider<P>
where
    P: TelemetryProvider + Send + Sync + 'static,
{
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
            pending: Mutex::new(None),
        }
    }

    fn spawn_query(&self) -> Result<Receiver<QueryResult>, ProviderError> {
        let (sender, receiver) = mpsc::channel();
        let inner = Arc::clone(&self.inner);

        thread::Builder::new()
            .name("gpu-telemetry".to_string())
            .spawn(move || {
                // receiver is gone if the provider was dropped meanwhile
                let _ = sender.send(inner.list_gpus());
            })
            .map_err(|e| ProviderError::Query(format!("failed to spawn query thread: {e}")))?;

        Ok(receiver)
    }
}

impl<P> TelemetryProvider for TimeoutProvider<P>
where
    P: TelemetryProvider + Send + Sync + 'static,
{
    fn list_gpus(&self) -> Result<Vec<GpuSnapshot>, ProviderError> {
        let mut pending = self.pending.lock().expect("poisoned");

        let receiver = match pending.take() {
            Some(receiver) => {
                tracing::debug!("Previous GPU telemetry query still pending, waiting on it");
                receiver
            }
            None => self.spawn_query()?,
        };

        match receiver.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("GPU telemetry query exceeded {:?}", self.timeout);
                *pending = Some(receiver);
                Err(ProviderError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(ProviderError::Query(
                "query thread exited without a result".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::mock::MockTelemetryProvider;
    use super::*;

    #[test]
    fn timeout_passes_through_fast_results() {
        let mock = MockTelemetryProvider::new();
        mock.set_gpus(vec![MockTelemetryProvider::gpu("A")]);

        let provider = TimeoutProvider::new(mock, Duration::from_secs(5));
        let gpus = provider.list_gpus().expect("should list gpus");

        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].name, "A");
    }

    #[test]
    fn timeout_passes_through_errors() {
        let mock = MockTelemetryProvider::new();
        mock.set_error_mode(true);

        let provider = TimeoutProvider::new(mock, Duration::from_secs(5));
        assert!(matches!(provider.list_gpus(), Err(ProviderError::Query(_))));
    }

    #[test]
    fn timeout_fires_on_hung_provider() {
        let mock = MockTelemetryProvider::new();
        mock.set_gpus(vec![MockTelemetryProvider::gpu("A")]);
        mock.set_delay(Some(Duration::from_secs(2)));

        let provider = TimeoutProvider::new(mock, Duration::from_millis(50));
        let result = provider.list_gpus();

        assert!(
            matches!(result, Err(ProviderError::Timeout(d)) if d == Duration::from_millis(50)),
            "expected timeout, got {result:?}"
        );
    }

    #[test]
    fn timed_out_query_is_not_restarted() {
        let mock = Arc::new(MockTelemetryProvider::new());
        mock.set_gpus(vec![MockTelemetryProvider::gpu("A")]);
        mock.set_delay(Some(Duration::from_millis(300)));

        let provider = TimeoutProvider::new(Arc::clone(&mock), Duration::from_millis(20));
        for _ in 0..5 {
            assert!(matches!(provider.list_gpus(), Err(ProviderError::Timeout(_))));
        }
        assert_eq!(mock.query_count(), 1);

        // the pending query delivers once it finishes
        thread::sleep(Duration::from_millis(400));
        let gpus = provider.list_gpus().expect("pending query should complete");
        assert_eq!(gpus[0].name, "A");
        assert_eq!(mock.query_count(), 1);

        // with nothing pending the next call starts a fresh query
        mock.set_delay(None);
        provider.list_gpus().expect("should list gpus");
        assert_eq!(mock.query_count(), 2);
    }

    #[test]
    fn arc_provider_delegates() {
        let mock = Arc::new(MockTelemetryProvider::new());
        mock.set_gpus(vec![MockTelemetryProvider::gpu("A")]);

        let shared = Arc::clone(&mock);
        assert_eq!(TelemetryProvider::list_gpus(&shared).expect("should list gpus").len(), 1);
        assert_eq!(mock.query_count(), 1);
    }

    #[test]
    fn boxed_provider_delegates() {
        let mock = MockTelemetryProvider::new();
        mock.set_gpus(vec![
            MockTelemetryProvider::gpu("A"),
            MockTelemetryProvider::gpu("B"),
        ]);

        let boxed: Box<dyn TelemetryProvider> = Box::new(mock);
        assert_eq!(boxed.list_gpus().expect("should list gpus").len(), 2);
    }
}
