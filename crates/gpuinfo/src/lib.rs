//! GPU telemetry snapshot reporter
//!
//! Reads the first visible GPU through a [`TelemetryProvider`] and writes a
//! six-line report: name, total memory (MiB), used memory (MiB), temperature
//! (°C), utilization (%) and fan speed (%).

pub mod config;
pub mod error;
pub mod provider;
pub mod report;
pub mod snapshot;

pub use error::ProviderError;
pub use error::ReportError;
pub use provider::TelemetryProvider;
pub use report::Reporter;
pub use snapshot::GpuSnapshot;
