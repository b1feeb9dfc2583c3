use std::path::PathBuf;
use std::time::Duration;

use nvml_wrapper::error::NvmlError;
use thiserror::Error;

/// Terminal failures of a single report run
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("GPU telemetry provider unavailable")]
    ProviderUnavailable(#[source] ProviderError),

    #[error("no GPU device found")]
    NoDeviceFound,

    #[error("failed to write report to `{}`", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("NVML error: {0}")]
    Nvml(#[from] NvmlError),

    #[error("telemetry query timed out after {0:?}")]
    Timeout(Duration),

    #[error("telemetry query failed: {0}")]
    Query(String),
}

impl From<ProviderError> for ReportError {
    fn from(err: ProviderError) -> Self {
        ReportError::ProviderUnavailable(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn display_formatting() {
        assert_eq!(ReportError::NoDeviceFound.to_string(), "no GPU device found");

        let write_failed = ReportError::WriteFailed {
            path: PathBuf::from("/readonly/gpuinfo.txt"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(
            write_failed.to_string(),
            "failed to write report to `/readonly/gpuinfo.txt`"
        );

        let timeout = ProviderError::Timeout(Duration::from_secs(3));
        assert_eq!(timeout.to_string(), "telemetry query timed out after 3s");
    }

    #[test]
    fn provider_error_is_kept_as_source() {
        let err = ReportError::from(ProviderError::Query("driver gone".to_string()));
        let source = err.source().expect("should carry the provider error");
        assert_eq!(source.to_string(), "telemetry query failed: driver gone");
    }
}
