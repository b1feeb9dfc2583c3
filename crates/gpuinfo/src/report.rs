use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use crate::error::ReportError;
use crate::provider::TelemetryProvider;
use crate::snapshot::GpuSnapshot;

/// Default report location, relative to the working directory
pub const DEFAULT_OUTPUT: &str = "gpuinfo.txt";

/// Captures the first GPU's telemetry and writes it as a six-line report.
pub struct Reporter<P> {
    provider: P,
    output: PathBuf,
}

impl<P: TelemetryProvider> Reporter<P> {
    pub fn new(provider: P, output: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Query the provider, then replace the report file.
    pub fn run(&self) -> Result<(), ReportError> {
        let snapshot = self.capture()?;
        write_report(&self.output, &snapshot)?;

        tracing::info!(
            target: "metrics.gpu",
            tag_name = snapshot.name.as_str(),
            memory_total = snapshot.memory_total,
            memory_used = snapshot.memory_used,
            temperature = snapshot.temperature,
            utilization = snapshot.utilization,
            fan_speed = snapshot.fan_speed
        );
        tracing::debug!("Wrote report for {} to {:?}", snapshot.name, self.output);
        Ok(())
    }

    /// One watch-mode tick. Failures are logged, not returned.
    pub fn refresh(&self) {
        match self.run() {
            Ok(()) => tracing::debug!("GPU report updated"),
            Err(e) => tracing::warn!("Failed to update GPU report: {:#}", anyhow::Error::new(e)),
        }
    }

    /// Snapshot of device index 0; any further devices are ignored.
    pub fn capture(&self) -> Result<GpuSnapshot, ReportError> {
        let gpus = self.provider.list_gpus()?;
        if gpus.len() > 1 {
            tracing::debug!("{} GPUs visible, reporting index 0", gpus.len());
        }

        gpus.into_iter().next().ok_or(ReportError::NoDeviceFound)
    }
}

/// Replace `path` with the rendered snapshot.
///
/// The report goes to a temporary file in the same directory which is then
/// renamed over `path`, so a failed write never leaves a truncated report.
/// An existing report keeps its permissions; a new one gets the same mode a
/// plain create would (0o666 less the umask).
pub fn write_report(path: &Path, snapshot: &GpuSnapshot) -> Result<(), ReportError> {
    let write_failed = |source| ReportError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let existing_permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let mut builder = tempfile::Builder::new();
    builder.prefix(".gpuinfo");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }

    // the temporary file is removed on drop if anything below fails
    let mut file = builder.tempfile_in(dir).map_err(write_failed)?;
    if let Some(permissions) = existing_permissions {
        file.as_file()
            .set_permissions(permissions)
            .map_err(write_failed)?;
    }
    file.write_all(snapshot.to_string().as_bytes())
        .map_err(write_failed)?;
    file.as_file().sync_all().map_err(write_failed)?;
    file.persist(path).map_err(|e| write_failed(e.error))?;

    Ok(())
}
