use std::ffi::OsStr;

use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::Nvml;

use super::TelemetryProvider;
use crate::error::ProviderError;
use crate::snapshot::GpuSnapshot;

const MIB: u64 = 1024 * 1024;

/// NVML-backed provider. The library handle is shut down on drop.
pub struct NvmlProvider {
    nvml: Nvml,
}

impl NvmlProvider {
    pub fn open() -> Result<Self, ProviderError> {
        let nvml = match Nvml::init() {
            Ok(nvml) => {
                tracing::debug!("NVML initialized successfully");
                nvml
            }
            Err(e) => {
                tracing::warn!(
                    "Standard NVML init failed ({}), trying with explicit library path",
                    e
                );
                let nvml = Nvml::builder()
                    .lib_path(OsStr::new("libnvidia-ml.so.1"))
                    .init()?;
                tracing::debug!("NVML initialized with explicit library path");
                nvml
            }
        };

        if let Ok(driver_version) = nvml.sys_driver_version() {
            tracing::info!(driver_version = %driver_version, "NVML ready");
        }

        Ok(Self { nvml })
    }

    fn read_device(&self, index: u32) -> Result<GpuSnapshot, ProviderError> {
        let device = self.nvml.device_by_index(index)?;
        let memory_info = device.memory_info()?;

        Ok(GpuSnapshot {
            name: device.name()?,
            memory_total: memory_info.total / MIB,
            memory_used: memory_info.used / MIB,
            temperature: device.temperature(TemperatureSensor::Gpu)?,
            utilization: device.utilization_rates()?.gpu,
            fan_speed: device.fan_speed(0)?,
        })
    }
}

impl TelemetryProvider for NvmlProvider {
    fn list_gpus(&self) -> Result<Vec<GpuSnapshot>, ProviderError> {
        let device_count = self.nvml.device_count()?;
        tracing::debug!("Discovered {} GPU device(s)", device_count);

        collect_devices(device_count, |index| self.read_device(index))
    }
}

/// Read devices in index order. Only the first device is required; later
/// devices that cannot be read are logged and left out.
fn collect_devices<F>(
    device_count: u32,
    mut read_device: F,
) -> Result<Vec<GpuSnapshot>, ProviderError>
where
    F: FnMut(u32) -> Result<GpuSnapshot, ProviderError>,
{
    let mut gpus = Vec::with_capacity(device_count as usize);

    for index in 0..device_count {
        match read_device(index) {
            Ok(gpu) => gpus.push(gpu),
            Err(e) if index == 0 => return Err(e),
            Err(e) => tracing::warn!("Skipping GPU {}: {}", index, e),
        }
    }

    Ok(gpus)
}
