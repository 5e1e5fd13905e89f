use candle_core::Device;

use crate::config::RuntimeConfig;

/// Picks the compute device from explicit runtime settings.
///
/// CPU when `force_cpu` is set, otherwise the first CUDA device if one is
/// available (requires the `cuda` feature), else CPU.
pub fn setup_device(runtime: &RuntimeConfig) -> candle_core::Result<Device> {
    if runtime.force_cpu {
        log::info!("force_cpu set, using CPU backend");
        return Ok(Device::Cpu);
    }

    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("CUDA device selected: {device:?}");
            Ok(device)
        }
        Ok(_) => {
            log::info!("using CPU backend");
            Ok(Device::Cpu)
        }
        Err(err) => {
            log::warn!("CUDA initialisation failed ({err}), falling back to CPU");
            Ok(Device::Cpu)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_cpu_short_circuits() {
        let device = setup_device(&RuntimeConfig { force_cpu: true }).unwrap();
        assert!(device.is_cpu());
    }
}
