use crate::{GatewayError, GatewayResult};
use candle_core::{
    utils::{cuda_is_available, metal_is_available},
    Device,
};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};

/// Where inference runs. Names are matched case-insensitively: `cpu`, `cuda`, `metal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    /// First accelerator that actually opens on this machine, otherwise the CPU.
    pub fn preferred() -> Self {
        [ComputeDevice::Cuda, ComputeDevice::Metal]
            .into_iter()
            .find(|device| device.open().is_ok())
            .unwrap_or(ComputeDevice::Cpu)
    }

    pub fn parse(name: &str) -> GatewayResult<Self> {
        Self::from_str(name.trim()).map_err(|_| GatewayError::UnsupportedDevice(name.to_string()))
    }

    /// Whether candle was built with support for this backend. Says nothing about hardware.
    pub fn is_compiled(&self) -> bool {
        match self {
            ComputeDevice::Cpu => true,
            ComputeDevice::Cuda => cuda_is_available(),
            ComputeDevice::Metal => metal_is_available(),
        }
    }

    pub fn open(&self) -> GatewayResult<Device> {
        if !self.is_compiled() {
            return Err(GatewayError::UnsupportedDevice(format!(
                "{} support is not compiled in",
                self
            )));
        }

        let device = match self {
            ComputeDevice::Cpu => Ok(Device::Cpu),
            ComputeDevice::Cuda => Device::new_cuda(0),
            ComputeDevice::Metal => Device::new_metal(0),
        };

        device.map_err(|e| GatewayError::UnsupportedDevice(format!("{}: {}", self, e)))
    }
}

#[cfg(test)]
mod test {
    use super::ComputeDevice;
    use crate::GatewayError;

    #[test]
    fn test_parse_device() {
        assert_eq!(ComputeDevice::parse("cpu").unwrap(), ComputeDevice::Cpu);
        assert_eq!(ComputeDevice::parse(" CUDA ").unwrap(), ComputeDevice::Cuda);
        assert_eq!(ComputeDevice::parse("Metal").unwrap(), ComputeDevice::Metal);
        assert_eq!(ComputeDevice::Cuda.to_string(), "cuda");

        assert_eq!(
            ComputeDevice::parse("tpu"),
            Err(GatewayError::UnsupportedDevice("tpu".into()))
        );
    }

    #[test]
    fn test_cpu_always_opens() {
        assert!(ComputeDevice::Cpu.is_compiled());
        assert!(ComputeDevice::Cpu.open().is_ok());
    }

    #[test]
    fn test_preferred_device_opens() {
        // a build with an accelerator backend may still run on a host without the hardware
        let device = ComputeDevice::preferred();
        assert!(device.open().is_ok(), "{} was preferred but does not open", device);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_missing() {
        assert!(!ComputeDevice::Cuda.is_compiled());
        assert!(matches!(
            ComputeDevice::Cuda.open(),
            Err(GatewayError::UnsupportedDevice(_))
        ));
        assert_ne!(ComputeDevice::preferred(), ComputeDevice::Cuda);
    }
}
