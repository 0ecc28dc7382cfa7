//! Per-kernel energy attribution and clock scaling for GPU compute devices.
//!
//! A [`ProfilingQueue`] wraps the host runtime's queue. Every kernel submitted
//! through it gets a sampler thread that integrates device power (or brackets
//! a hardware energy counter) from the moment the kernel starts running until
//! it completes. Devices are reached through one [`VendorAdapter`] per
//! backend: NVML, ROCm-SMI, Level-Zero, GEOPM and RAPL.

pub mod config;
pub mod constants;
pub mod cpu_type;
pub mod device;
pub mod energy;
pub mod error;
pub mod frequency;
pub mod host;
pub mod host_queue;
pub mod kernel;
pub mod power;
pub mod profiler;
pub mod queue;
pub mod registry;
pub mod sampler;
pub mod topology;
pub mod types;
pub mod util;
pub mod vendor;

pub use config::{ProfilingConfig, SamplingMode};
pub use device::Device;
pub use error::{ClockDomain, Error, Result};
pub use host::HostEnergy;
pub use host_queue::{HostEvent, HostKernel, HostQueue};
pub use kernel::{ExecutionStatus, KernelEvent, KernelRecord, SamplerState};
pub use profiler::{Profiler, RunReport};
pub use queue::{ComputeQueue, ProfilingQueue};
pub use registry::{DeviceRegistry, Platform, PlatformInfo};
pub use types::{Frequency, Joules, Microjoules, Microwatts};
pub use vendor::{Backend, VendorAdapter, create_adapter};
