use std::time::Duration;

// Fixed polling intervals per backend
pub const NVML_SAMPLING_INTERVAL: Duration = Duration::from_millis(15);
pub const RSMI_SAMPLING_INTERVAL: Duration = Duration::from_millis(15);
pub const LEVEL_ZERO_SAMPLING_INTERVAL: Duration = Duration::from_millis(5);
pub const GEOPM_SAMPLING_INTERVAL: Duration = Duration::from_millis(5);
pub const RAPL_SAMPLING_INTERVAL: Duration = Duration::from_millis(5);

// Poll period while waiting for a submitted kernel to start running
pub const START_POLL_INTERVAL: Duration = Duration::from_micros(50);

// Unit scales
pub const MICRO: u64 = 1_000_000;
pub const MILLI_TO_MICRO: u64 = 1_000;
pub const HZ_PER_MHZ: u64 = 1_000_000;

// Upper bounds on clock lists returned by vendor enumeration calls
pub const NVML_MAX_CLOCKS: usize = 128;
pub const RSMI_MAX_NUM_FREQUENCIES: usize = 32;

// Host powercap tree exposing RAPL package counters
pub const POWERCAP_ROOT: &str = "/sys/class/powercap";
pub const RAPL_ZONE_PREFIX: &str = "intel-rapl:";

// AMD RAPL MSR addresses
pub const AMD_ENERGY_UNIT_MSR: u32 = 0xC001_0299;
pub const AMD_ENERGY_PKG_MSR: u32 = 0xC001_029B;

// Intel RAPL MSR addresses
pub const INTEL_POWER_UNIT_MSR: u32 = 0x606;
pub const INTEL_PKG_ENERGY_MSR: u32 = 0x611;

// RAPL energy status registers are 32 bits wide
pub const MSR_ENERGY_COUNTER_RANGE: u64 = 0xFFFF_FFFF;
