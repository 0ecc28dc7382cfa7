use std::fs;

use crate::constants::{AMD_ENERGY_PKG_MSR, AMD_ENERGY_UNIT_MSR, INTEL_PKG_ENERGY_MSR, INTEL_POWER_UNIT_MSR};

/// Represents CPU manufacturer types that can be detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuType {
	/// Intel CPU architecture
	Intel,
	/// AMD CPU architecture
	Amd,
	/// Any other CPU architecture not explicitly supported
	Unsupported,
}

impl CpuType {
	/// Returns the (energy unit, package energy status) MSR pair
	pub fn rapl_registers(&self) -> Option<(u32, u32)> {
		match self {
			CpuType::Intel => Some((INTEL_POWER_UNIT_MSR, INTEL_PKG_ENERGY_MSR)),
			CpuType::Amd => Some((AMD_ENERGY_UNIT_MSR, AMD_ENERGY_PKG_MSR)),
			CpuType::Unsupported => None,
		}
	}
}

/// Detects the CPU manufacturer by reading /proc/cpuinfo
pub fn detect_cpu_type() -> CpuType {
	let cpuinfo = fs::read_to_string("/proc/cpuinfo").unwrap_or_default();
	cpu_type_from_cpuinfo(&cpuinfo)
}

/// Classifies the contents of a cpuinfo listing
pub fn cpu_type_from_cpuinfo(cpuinfo: &str) -> CpuType {
	if cpuinfo.contains("GenuineIntel") {
		CpuType::Intel
	} else if cpuinfo.contains("AuthenticAMD") {
		CpuType::Amd
	} else {
		CpuType::Unsupported
	}
}
