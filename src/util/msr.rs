use msru::{Accessor, Msr};
use std::io;

use crate::cpu_type::CpuType;

/// Reads a value from a Model-Specific Register (MSR)
///
/// # Arguments
///
/// * `msr_address` - The address of the MSR to read
/// * `cpu_id` - The CPU ID to read the MSR from
///
/// # Returns
///
/// The value read from the MSR, or an io::Error if the read fails
pub fn read_msr(msr_address: u32, cpu_id: usize) -> io::Result<u64> {
	Msr::new(msr_address, cpu_id as u16)
		.map_err(io::Error::other)?
		.read()
		.map_err(io::Error::other)
}

/// Reads the RAPL energy status unit (bits 12:8 of the power unit register)
pub fn read_energy_unit(cpu_type: CpuType, cpu_id: usize) -> io::Result<u64> {
	let (unit_msr, _) = package_registers(cpu_type)?;
	Ok((read_msr(unit_msr, cpu_id)? >> 8) & 0x1F)
}

/// Reads the raw 32-bit package energy status counter
pub fn read_package_energy(cpu_type: CpuType, cpu_id: usize) -> io::Result<u64> {
	let (_, energy_msr) = package_registers(cpu_type)?;
	Ok(read_msr(energy_msr, cpu_id)? & crate::constants::MSR_ENERGY_COUNTER_RANGE)
}

fn package_registers(cpu_type: CpuType) -> io::Result<(u32, u32)> {
	cpu_type.rapl_registers().ok_or_else(|| {
		io::Error::new(
			io::ErrorKind::Unsupported,
			"RAPL MSRs are only known for Intel and AMD processors",
		)
	})
}
