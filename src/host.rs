//! Host (CPU package) energy counters.
//!
//! Counters come from the powercap sysfs tree when it is readable and fall
//! back to the RAPL MSRs otherwise. Both wrap, so every package keeps an
//! accumulated, monotonic microjoule total.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::constants::{MSR_ENERGY_COUNTER_RANGE, POWERCAP_ROOT, RAPL_ZONE_PREFIX};
use crate::cpu_type::{CpuType, detect_cpu_type};
use crate::error::{Error, Result};
use crate::topology::PackageTopology;
use crate::types::{Joules, Microjoules};
use crate::util::msr::{read_energy_unit, read_package_energy};
use crate::util::{counter_delta, rapl_units_to_microjoules};
use crate::vendor::Backend;

/// Where a package counter is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnergySource {
	/// `intel-rapl:N/energy_uj`, already in microjoules
	Powercap { energy_path: PathBuf, max_range: u64 },
	/// Raw package energy status register scaled by the energy unit
	Msr {
		cpu_type: CpuType,
		cpu: usize,
		energy_unit: u64,
	},
}

impl EnergySource {
	fn read_raw(&self) -> io::Result<u64> {
		match self {
			EnergySource::Powercap { energy_path, .. } => parse_counter(&fs::read_to_string(energy_path)?),
			EnergySource::Msr { cpu_type, cpu, .. } => read_package_energy(*cpu_type, *cpu),
		}
	}

	fn range(&self) -> u64 {
		match self {
			EnergySource::Powercap { max_range, .. } => *max_range,
			EnergySource::Msr { .. } => MSR_ENERGY_COUNTER_RANGE,
		}
	}

	fn to_microjoules(&self, units: u64) -> Microjoules {
		match self {
			EnergySource::Powercap { .. } => units,
			EnergySource::Msr { energy_unit, .. } => rapl_units_to_microjoules(units, *energy_unit),
		}
	}
}

#[derive(Debug)]
struct PackageCounter {
	source: EnergySource,
	last_raw: u64,
	total: Microjoules,
}

impl PackageCounter {
	fn open(source: EnergySource) -> io::Result<Self> {
		let last_raw = source.read_raw()?;
		Ok(Self {
			source,
			last_raw,
			total: 0,
		})
	}

	/// Accumulated energy since the counter was opened, unwrapping the raw register
	fn read(&mut self) -> io::Result<Microjoules> {
		let raw = self.source.read_raw()?;
		let delta = counter_delta(self.last_raw, raw, self.source.range());
		self.last_raw = raw;
		self.total += self.source.to_microjoules(delta);
		Ok(self.total)
	}
}

fn parse_counter(text: &str) -> io::Result<u64> {
	text.trim()
		.parse::<u64>()
		.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Whether the process runs with an effective UID of root
pub fn is_privileged() -> bool {
	// SAFETY: geteuid has no preconditions and cannot fail.
	unsafe { libc::geteuid() == 0 }
}

/// Lists the top-level `intel-rapl:N` package zones under a powercap root
pub fn powercap_sources(root: &Path) -> io::Result<Vec<EnergySource>> {
	let mut zones: Vec<(u32, PathBuf)> = fs::read_dir(root)?
		.filter_map(|entry| entry.ok())
		.filter_map(|entry| {
			let name = entry.file_name().to_string_lossy().into_owned();
			// Subzones are named intel-rapl:N:M
			let index = name.strip_prefix(RAPL_ZONE_PREFIX)?.parse::<u32>().ok()?;
			Some((index, entry.path()))
		})
		.collect();
	zones.sort_by_key(|(index, _)| *index);

	zones
		.into_iter()
		.map(|(_, zone)| {
			let max_range = fs::read_to_string(zone.join("max_energy_range_uj"))
				.and_then(|text| parse_counter(&text))
				.unwrap_or(u64::MAX);
			Ok(EnergySource::Powercap {
				energy_path: zone.join("energy_uj"),
				max_range,
			})
		})
		.collect()
}

/// One MSR source per package, read through the package's first logical CPU
pub fn msr_sources(cpu_type: CpuType, topology: &PackageTopology) -> io::Result<Vec<EnergySource>> {
	(0..topology.package_count())
		.filter_map(|index| topology.cpu_for_package(index))
		.map(|cpu| {
			Ok(EnergySource::Msr {
				cpu_type,
				cpu,
				energy_unit: read_energy_unit(cpu_type, cpu)?,
			})
		})
		.collect()
}

/// Wrap-corrected energy counters for every CPU package of the host
#[derive(Debug)]
pub struct HostEnergy {
	packages: Mutex<Vec<PackageCounter>>,
}

impl HostEnergy {
	/// Opens the host's package counters, preferring powercap over raw MSRs
	///
	/// Fails with `UnsupportedOperation` when neither source is readable, which
	/// on most systems means the process lacks privileges.
	pub fn probe() -> Result<Self> {
		let cpu_type = detect_cpu_type();
		Self::probe_at(Path::new(POWERCAP_ROOT), cpu_type, &PackageTopology::detect())
	}

	pub fn probe_at(powercap_root: &Path, cpu_type: CpuType, topology: &PackageTopology) -> Result<Self> {
		match powercap_sources(powercap_root).and_then(Self::open_all) {
			Ok(host) if host.package_count() > 0 => {
				info!(packages = host.package_count(), "reading host energy from powercap");
				return Ok(host);
			},
			Ok(_) => debug!(root = %powercap_root.display(), "no RAPL zones under powercap root"),
			Err(e) => debug!(root = %powercap_root.display(), "powercap unreadable: {}", e),
		}

		if cpu_type == CpuType::Unsupported {
			return Err(Error::unsupported(Backend::Rapl, "host energy on this processor"));
		}

		match msr_sources(cpu_type, topology).and_then(Self::open_all) {
			Ok(host) if host.package_count() > 0 => {
				info!(packages = host.package_count(), ?cpu_type, "reading host energy from RAPL MSRs");
				Ok(host)
			},
			Ok(_) => Err(Error::unsupported(Backend::Rapl, "host energy without CPU packages")),
			Err(e) => {
				if !is_privileged() {
					warn!("host energy needs root or read access to powercap/MSR devices: {}", e);
				}
				Err(Error::unsupported(Backend::Rapl, "host energy without privileges"))
			},
		}
	}

	/// Opens counters over explicit sources
	pub fn from_sources(sources: Vec<EnergySource>) -> Result<Self> {
		Ok(Self::open_all(sources)?)
	}

	fn open_all(sources: Vec<EnergySource>) -> io::Result<Self> {
		let packages = sources
			.into_iter()
			.map(PackageCounter::open)
			.collect::<io::Result<Vec<_>>>()?;
		Ok(Self {
			packages: Mutex::new(packages),
		})
	}

	pub fn package_count(&self) -> usize {
		self.packages.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	/// Accumulated energy of one package since the counters were opened
	pub fn package_energy(&self, index: usize) -> Result<Microjoules> {
		let mut packages = self.packages.lock().unwrap_or_else(|e| e.into_inner());
		let counter = packages.get_mut(index).ok_or_else(|| Error::VendorCallFailed {
			backend: Backend::Rapl,
			call: "package_energy".into(),
			message: format!("package index {} out of range", index),
		})?;
		Ok(counter.read()?)
	}

	/// Accumulated energy of all packages
	pub fn total_energy(&self) -> Result<Microjoules> {
		let mut packages = self.packages.lock().unwrap_or_else(|e| e.into_inner());
		let mut total = 0;
		for counter in packages.iter_mut() {
			total += counter.read()?;
		}
		Ok(total)
	}

	pub fn total_joules(&self) -> Result<Joules> {
		Ok(crate::energy::microjoules_to_joules(self.total_energy()?))
	}
}
