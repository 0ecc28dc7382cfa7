use std::collections::BTreeMap;
use std::path::Path;
use std::{fs, io};

/// Maps each CPU package to the logical processor used to read its registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTopology {
	/// Package ID -> first logical processor found on that package
	pub package_to_cpu: BTreeMap<usize, usize>,
}

impl PackageTopology {
	/// Reads the package layout from sysfs, assuming a single package if sysfs is unreadable
	pub fn detect() -> Self {
		Self::from_sysfs(Path::new("/sys/devices/system/cpu"), num_cpus::get()).unwrap_or_else(|_| Self {
			package_to_cpu: BTreeMap::from([(0, 0)]),
		})
	}

	/// Builds the topology from `cpuN/topology/physical_package_id` entries
	pub fn from_sysfs(cpu_root: &Path, cpu_count: usize) -> io::Result<Self> {
		let mut package_to_cpu = BTreeMap::new();

		for cpu_id in 0..cpu_count {
			let path = cpu_root.join(format!("cpu{}/topology/physical_package_id", cpu_id));
			let Ok(content) = fs::read_to_string(&path) else {
				continue;
			};
			if let Ok(package) = content.trim().parse::<usize>() {
				package_to_cpu.entry(package).or_insert(cpu_id);
			}
		}

		if package_to_cpu.is_empty() {
			return Err(io::Error::new(
				io::ErrorKind::NotFound,
				"Could not read CPU package topology from sysfs",
			));
		}

		Ok(Self { package_to_cpu })
	}

	pub fn package_count(&self) -> usize {
		self.package_to_cpu.len()
	}

	/// Logical processor to read for the package at `index` (in package-ID order)
	pub fn cpu_for_package(&self, index: usize) -> Option<usize> {
		self.package_to_cpu.values().nth(index).copied()
	}
}
