use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::energy::EnergySnapshot;
use crate::error::{ClockDomain, Result};
use crate::frequency::FrequencyTable;
use crate::power::microwatts_to_watts;
use crate::types::{Frequency, Microjoules};
use crate::vendor::{Backend, DeviceHandle, VendorAdapter};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ClockCache {
	core: Option<Frequency>,
	uncore: Option<Frequency>,
}

/// One physical device bound to its own adapter instance
///
/// Construction initializes the adapter, prepares the device for clock
/// scaling and records the clocks it started with. Dropping the device puts
/// those clocks back if this process changed them, then shuts the adapter
/// down.
#[derive(Debug)]
pub struct Device {
	adapter: Arc<dyn VendorAdapter>,
	handle: DeviceHandle,
	/// Core clocks together with the memory clock they were listed at
	core_table: Mutex<Option<(Option<Frequency>, FrequencyTable)>>,
	uncore_table: OnceLock<FrequencyTable>,
	clocks: Mutex<ClockCache>,
	original: ClockCache,
	changed: AtomicBool,
	energy_counter: bool,
	power_sensor: bool,
}

impl Device {
	/// Binds device `index` of `adapter`
	pub fn new(adapter: Arc<dyn VendorAdapter>, index: u32) -> Result<Self> {
		adapter.initialize()?;
		let handle = match adapter.device_handle(index) {
			Ok(handle) => handle,
			Err(e) => {
				let _ = adapter.shutdown();
				return Err(e);
			},
		};

		if let Err(e) = adapter.setup_scaling(handle) {
			warn!(
				backend = %adapter.backend(),
				device = index,
				"frequency scaling setup failed, clocks may not be controllable: {}",
				e
			);
		}

		let original = ClockCache {
			core: adapter.get_core_frequency(handle).ok(),
			uncore: adapter.get_uncore_frequency(handle).ok(),
		};
		let energy_counter = adapter.energy_usage(handle).is_ok();
		// Only a counter can stand in for a missing sensor
		let power_sensor = !energy_counter || !matches!(adapter.power_usage(handle), Err(e) if e.is_unsupported());

		info!(
			backend = %adapter.backend(),
			device = index,
			core = ?original.core,
			uncore = ?original.uncore,
			energy_counter,
			power_sensor,
			"device ready"
		);

		Ok(Self {
			adapter,
			handle,
			core_table: Mutex::new(None),
			uncore_table: OnceLock::new(),
			clocks: Mutex::new(original),
			original,
			changed: AtomicBool::new(false),
			energy_counter,
			power_sensor,
		})
	}

	pub fn backend(&self) -> Backend {
		self.adapter.backend()
	}

	pub fn index(&self) -> u32 {
		self.handle.index()
	}

	pub fn handle(&self) -> DeviceHandle {
		self.handle
	}

	pub fn adapter(&self) -> &Arc<dyn VendorAdapter> {
		&self.adapter
	}

	fn uncore_table(&self) -> Result<&FrequencyTable> {
		if let Some(table) = self.uncore_table.get() {
			return Ok(table);
		}
		let frequencies = self.adapter.supported_uncore_frequencies(self.handle)?;
		Ok(self
			.uncore_table
			.get_or_init(|| FrequencyTable::from_native(ClockDomain::Uncore, frequencies)))
	}

	/// Core clocks offered at the current memory clock
	///
	/// Some backends (NVML) list different core clocks per memory clock, so the
	/// table is re-read whenever the memory clock moved since it was built.
	fn core_table(&self) -> Result<FrequencyTable> {
		let uncore = self.cache().uncore;
		let mut cached = self.core_table.lock().unwrap_or_else(|e| e.into_inner());
		if let Some((listed_at, table)) = cached.as_ref() {
			if *listed_at == uncore {
				return Ok(table.clone());
			}
		}
		let frequencies = self.adapter.supported_core_frequencies(self.handle)?;
		let table = FrequencyTable::from_native(ClockDomain::Core, frequencies);
		*cached = Some((uncore, table.clone()));
		Ok(table)
	}

	/// Supported core clocks at the current memory clock, ascending
	pub fn supported_core_frequencies(&self) -> Result<Vec<Frequency>> {
		Ok(self.core_table()?.frequencies())
	}

	/// Supported memory clocks, ascending
	pub fn supported_uncore_frequencies(&self) -> Result<Vec<Frequency>> {
		Ok(self.uncore_table()?.frequencies())
	}

	fn cache(&self) -> std::sync::MutexGuard<'_, ClockCache> {
		self.clocks.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Current core clock; `cached` skips the vendor query when a value is known
	pub fn get_core_frequency(&self, cached: bool) -> Result<Frequency> {
		if cached {
			if let Some(core) = self.cache().core {
				return Ok(core);
			}
		}
		let core = self.adapter.get_core_frequency(self.handle)?;
		self.cache().core = Some(core);
		Ok(core)
	}

	/// Current memory clock; `cached` skips the vendor query when a value is known
	pub fn get_uncore_frequency(&self, cached: bool) -> Result<Frequency> {
		if cached {
			if let Some(uncore) = self.cache().uncore {
				return Ok(uncore);
			}
		}
		let uncore = self.adapter.get_uncore_frequency(self.handle)?;
		self.cache().uncore = Some(uncore);
		Ok(uncore)
	}

	pub fn set_core_frequency(&self, target: Frequency) -> Result<()> {
		self.core_table()?.validate(target)?;
		debug!(backend = %self.backend(), device = self.index(), target, "setting core frequency");
		let result = self.adapter.set_core_frequency(self.handle, target);
		self.settle(result)
	}

	pub fn set_uncore_frequency(&self, target: Frequency) -> Result<()> {
		self.uncore_table()?.validate(target)?;
		debug!(backend = %self.backend(), device = self.index(), target, "setting uncore frequency");
		let result = self.adapter.set_uncore_frequency(self.handle, target);
		self.settle(result)
	}

	/// Sets both clocks
	///
	/// When the memory clock moves, the core target is checked by the adapter
	/// against the core clocks offered at the new memory clock.
	pub fn set_all_frequencies(&self, core: Frequency, uncore: Frequency) -> Result<()> {
		self.uncore_table()?.validate(uncore)?;
		if self.cache().uncore == Some(uncore) {
			self.core_table()?.validate(core)?;
		}
		debug!(backend = %self.backend(), device = self.index(), core, uncore, "setting all frequencies");
		let result = self.adapter.set_all_frequencies(self.handle, core, uncore);
		self.settle(result)
	}

	/// Records the outcome of a set call
	///
	/// A failed call may still have moved one domain, so the clocks are re-read
	/// and compared with the originals before deciding whether drop must reset.
	fn settle(&self, result: Result<()>) -> Result<()> {
		let clocks = self.refresh_clocks();
		if result.is_ok() || clocks != self.original {
			self.changed.store(true, Ordering::SeqCst);
		}
		result
	}

	/// Re-reads both clocks; a domain the backend cannot read keeps its old value
	fn refresh_clocks(&self) -> ClockCache {
		let core = self.adapter.get_core_frequency(self.handle).ok();
		let uncore = self.adapter.get_uncore_frequency(self.handle).ok();
		let mut cache = self.cache();
		cache.core = core.or(cache.core);
		cache.uncore = uncore.or(cache.uncore);
		*cache
	}

	/// Whether this process changed any clock on the device
	pub fn frequencies_changed(&self) -> bool {
		self.changed.load(Ordering::SeqCst)
	}

	/// Instantaneous power in watts
	pub fn power_usage(&self) -> Result<f64> {
		Ok(microwatts_to_watts(self.adapter.power_usage(self.handle)?))
	}

	/// Fixed polling interval of the backend
	pub fn power_sampling_rate(&self) -> Duration {
		self.adapter.sampling_interval()
	}

	/// Hardware energy counter in microjoules
	pub fn energy_usage(&self) -> Result<Microjoules> {
		self.adapter.energy_usage(self.handle)
	}

	pub fn energy_snapshot(&self) -> Result<EnergySnapshot> {
		Ok(EnergySnapshot::now(self.energy_usage()?))
	}

	/// Whether the device exposed an energy counter when it was opened
	pub fn has_energy_counter(&self) -> bool {
		self.energy_counter
	}

	/// Whether power can be sampled
	///
	/// Only probed on devices with an energy counter; without one there is
	/// nothing to fall back to and power is assumed readable.
	pub fn has_power_sensor(&self) -> bool {
		self.power_sensor
	}
}

impl Drop for Device {
	fn drop(&mut self) {
		if self.frequencies_changed() {
			info!(backend = %self.backend(), device = self.index(), "restoring original clocks");
			if let Err(e) = self
				.adapter
				.reset_frequencies(self.handle, self.original.core, self.original.uncore)
			{
				warn!(backend = %self.backend(), device = self.index(), "failed to restore clocks: {}", e);
			}
		}
		if let Err(e) = self.adapter.shutdown() {
			warn!(backend = %self.backend(), "shutdown failed: {}", e);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::Error;
	use crate::vendor::scripted::{CallCounters, ScriptedAdapter};

	fn open(adapter: &Arc<ScriptedAdapter>) -> Device {
		Device::new(adapter.clone(), 0).unwrap()
	}

	#[test]
	fn frequencies_are_ascending() {
		let adapter = Arc::new(
			ScriptedAdapter::new()
				.with_core_frequencies(vec![1530, 1410, 1200, 900])
				.with_uncore_frequencies(vec![1215, 877]),
		);
		let device = open(&adapter);
		assert_eq!(device.supported_core_frequencies().unwrap(), vec![900, 1200, 1410, 1530]);
		assert_eq!(device.supported_uncore_frequencies().unwrap(), vec![877, 1215]);
	}

	#[test]
	fn unsupported_target_leaves_cache_untouched() {
		let adapter = Arc::new(ScriptedAdapter::new().with_core_frequencies(vec![1410, 900]));
		let device = open(&adapter);
		assert_eq!(device.get_core_frequency(true).unwrap(), 1410);

		match device.set_core_frequency(1000) {
			Err(Error::FrequencyNotSupported { domain, requested }) => {
				assert_eq!(domain, ClockDomain::Core);
				assert_eq!(requested, 1000);
			},
			other => panic!("expected FrequencyNotSupported, got {:?}", other),
		}
		assert_eq!(device.get_core_frequency(true).unwrap(), 1410);
		assert!(!device.frequencies_changed());
		assert_eq!(CallCounters::get(&adapter.calls.frequency_sets), 0);
	}

	#[test]
	fn setting_one_clock_refreshes_both() {
		let adapter = Arc::new(
			ScriptedAdapter::new()
				.with_core_frequencies(vec![1410, 900])
				.with_uncore_frequencies(vec![1215, 877]),
		);
		let device = open(&adapter);
		device.set_uncore_frequency(877).unwrap();
		assert_eq!(device.get_uncore_frequency(true).unwrap(), 877);
		assert_eq!(device.get_core_frequency(true).unwrap(), 1410);

		device.set_all_frequencies(900, 1215).unwrap();
		assert_eq!(device.get_core_frequency(true).unwrap(), 900);
		assert_eq!(device.get_uncore_frequency(false).unwrap(), 1215);
	}

	#[test]
	fn drop_resets_once_only_after_a_change() {
		let adapter = Arc::new(ScriptedAdapter::new().with_core_frequencies(vec![1410, 900]));
		drop(open(&adapter));
		assert_eq!(CallCounters::get(&adapter.calls.resets), 0);
		assert_eq!(CallCounters::get(&adapter.calls.shutdown), 1);

		let adapter = Arc::new(ScriptedAdapter::new().with_core_frequencies(vec![1410, 900]));
		let device = open(&adapter);
		device.set_core_frequency(900).unwrap();
		device.set_core_frequency(1410).unwrap();
		drop(device);
		assert_eq!(CallCounters::get(&adapter.calls.resets), 1);
		assert_eq!(adapter.get_core_frequency(DeviceHandle::from_index(0)).unwrap(), 1410);
	}

	#[test]
	fn core_table_follows_memory_clock() {
		let adapter = Arc::new(
			ScriptedAdapter::new()
				.with_core_frequencies(vec![1530, 1410])
				.with_uncore_frequencies(vec![5001, 405])
				.with_core_frequencies_at(405, vec![405, 300]),
		);
		let device = open(&adapter);
		assert_eq!(device.supported_core_frequencies().unwrap(), vec![1410, 1530]);

		device.set_all_frequencies(300, 405).unwrap();
		assert_eq!(device.supported_core_frequencies().unwrap(), vec![300, 405]);
		assert_eq!(device.get_core_frequency(true).unwrap(), 300);
		device.set_core_frequency(405).unwrap();

		device.set_uncore_frequency(5001).unwrap();
		assert_eq!(device.supported_core_frequencies().unwrap(), vec![1410, 1530]);
	}

	#[test]
	fn core_only_change_after_memory_change() {
		let adapter = Arc::new(
			ScriptedAdapter::new()
				.with_core_frequencies(vec![1530, 1410])
				.with_uncore_frequencies(vec![5001, 405])
				.with_core_frequencies_at(405, vec![1530, 1410, 300]),
		);
		let device = open(&adapter);
		assert!(device.set_core_frequency(300).is_err());
		device.set_uncore_frequency(405).unwrap();
		device.set_core_frequency(300).unwrap();
		assert_eq!(device.get_core_frequency(false).unwrap(), 300);
	}

	#[test]
	fn rejected_set_call_needs_no_reset() {
		let adapter = Arc::new(ScriptedAdapter::new().with_control_denied(ClockDomain::Core));
		let device = open(&adapter);
		assert!(device.set_core_frequency(900).unwrap_err().is_permission_issue());
		assert!(!device.frequencies_changed());
		drop(device);
		assert_eq!(CallCounters::get(&adapter.calls.resets), 0);
	}

	#[test]
	fn partial_set_all_still_resets() {
		let adapter = Arc::new(ScriptedAdapter::new().with_control_denied(ClockDomain::Core));
		let device = open(&adapter);
		assert!(device.set_all_frequencies(900, 877).is_err());
		assert_eq!(device.get_uncore_frequency(true).unwrap(), 877);
		assert!(device.frequencies_changed());
		drop(device);
		assert_eq!(CallCounters::get(&adapter.calls.resets), 1);
	}

	#[test]
	fn power_probe_only_with_a_counter() {
		let adapter = Arc::new(ScriptedAdapter::new().without_power_sensor());
		assert!(open(&adapter).has_power_sensor());

		let adapter = Arc::new(ScriptedAdapter::new().without_power_sensor().with_energy_counter(100.0));
		let device = open(&adapter);
		assert!(device.has_energy_counter());
		assert!(!device.has_power_sensor());

		let adapter = Arc::new(ScriptedAdapter::new().with_energy_counter(100.0));
		assert!(open(&adapter).has_power_sensor());
	}

	#[test]
	fn denied_setup_degrades_to_warning() {
		let adapter = Arc::new(ScriptedAdapter::new().with_setup_denied());
		let device = open(&adapter);
		assert_eq!(CallCounters::get(&adapter.calls.setup_scaling), 1);
		assert!(device.power_usage().is_ok());
	}

	#[test]
	fn power_in_watts_and_counter_probe() {
		let adapter = Arc::new(ScriptedAdapter::new().with_constant_power(250.0));
		let device = open(&adapter);
		assert!((device.power_usage().unwrap() - 250.0).abs() < 1e-9);
		assert!(!device.has_energy_counter());
		assert_eq!(device.power_sampling_rate(), Duration::from_millis(10));

		let adapter = Arc::new(ScriptedAdapter::new().with_energy_counter(100.0));
		assert!(open(&adapter).has_energy_counter());
	}
}
