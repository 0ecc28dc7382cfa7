use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ProfilingConfig, SamplingMode};
use crate::constants::START_POLL_INTERVAL;
use crate::device::Device;
use crate::energy::EnergyCell;
use crate::error::{Error, Result};
use crate::kernel::{KernelEvent, KernelRecord};
use crate::sampler::Sampler;
use crate::types::{Frequency, Joules};

/// Host runtime queue that launches kernels asynchronously
pub trait ComputeQueue: Send + Sync {
	type Event: KernelEvent;
	type Kernel;

	fn submit(&self, kernel: Self::Kernel) -> Result<Self::Event>;
}

/// Submission wrapper attributing energy to every kernel it launches
///
/// Each submitted kernel gets its own record and its own sampler thread.
/// A device-lifetime sampler runs from construction until the queue is shut
/// down. Dropping the queue waits for every sampler it started.
pub struct ProfilingQueue<Q: ComputeQueue> {
	inner: Q,
	device: Arc<Device>,
	config: ProfilingConfig,
	sampler: Sampler,
	kernels: Mutex<HashMap<Q::Event, Arc<KernelRecord>>>,
	samplers: Mutex<Vec<JoinHandle<()>>>,
	device_energy: Arc<EnergyCell>,
	finished: Arc<AtomicBool>,
	device_sampler: Mutex<Option<JoinHandle<()>>>,
}

impl<Q: ComputeQueue> std::fmt::Debug for ProfilingQueue<Q> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProfilingQueue")
			.field("device", &self.device)
			.field("config", &self.config)
			.field("device_energy", &self.device_energy.get())
			.finish_non_exhaustive()
	}
}

impl<Q: ComputeQueue> ProfilingQueue<Q> {
	pub fn new(inner: Q, device: Arc<Device>, config: ProfilingConfig) -> Result<Self> {
		config.validate()?;
		let interval = config.sampling_interval.unwrap_or_else(|| device.power_sampling_rate());
		let sampler = Sampler::new(device.clone(), interval, config.prefer_energy_counter);
		let device_energy = Arc::new(EnergyCell::new());
		let finished = Arc::new(AtomicBool::new(false));

		let device_sampler = if config.device_profiling {
			Some(sampler.spawn_device(device_energy.clone(), finished.clone()))
		} else {
			None
		};

		info!(
			backend = %device.backend(),
			device = device.index(),
			method = ?sampler.method(),
			interval_ms = interval.as_millis() as u64,
			mode = %config.sampling_mode,
			"profiling queue ready"
		);

		Ok(Self {
			inner,
			device,
			config,
			sampler,
			kernels: Mutex::new(HashMap::new()),
			samplers: Mutex::new(Vec::new()),
			device_energy,
			finished,
			device_sampler: Mutex::new(device_sampler),
		})
	}

	pub fn device(&self) -> &Arc<Device> {
		&self.device
	}

	pub fn inner(&self) -> &Q {
		&self.inner
	}

	pub fn config(&self) -> &ProfilingConfig {
		&self.config
	}

	pub fn sampling_interval(&self) -> Duration {
		self.sampler.interval()
	}

	/// Submits `kernel` at the queue's default clocks
	pub fn submit(&self, kernel: impl Into<Q::Kernel>) -> Result<Q::Event> {
		self.submit_with_frequencies(
			self.config.default_core_frequency.unwrap_or(0),
			self.config.default_uncore_frequency.unwrap_or(0),
			kernel,
		)
	}

	/// Submits `kernel` after moving the device to the given clocks
	///
	/// A zero frequency leaves that clock alone. A failed clock change is
	/// logged and the kernel still runs. In sequential mode the call first
	/// waits for the samplers of all earlier kernels.
	pub fn submit_with_frequencies(
		&self,
		core: Frequency,
		uncore: Frequency,
		kernel: impl Into<Q::Kernel>,
	) -> Result<Q::Event> {
		if self.config.sampling_mode == SamplingMode::Sequential {
			self.join_kernel_samplers();
		}

		if let Err(e) = self.apply_frequencies(core, uncore) {
			warn!(
				backend = %self.device.backend(),
				device = self.device.index(),
				core,
				uncore,
				"frequency change failed, running kernel unscaled: {}",
				e
			);
		}

		let event = self.inner.submit(kernel.into())?;

		if self.config.kernel_profiling {
			let record = Arc::new(KernelRecord::new(core, uncore));
			self.kernels
				.lock()
				.unwrap_or_else(|e| e.into_inner())
				.insert(event.clone(), record.clone());
			let handle = self.sampler.spawn_kernel(event.clone(), record);
			self.reap_finished_samplers();
			self.samplers.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
		}

		Ok(event)
	}

	fn apply_frequencies(&self, core: Frequency, uncore: Frequency) -> Result<()> {
		match (core, uncore) {
			(0, 0) => Ok(()),
			(core, 0) => self.device.set_core_frequency(core),
			(0, uncore) => self.device.set_uncore_frequency(uncore),
			(core, uncore) => self.device.set_all_frequencies(core, uncore),
		}
	}

	/// Record of a kernel submitted through this queue
	pub fn kernel_record(&self, event: &Q::Event) -> Result<Arc<KernelRecord>> {
		self.kernels
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.get(event)
			.cloned()
			.ok_or(Error::KernelNotFound)
	}

	/// Energy attributed to `event` so far
	pub fn kernel_energy(&self, event: &Q::Event) -> Result<Joules> {
		Ok(self.kernel_record(event)?.energy())
	}

	/// Waits for the kernel and its sampler, then returns its final energy
	pub fn wait_kernel_energy(&self, event: &Q::Event) -> Result<Joules> {
		let record = self.kernel_record(event)?;
		event.wait();
		while !record.is_complete() {
			std::thread::sleep(START_POLL_INTERVAL);
		}
		Ok(record.energy())
	}

	/// Device energy accumulated since the queue was created
	///
	/// Stays at zero when device profiling is disabled.
	pub fn device_energy(&self) -> Joules {
		self.device_energy.get()
	}

	fn join_kernel_samplers(&self) {
		let handles: Vec<JoinHandle<()>> = self.samplers.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect();
		for handle in handles {
			if handle.join().is_err() {
				warn!(device = self.device.index(), "kernel sampler panicked");
			}
		}
	}

	/// Joins sampler threads that already returned
	fn reap_finished_samplers(&self) {
		let finished: Vec<JoinHandle<()>> = {
			let mut samplers = self.samplers.lock().unwrap_or_else(|e| e.into_inner());
			let (finished, running): (Vec<_>, Vec<_>) = samplers.drain(..).partition(|handle| handle.is_finished());
			*samplers = running;
			finished
		};
		for handle in finished {
			if handle.join().is_err() {
				warn!(device = self.device.index(), "kernel sampler panicked");
			}
		}
	}

	/// Waits for every kernel sampler, then forgets all records
	pub fn clear_kernels(&self) {
		self.join_kernel_samplers();
		self.kernels.lock().unwrap_or_else(|e| e.into_inner()).clear();
	}

	/// Stops the device sampler and waits for every sampler thread
	///
	/// Kernel samplers end when their kernels complete, so this blocks until
	/// every submitted kernel has finished.
	pub fn shutdown(&self) {
		self.finished.store(true, Ordering::Release);
		if let Some(handle) = self.device_sampler.lock().unwrap_or_else(|e| e.into_inner()).take() {
			if handle.join().is_err() {
				warn!(device = self.device.index(), "device sampler panicked");
			}
		}
		self.join_kernel_samplers();
		debug!(device = self.device.index(), joules = self.device_energy(), "profiling queue shut down");
	}
}

impl<Q: ComputeQueue> Drop for ProfilingQueue<Q> {
	fn drop(&mut self) {
		self.shutdown();
	}
}
