//! Energy samplers.
//!
//! A kernel sampler waits for its kernel to start running, then integrates
//! device power until the kernel completes. The device sampler integrates the
//! same way for the whole lifetime of a profiling queue. Both integrate with
//! the rectangle rule: each tick adds `power * interval`, so the result is an
//! approximation whose error is bounded by the interval times the largest
//! change in power between ticks.
//!
//! When the device exposes a hardware energy counter, both instead bracket
//! their scope with counter snapshots, which is exact. A device without a
//! power sensor always brackets its counter, whatever the preference.
//!
//! Samplers of concurrently running kernels each read the same device power
//! and each attribute all of it to their own kernel. Energy is therefore
//! counted once per concurrent kernel; there is no way to split instantaneous
//! device power among kernels.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::START_POLL_INTERVAL;
use crate::device::Device;
use crate::energy::{EnergyCell, EnergySnapshot};
use crate::error::Result;
use crate::kernel::{ExecutionStatus, KernelEvent, KernelRecord, SamplerState};
use crate::power::PowerSample;

/// How a sampler measures energy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
	/// Rectangle-rule integration of instantaneous power
	PowerIntegration,
	/// Difference of hardware energy counter snapshots
	EnergyCounter,
}

/// Everything a sampler needs from the queue that spawned it
#[derive(Debug, Clone)]
pub struct Sampler {
	device: Arc<Device>,
	interval: Duration,
	method: Method,
}

impl Sampler {
	pub fn new(device: Arc<Device>, interval: Duration, prefer_energy_counter: bool) -> Self {
		let method = if device.has_energy_counter() && (prefer_energy_counter || !device.has_power_sensor()) {
			Method::EnergyCounter
		} else {
			Method::PowerIntegration
		};
		Self {
			device,
			interval,
			method,
		}
	}

	pub fn method(&self) -> Method {
		self.method
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Runs the kernel state machine to completion on the calling thread
	pub fn sample_kernel<E: KernelEvent>(&self, event: &E, record: &KernelRecord) -> Result<()> {
		record.set_state(SamplerState::WaitingForStart);
		let result = self.wait_for_start(event).and_then(|started| {
			if !started {
				debug!(device = self.device.index(), "kernel completed before sampling started");
				return Ok(());
			}
			record.set_state(SamplerState::Sampling);
			match self.method {
				Method::PowerIntegration => self.integrate_until_complete(event, record.energy_cell()),
				Method::EnergyCounter => self.bracket_until_complete(event, record.energy_cell()),
			}
		});
		record.set_state(SamplerState::Complete);
		result
	}

	/// Polls until the kernel runs; `false` means it finished while still waiting
	fn wait_for_start<E: KernelEvent>(&self, event: &E) -> Result<bool> {
		loop {
			match event.status() {
				ExecutionStatus::Submitted => thread::sleep(START_POLL_INTERVAL),
				ExecutionStatus::Running => return Ok(true),
				ExecutionStatus::Complete => return Ok(false),
			}
		}
	}

	fn integrate_until_complete<E: KernelEvent>(&self, event: &E, total: &EnergyCell) -> Result<()> {
		loop {
			let sample = PowerSample::now(self.device.adapter().power_usage(self.device.handle())?);
			total.add(sample.energy_over(self.interval));
			thread::sleep(self.interval);
			if event.status() == ExecutionStatus::Complete {
				return Ok(());
			}
		}
	}

	fn bracket_until_complete<E: KernelEvent>(&self, event: &E, total: &EnergyCell) -> Result<()> {
		let start = self.device.energy_snapshot()?;
		loop {
			thread::sleep(self.interval);
			let complete = event.status() == ExecutionStatus::Complete;
			let now = self.device.energy_snapshot()?;
			total.raise_to(now.joules_since(&start));
			if complete {
				return Ok(());
			}
		}
	}

	/// Accumulates device energy until `finished` is set
	pub fn sample_device(&self, total: &EnergyCell, finished: &AtomicBool) -> Result<()> {
		match self.method {
			Method::PowerIntegration => {
				while !finished.load(Ordering::Acquire) {
					let sample = PowerSample::now(self.device.adapter().power_usage(self.device.handle())?);
					total.add(sample.energy_over(self.interval));
					thread::sleep(self.interval);
				}
			},
			Method::EnergyCounter => {
				let start: EnergySnapshot = self.device.energy_snapshot()?;
				while !finished.load(Ordering::Acquire) {
					thread::sleep(self.interval);
					total.raise_to(self.device.energy_snapshot()?.joules_since(&start));
				}
			},
		}
		Ok(())
	}

	/// Spawns a sampler thread bound to one kernel
	pub fn spawn_kernel<E: KernelEvent>(&self, event: E, record: Arc<KernelRecord>) -> JoinHandle<()> {
		let sampler = self.clone();
		thread::spawn(move || {
			if let Err(e) = sampler.sample_kernel(&event, &record) {
				warn!(
					backend = %sampler.device.backend(),
					device = sampler.device.index(),
					"kernel sampling stopped: {}",
					e
				);
			}
		})
	}

	/// Spawns the device-lifetime sampler thread
	pub fn spawn_device(&self, total: Arc<EnergyCell>, finished: Arc<AtomicBool>) -> JoinHandle<()> {
		let sampler = self.clone();
		thread::spawn(move || {
			debug!(device = sampler.device.index(), method = ?sampler.method, "device sampler started");
			if let Err(e) = sampler.sample_device(&total, &finished) {
				warn!(
					backend = %sampler.device.backend(),
					device = sampler.device.index(),
					"device sampling stopped: {}",
					e
				);
			}
			debug!(device = sampler.device.index(), joules = total.get(), "device sampler stopped");
		})
	}
}
