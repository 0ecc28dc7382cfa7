use std::fmt;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::kernel::KernelEvent;
use crate::queue::{ComputeQueue, ProfilingQueue};
use crate::types::Joules;

/// Timing and energy of one kernel in a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelTiming {
	/// Time from submission until the kernel started running
	pub submission_latency: Duration,
	/// Time from start to end of execution
	pub execution_time: Duration,
	pub energy: Joules,
}

/// Summary of a profiled run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
	pub kernels: Vec<KernelTiming>,
	pub total_submission_latency: Duration,
	pub total_execution_time: Duration,
	pub total_kernel_energy: Joules,
	/// Wall-clock time from `Profiler::start` to the last kernel's completion
	pub real_time: Duration,
	/// Device energy spent during the run
	pub device_energy: Joules,
}

/// Collects per-kernel timings and energies over one run of a queue
#[derive(Debug, Clone, Copy)]
pub struct Profiler {
	started: Instant,
	device_energy_at_start: Joules,
}

impl Profiler {
	pub fn start<Q: ComputeQueue>(queue: &ProfilingQueue<Q>) -> Self {
		Self {
			started: Instant::now(),
			device_energy_at_start: queue.device_energy(),
		}
	}

	/// Waits for every event and builds the report
	///
	/// Events whose runtime reports no timestamps contribute zero durations.
	pub fn finish<Q: ComputeQueue>(&self, queue: &ProfilingQueue<Q>, events: &[Q::Event]) -> Result<RunReport> {
		let mut kernels = Vec::with_capacity(events.len());
		for event in events {
			let energy = queue.wait_kernel_energy(event)?;
			kernels.push(KernelTiming {
				submission_latency: span(event.submitted_at(), event.started_at()),
				execution_time: span(event.started_at(), event.ended_at()),
				energy,
			});
		}
		let real_time = self.started.elapsed();

		Ok(RunReport {
			total_submission_latency: kernels.iter().map(|k| k.submission_latency).sum(),
			total_execution_time: kernels.iter().map(|k| k.execution_time).sum(),
			total_kernel_energy: kernels.iter().map(|k| k.energy).sum(),
			kernels,
			real_time,
			device_energy: (queue.device_energy() - self.device_energy_at_start).max(0.0),
		})
	}
}

fn span(from: Option<Instant>, to: Option<Instant>) -> Duration {
	match (from, to) {
		(Some(from), Some(to)) => to.saturating_duration_since(from),
		_ => Duration::ZERO,
	}
}

impl fmt::Display for RunReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (index, kernel) in self.kernels.iter().enumerate() {
			writeln!(
				f,
				"kernel {:3}: submit {:9.3} ms | exec {:9.3} ms | {:8.3} J",
				index,
				kernel.submission_latency.as_secs_f64() * 1e3,
				kernel.execution_time.as_secs_f64() * 1e3,
				kernel.energy
			)?;
		}
		writeln!(
			f,
			"total     : submit {:9.3} ms | exec {:9.3} ms | {:8.3} J",
			self.total_submission_latency.as_secs_f64() * 1e3,
			self.total_execution_time.as_secs_f64() * 1e3,
			self.total_kernel_energy
		)?;
		write!(
			f,
			"real time : {:9.3} ms | device energy {:8.3} J",
			self.real_time.as_secs_f64() * 1e3,
			self.device_energy
		)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::config::ProfilingConfig;
	use crate::device::Device;
	use crate::host_queue::HostQueue;
	use crate::vendor::scripted::ScriptedAdapter;

	#[test]
	fn missing_timestamps_count_as_zero() {
		let now = Instant::now();
		assert_eq!(span(None, Some(now)), Duration::ZERO);
		assert_eq!(span(Some(now), None), Duration::ZERO);
		assert_eq!(span(Some(now + Duration::from_millis(5)), Some(now)), Duration::ZERO);
	}

	#[test]
	fn report_covers_every_kernel() {
		let adapter = Arc::new(ScriptedAdapter::new().with_constant_power(100.0));
		let device = Arc::new(Device::new(adapter, 0).unwrap());
		let config = ProfilingConfig::default().with_sampling_interval(Duration::from_millis(1));
		let queue = ProfilingQueue::new(HostQueue::new(), device, config).unwrap();

		let profiler = Profiler::start(&queue);
		let events: Vec<_> = (0..3)
			.map(|_| queue.submit(|| std::thread::sleep(Duration::from_millis(5))).unwrap())
			.collect();
		let report = profiler.finish(&queue, &events).unwrap();

		assert_eq!(report.kernels.len(), 3);
		assert!(report.kernels.iter().all(|k| k.execution_time >= Duration::from_millis(5)));
		assert!(report.total_execution_time >= Duration::from_millis(15));
		assert!(report.real_time >= report.total_execution_time);
		assert!(report.total_kernel_energy > 0.0);
		assert!(report.device_energy > 0.0);
		assert_eq!(report.to_string().lines().count(), 5);
	}
}
