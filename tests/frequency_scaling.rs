mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{init_tracing, open};
use gpu_power::vendor::scripted::{CallCounters, ScriptedAdapter};
use gpu_power::{ClockDomain, Error, HostQueue, ProfilingConfig, ProfilingQueue};

#[test]
fn supported_clocks_come_back_ascending() {
	init_tracing();
	let adapter = Arc::new(
		ScriptedAdapter::new()
			.with_core_frequencies(vec![1980, 1530, 1245, 210])
			.with_uncore_frequencies(vec![1593, 810, 405]),
	);
	let device = open(&adapter);
	assert_eq!(device.supported_core_frequencies().unwrap(), vec![210, 1245, 1530, 1980]);
	assert_eq!(device.supported_uncore_frequencies().unwrap(), vec![405, 810, 1593]);
}

#[test]
fn rejected_clock_leaves_cache_untouched() {
	init_tracing();
	let adapter = Arc::new(ScriptedAdapter::new().with_core_frequencies(vec![1410, 900]));
	let device = open(&adapter);
	assert_eq!(device.get_core_frequency(true).unwrap(), 1410);

	match device.set_core_frequency(1000) {
		Err(Error::FrequencyNotSupported { domain, requested }) => {
			assert_eq!(domain, ClockDomain::Core);
			assert_eq!(requested, 1000);
		},
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(device.get_core_frequency(true).unwrap(), 1410);
	assert!(!device.frequencies_changed());
	assert_eq!(CallCounters::get(&adapter.calls.frequency_sets), 0);
}

#[test]
fn per_kernel_clocks_are_restored_once_at_teardown() {
	init_tracing();
	let adapter = Arc::new(
		ScriptedAdapter::new()
			.with_core_frequencies(vec![1410, 1200, 900])
			.with_uncore_frequencies(vec![1215, 877]),
	);
	{
		let config = ProfilingConfig::default().with_device_profiling(false);
		let queue = ProfilingQueue::new(HostQueue::new(), open(&adapter), config).unwrap();

		let slow = queue
			.submit_with_frequencies(900, 877, || thread::sleep(Duration::from_millis(5)))
			.unwrap();
		queue.wait_kernel_energy(&slow).unwrap();
		assert_eq!(queue.device().get_core_frequency(true).unwrap(), 900);
		assert_eq!(queue.device().get_uncore_frequency(true).unwrap(), 877);

		let fast = queue
			.submit_with_frequencies(1200, 0, || thread::sleep(Duration::from_millis(5)))
			.unwrap();
		queue.wait_kernel_energy(&fast).unwrap();
		assert_eq!(queue.device().get_core_frequency(false).unwrap(), 1200);
		assert_eq!(CallCounters::get(&adapter.calls.resets), 0);
	}

	assert_eq!(CallCounters::get(&adapter.calls.resets), 1);
	assert_eq!(CallCounters::get(&adapter.calls.shutdown), 1);
}

#[test]
fn unsupported_kernel_clock_still_runs_the_kernel() {
	init_tracing();
	let adapter = Arc::new(ScriptedAdapter::new().with_core_frequencies(vec![1410, 900]));
	let config = ProfilingConfig::default().with_device_profiling(false);
	let queue = ProfilingQueue::new(HostQueue::new(), open(&adapter), config).unwrap();

	let event = queue
		.submit_with_frequencies(1000, 0, || thread::sleep(Duration::from_millis(5)))
		.unwrap();
	assert!(queue.wait_kernel_energy(&event).unwrap() >= 0.0);
	assert_eq!(queue.device().get_core_frequency(true).unwrap(), 1410);
	assert!(!queue.device().frequencies_changed());
}
