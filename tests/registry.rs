mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::init_tracing;
use gpu_power::vendor::scripted::ScriptedAdapter;
use gpu_power::{
	Backend, DeviceRegistry, Error, HostQueue, PlatformInfo, ProfilingConfig, ProfilingQueue, Result, VendorAdapter,
};

fn scripted(_: Backend) -> Result<Arc<dyn VendorAdapter>> {
	Ok(Arc::new(ScriptedAdapter::new().with_devices(2)))
}

fn platforms() -> Vec<PlatformInfo> {
	vec![
		PlatformInfo::new("NVIDIA CUDA BACKEND", 2),
		PlatformInfo::new("Intel(R) OpenCL HD Graphics", 1),
		PlatformInfo::new("Portable Computing Language", 1),
	]
}

#[test]
fn same_device_for_repeated_lookups() {
	init_tracing();
	let registry = DeviceRegistry::discover_with(&platforms(), scripted);
	assert_eq!(registry.len(), 3);

	for index in 0..2 {
		let a = registry.device_for("NVIDIA CUDA BACKEND", index).unwrap();
		let b = registry.device_for("NVIDIA CUDA BACKEND", index).unwrap();
		assert!(Arc::ptr_eq(&a, &b));
	}
	let first = registry.device_for("NVIDIA CUDA BACKEND", 0).unwrap();
	let second = registry.device_for("NVIDIA CUDA BACKEND", 1).unwrap();
	assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn unsupported_platform_reports_no_device() {
	init_tracing();
	let registry = DeviceRegistry::discover_with(&platforms(), scripted);
	assert!(matches!(
		registry.device_for("Portable Computing Language", 0),
		Err(Error::NoSupportedDevice { .. })
	));
	assert!(matches!(
		registry.device_for("NVIDIA CUDA BACKEND", 7),
		Err(Error::NoSupportedDevice { .. })
	));
}

#[test]
fn queues_on_one_device_share_it() {
	init_tracing();
	let registry = DeviceRegistry::discover_with(&platforms(), scripted);
	let device = registry.device_for("Intel(R) OpenCL HD Graphics", 0).unwrap();
	let config = ProfilingConfig::default()
		.with_device_profiling(false)
		.with_sampling_interval(Duration::from_millis(2));

	let first = ProfilingQueue::new(HostQueue::new(), device.clone(), config.clone()).unwrap();
	let second = ProfilingQueue::new(HostQueue::new(), device.clone(), config).unwrap();
	assert!(Arc::ptr_eq(first.device(), second.device()));

	let a = first.submit(|| thread::sleep(Duration::from_millis(10))).unwrap();
	let b = second.submit(|| thread::sleep(Duration::from_millis(10))).unwrap();
	assert!(first.wait_kernel_energy(&a).unwrap() > 0.0);
	assert!(second.wait_kernel_energy(&b).unwrap() > 0.0);
	assert!(matches!(first.kernel_energy(&b), Err(Error::KernelNotFound)));
}
