use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::vendor::{Backend, VendorAdapter, create_adapter};

/// A compute platform as enumerated by the host runtime
pub trait Platform {
	/// Vendor or platform string, e.g. "NVIDIA CUDA BACKEND"
	fn name(&self) -> String;

	/// Number of GPU-class devices the platform exposes
	fn gpu_count(&self) -> u32;
}

/// Plain platform description for callers without a runtime object at hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
	pub name: String,
	pub gpus: u32,
}

impl PlatformInfo {
	pub fn new(name: impl Into<String>, gpus: u32) -> Self {
		Self {
			name: name.into(),
			gpus,
		}
	}
}

impl Platform for PlatformInfo {
	fn name(&self) -> String {
		self.name.clone()
	}

	fn gpu_count(&self) -> u32 {
		self.gpus
	}
}

#[derive(Debug)]
struct Entry {
	platform: String,
	local_index: u32,
	device: Arc<Device>,
}

/// Every supported GPU found at discovery time, each bound to its own adapter
#[derive(Debug, Default)]
pub struct DeviceRegistry {
	entries: Vec<Entry>,
}

static GLOBAL: OnceLock<DeviceRegistry> = OnceLock::new();
static GLOBAL_INIT: Mutex<()> = Mutex::new(());

impl DeviceRegistry {
	/// Discovers devices on `platforms` using the compiled-in adapters
	pub fn discover<P: Platform>(platforms: &[P]) -> Self {
		Self::discover_with(platforms, create_adapter)
	}

	/// Discovers devices, building adapters through `factory`
	///
	/// Platforms whose name matches no backend are skipped. A backend that
	/// fails to come up only loses its own devices. Vendor device indices are
	/// counted per backend, so runtimes exposing one platform per GPU still
	/// map onto consecutive vendor indices.
	pub fn discover_with<P, F>(platforms: &[P], factory: F) -> Self
	where
		P: Platform,
		F: Fn(Backend) -> Result<Arc<dyn VendorAdapter>>,
	{
		let mut entries = Vec::new();
		let mut next_vendor_index: HashMap<Backend, u32> = HashMap::new();

		for platform in platforms {
			let name = platform.name();
			let Some(backend) = Backend::from_platform_name(&name) else {
				debug!(platform = %name, "no adapter matches platform");
				continue;
			};

			for local_index in 0..platform.gpu_count() {
				let vendor_index = next_vendor_index.entry(backend).or_insert(0);
				let index = *vendor_index;
				*vendor_index += 1;

				let device = factory(backend).and_then(|adapter| Device::new(adapter, index));
				match device {
					Ok(device) => entries.push(Entry {
						platform: name.clone(),
						local_index,
						device: Arc::new(device),
					}),
					Err(e) => warn!(platform = %name, %backend, device = index, "skipping device: {}", e),
				}
			}
		}

		info!(devices = entries.len(), "device discovery finished");
		Self { entries }
	}

	/// Registry over already-built devices
	pub fn from_devices<I>(devices: I) -> Self
	where
		I: IntoIterator<Item = (String, Device)>,
	{
		let mut local: HashMap<String, u32> = HashMap::new();
		let entries = devices
			.into_iter()
			.map(|(platform, device)| {
				let next = local.entry(platform.to_lowercase()).or_insert(0);
				let local_index = *next;
				*next += 1;
				Entry {
					platform,
					local_index,
					device: Arc::new(device),
				}
			})
			.collect();
		Self { entries }
	}

	/// Device `index` of the named platform
	///
	/// Repeated calls return the same device.
	pub fn device_for(&self, platform: &str, index: u32) -> Result<Arc<Device>> {
		self.entries
			.iter()
			.find(|entry| entry.local_index == index && entry.platform.eq_ignore_ascii_case(platform))
			.map(|entry| entry.device.clone())
			.ok_or_else(|| Error::NoSupportedDevice {
				platform: platform.to_string(),
			})
	}

	pub fn devices(&self) -> impl Iterator<Item = &Arc<Device>> {
		self.entries.iter().map(|entry| &entry.device)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Process-wide registry, if one was installed
	pub fn global() -> Option<&'static DeviceRegistry> {
		GLOBAL.get()
	}

	/// Returns the process-wide registry, building it with `init` on first use
	///
	/// Concurrent first callers are serialized, so `init` runs at most once.
	pub fn global_or_init<F>(init: F) -> &'static DeviceRegistry
	where
		F: FnOnce() -> DeviceRegistry,
	{
		if let Some(registry) = GLOBAL.get() {
			return registry;
		}
		let _guard = GLOBAL_INIT.lock().unwrap_or_else(|e| e.into_inner());
		GLOBAL.get_or_init(init)
	}
}
