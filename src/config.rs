use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Frequency;

pub const ENV_KERNEL_PROFILING: &str = "GPU_POWER_KERNEL_PROFILING";
pub const ENV_DEVICE_PROFILING: &str = "GPU_POWER_DEVICE_PROFILING";
pub const ENV_SAMPLING_MODE: &str = "GPU_POWER_SAMPLING_MODE";
pub const ENV_SAMPLING_INTERVAL_MS: &str = "GPU_POWER_SAMPLING_INTERVAL_MS";
pub const ENV_ENERGY_COUNTER: &str = "GPU_POWER_ENERGY_COUNTER";

/// How kernel samplers relate to each other
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SamplingMode {
	/// One sampler per in-flight kernel, joined at teardown
	#[default]
	Concurrent,
	/// A submission first waits for every earlier kernel's sampler to finish
	Sequential,
}

impl FromStr for SamplingMode {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_lowercase().as_str() {
			"concurrent" => Ok(SamplingMode::Concurrent),
			"sequential" => Ok(SamplingMode::Sequential),
			other => Err(Error::InvalidConfig(format!(
				"unknown sampling mode \"{}\" (expected \"concurrent\" or \"sequential\")",
				other
			))),
		}
	}
}

impl fmt::Display for SamplingMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SamplingMode::Concurrent => f.write_str("concurrent"),
			SamplingMode::Sequential => f.write_str("sequential"),
		}
	}
}

/// Settings of a profiling queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingConfig {
	/// Attach a sampler to every submitted kernel
	pub kernel_profiling: bool,
	/// Run the device-lifetime sampler
	pub device_profiling: bool,
	pub sampling_mode: SamplingMode,
	/// Overrides the backend's polling interval
	pub sampling_interval: Option<Duration>,
	/// Bracket with the hardware energy counter when the device has one
	pub prefer_energy_counter: bool,
	/// Core clock applied before every submission without an explicit target
	pub default_core_frequency: Option<Frequency>,
	/// Memory clock applied before every submission without an explicit target
	pub default_uncore_frequency: Option<Frequency>,
}

impl Default for ProfilingConfig {
	fn default() -> Self {
		Self {
			kernel_profiling: true,
			device_profiling: true,
			sampling_mode: SamplingMode::Concurrent,
			sampling_interval: None,
			prefer_energy_counter: true,
			default_core_frequency: None,
			default_uncore_frequency: None,
		}
	}
}

impl ProfilingConfig {
	pub fn with_kernel_profiling(mut self, enabled: bool) -> Self {
		self.kernel_profiling = enabled;
		self
	}

	pub fn with_device_profiling(mut self, enabled: bool) -> Self {
		self.device_profiling = enabled;
		self
	}

	pub fn with_sampling_mode(mut self, mode: SamplingMode) -> Self {
		self.sampling_mode = mode;
		self
	}

	pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
		self.sampling_interval = Some(interval);
		self
	}

	pub fn with_energy_counter(mut self, prefer: bool) -> Self {
		self.prefer_energy_counter = prefer;
		self
	}

	pub fn with_default_frequencies(mut self, core: Option<Frequency>, uncore: Option<Frequency>) -> Self {
		self.default_core_frequency = core;
		self.default_uncore_frequency = uncore;
		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.sampling_interval == Some(Duration::ZERO) {
			return Err(Error::InvalidConfig("sampling interval must be non-zero".into()));
		}
		Ok(())
	}

	/// Defaults overridden by `GPU_POWER_*` environment variables
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Builds a config from an arbitrary key lookup
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut config = Self::default();
		if let Some(value) = lookup(ENV_KERNEL_PROFILING) {
			config.kernel_profiling = parse_flag(ENV_KERNEL_PROFILING, &value)?;
		}
		if let Some(value) = lookup(ENV_DEVICE_PROFILING) {
			config.device_profiling = parse_flag(ENV_DEVICE_PROFILING, &value)?;
		}
		if let Some(value) = lookup(ENV_SAMPLING_MODE) {
			config.sampling_mode = value.parse()?;
		}
		if let Some(value) = lookup(ENV_SAMPLING_INTERVAL_MS) {
			let millis = value.trim().parse::<u64>().map_err(|e| {
				Error::InvalidConfig(format!("{}=\"{}\": {}", ENV_SAMPLING_INTERVAL_MS, value, e))
			})?;
			config.sampling_interval = Some(Duration::from_millis(millis));
		}
		if let Some(value) = lookup(ENV_ENERGY_COUNTER) {
			config.prefer_energy_counter = parse_flag(ENV_ENERGY_COUNTER, &value)?;
		}
		config.validate()?;
		Ok(config)
	}
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
	match value.trim().to_lowercase().as_str() {
		"1" | "true" | "on" | "yes" => Ok(true),
		"0" | "false" | "off" | "no" => Ok(false),
		_ => Err(Error::InvalidConfig(format!("{}=\"{}\" is not a boolean", key, value))),
	}
}
