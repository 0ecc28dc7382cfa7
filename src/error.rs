use std::io;

use thiserror::Error;

use crate::types::Frequency;
use crate::vendor::Backend;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by adapters, devices, samplers and the submission wrapper
#[derive(Error, Debug)]
pub enum Error {
	/// The vendor driver could not be opened or initialized
	#[error("{backend} backend unavailable: {reason}")]
	BackendUnavailable { backend: Backend, reason: String },

	/// A telemetry or control call returned a non-success code
	#[error("{backend} call \"{call}\" failed with error: {message}")]
	VendorCallFailed {
		backend: Backend,
		call: String,
		message: String,
	},

	/// The capability does not exist on this backend or device
	#[error("{backend} does not support {operation}")]
	UnsupportedOperation {
		backend: Backend,
		operation: &'static str,
	},

	/// The requested clock is not part of the supported set
	#[error("{domain} frequency {requested} MHz is not supported by the device")]
	FrequencyNotSupported {
		domain: ClockDomain,
		requested: Frequency,
	},

	/// Energy was requested for an event never submitted through the queue
	#[error("kernel was not submitted through this queue")]
	KernelNotFound,

	/// No compiled-in adapter matches the requested platform device
	#[error("no supported device for platform \"{platform}\"")]
	NoSupportedDevice { platform: String },

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error(transparent)]
	Io(#[from] io::Error),
}

impl Error {
	pub fn unsupported(backend: Backend, operation: &'static str) -> Self {
		Error::UnsupportedOperation { backend, operation }
	}

	/// Whether the failure is a capability gap rather than a failed call
	pub fn is_unsupported(&self) -> bool {
		matches!(self, Error::UnsupportedOperation { .. })
	}

	/// Whether the failure most likely stems from missing privileges
	pub fn is_permission_issue(&self) -> bool {
		match self {
			Error::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
			Error::VendorCallFailed { message, .. } => {
				let message = message.to_lowercase();
				message.contains("permission") || message.contains("denied")
			},
			_ => false,
		}
	}
}

/// The two independently clocked domains of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockDomain {
	/// Compute-core clock
	Core,
	/// Memory clock
	Uncore,
}

impl std::fmt::Display for ClockDomain {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ClockDomain::Core => f.write_str("core"),
			ClockDomain::Uncore => f.write_str("uncore"),
		}
	}
}
