use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::constants::MICRO;
use crate::types::{Joules, Microjoules};

/// Point-in-time reading of a cumulative hardware energy counter
///
/// Two snapshots bracketing a kernel give its exact energy; a single
/// snapshot is meaningless on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergySnapshot {
	/// When the counter was read
	pub taken_at: Instant,

	/// Counter value in microjoules
	pub energy: Microjoules,
}

impl EnergySnapshot {
	/// Stamps a counter value with the current instant
	pub fn now(energy: Microjoules) -> Self {
		Self {
			taken_at: Instant::now(),
			energy,
		}
	}

	/// Energy consumed between an earlier snapshot and this one
	///
	/// A counter that went backwards (device reset) contributes nothing.
	pub fn joules_since(&self, earlier: &EnergySnapshot) -> Joules {
		microjoules_to_joules(self.energy.saturating_sub(earlier.energy))
	}
}

pub fn microjoules_to_joules(energy: Microjoules) -> Joules {
	energy as f64 / MICRO as f64
}

/// Running energy total shared between one writer and any number of readers
///
/// Stores the `f64` bit pattern in an `AtomicU64`. Only the owning sampler
/// writes, so `add` is a plain load/store pair rather than a CAS loop.
#[derive(Debug, Default)]
pub struct EnergyCell(AtomicU64);

impl EnergyCell {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self) -> Joules {
		f64::from_bits(self.0.load(Ordering::Acquire))
	}

	pub fn set(&self, joules: Joules) {
		self.0.store(joules.to_bits(), Ordering::Release);
	}

	/// Adds a non-negative delta
	pub fn add(&self, joules: Joules) {
		if joules > 0.0 {
			self.set(self.get() + joules);
		}
	}

	/// Raises the total to `joules` if that is larger, keeping it non-decreasing
	pub fn raise_to(&self, joules: Joules) {
		if joules > self.get() {
			self.set(joules);
		}
	}
}
