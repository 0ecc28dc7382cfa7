use std::time::{Duration, Instant};

use crate::constants::MICRO;
use crate::types::{Joules, Microwatts};

/// One instantaneous power reading taken by a sampler tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
	pub taken_at: Instant,

	/// Device power draw in microwatts
	pub power: Microwatts,
}

impl PowerSample {
	pub fn now(power: Microwatts) -> Self {
		Self {
			taken_at: Instant::now(),
			power,
		}
	}

	pub fn watts(&self) -> f64 {
		microwatts_to_watts(self.power)
	}

	/// Rectangle-rule energy of this reading held for `interval`
	pub fn energy_over(&self, interval: Duration) -> Joules {
		self.watts() * interval.as_secs_f64()
	}
}

pub fn microwatts_to_watts(power: Microwatts) -> f64 {
	power as f64 / MICRO as f64
}
