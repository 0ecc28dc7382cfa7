pub mod msr;

use std::time::Duration;

use crate::types::{Joules, Microjoules, Microwatts};

/// Difference between two readings of a wrapping hardware counter
///
/// # Arguments
///
/// * `start` - Earlier counter value
/// * `end` - Later counter value
/// * `range` - Largest value the counter can hold before wrapping to zero
///
/// # Returns
///
/// The number of counter units elapsed, assuming at most one wrap
pub const fn counter_delta(start: u64, end: u64, range: u64) -> u64 {
	if end < start {
		end + (range - start)
	} else {
		end - start
	}
}

/// Converts a raw RAPL counter delta to microjoules
///
/// RAPL expresses energy in units of `1 / 2^energy_unit` joules.
pub const fn rapl_units_to_microjoules(units: u64, energy_unit: u64) -> Microjoules {
	((units as u128 * crate::constants::MICRO as u128) >> energy_unit) as u64
}

/// Left Riemann sum of a power trace sampled at a fixed interval
///
/// This is an approximation: its error is bounded by the interval times the
/// largest rate of change of power between two ticks.
pub fn integrate_power(samples: &[Microwatts], interval: Duration) -> Joules {
	let dt = interval.as_secs_f64();
	samples
		.iter()
		.map(|&power| crate::power::microwatts_to_watts(power) * dt)
		.sum()
}
