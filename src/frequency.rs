use std::collections::BTreeMap;

use crate::error::{ClockDomain, Error, Result};
use crate::types::Frequency;

/// Supported clocks of one domain, in ascending order
///
/// Each frequency maps to the position the vendor API reported it at, which is
/// what index-based control calls (ROCm-SMI bitmasks) need. Vendors returning
/// descending lists are normalized here, so callers only ever see ascending
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
	domain: Option<ClockDomain>,
	clocks: BTreeMap<Frequency, usize>,
}

impl FrequencyTable {
	/// Builds a table from frequencies in the vendor's native order
	///
	/// Duplicates keep the first native index they were reported at.
	pub fn from_native<I>(domain: ClockDomain, native: I) -> Self
	where
		I: IntoIterator<Item = Frequency>,
	{
		let mut clocks = BTreeMap::new();
		for (index, frequency) in native.into_iter().enumerate() {
			clocks.entry(frequency).or_insert(index);
		}
		Self {
			domain: Some(domain),
			clocks,
		}
	}

	pub fn domain(&self) -> ClockDomain {
		self.domain.unwrap_or(ClockDomain::Core)
	}

	/// Supported frequencies in non-decreasing order
	pub fn frequencies(&self) -> Vec<Frequency> {
		self.clocks.keys().copied().collect()
	}

	pub fn contains(&self, frequency: Frequency) -> bool {
		self.clocks.contains_key(&frequency)
	}

	/// Vendor-native index of `frequency`, failing loudly if it is absent
	pub fn native_index(&self, frequency: Frequency) -> Result<usize> {
		self.clocks
			.get(&frequency)
			.copied()
			.ok_or(Error::FrequencyNotSupported {
				domain: self.domain(),
				requested: frequency,
			})
	}

	/// Fails with `FrequencyNotSupported` unless `frequency` is in the table
	pub fn validate(&self, frequency: Frequency) -> Result<()> {
		self.native_index(frequency).map(|_| ())
	}

	pub fn min(&self) -> Option<Frequency> {
		self.clocks.keys().next().copied()
	}

	pub fn max(&self) -> Option<Frequency> {
		self.clocks.keys().next_back().copied()
	}

	pub fn len(&self) -> usize {
		self.clocks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.clocks.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn descending_native_order_is_reversed() {
		let table = FrequencyTable::from_native(ClockDomain::Core, [1530, 1380, 1200, 900]);
		assert_eq!(table.frequencies(), vec![900, 1200, 1380, 1530]);
		assert_eq!(table.native_index(1530).unwrap(), 0);
		assert_eq!(table.native_index(900).unwrap(), 3);
		assert_eq!(table.min(), Some(900));
		assert_eq!(table.max(), Some(1530));
	}

	#[test]
	fn unknown_frequency_fails_loudly() {
		let table = FrequencyTable::from_native(ClockDomain::Uncore, [877, 5001]);
		match table.validate(1000) {
			Err(Error::FrequencyNotSupported { domain, requested }) => {
				assert_eq!(domain, ClockDomain::Uncore);
				assert_eq!(requested, 1000);
			},
			other => panic!("expected FrequencyNotSupported, got {:?}", other),
		}
	}

	#[test]
	fn duplicates_keep_first_index() {
		let table = FrequencyTable::from_native(ClockDomain::Core, [500, 700, 500]);
		assert_eq!(table.len(), 2);
		assert_eq!(table.native_index(500).unwrap(), 0);
	}
}
