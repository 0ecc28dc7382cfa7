use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::constants::START_POLL_INTERVAL;
use crate::energy::EnergyCell;
use crate::types::{Frequency, Joules};

/// Execution state reported by the host runtime for a submitted kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
	/// Queued but not yet executing on the device
	Submitted,
	Running,
	Complete,
}

/// Completion handle of one asynchronous kernel launch
///
/// Equality and hashing must follow the identity of the underlying launch,
/// since records are keyed by the handle.
pub trait KernelEvent: Clone + Eq + Hash + Send + Sync + 'static {
	/// Non-blocking status query
	fn status(&self) -> ExecutionStatus;

	/// Blocks until the kernel has completed
	fn wait(&self);

	fn submitted_at(&self) -> Option<Instant> {
		None
	}

	fn started_at(&self) -> Option<Instant> {
		None
	}

	fn ended_at(&self) -> Option<Instant> {
		None
	}
}

/// Phase of the sampler bound to a kernel record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SamplerState {
	WaitingForStart = 0,
	Sampling = 1,
	Complete = 2,
}

impl SamplerState {
	fn from_u8(value: u8) -> Self {
		match value {
			0 => SamplerState::WaitingForStart,
			1 => SamplerState::Sampling,
			_ => SamplerState::Complete,
		}
	}
}

/// Energy attributed to one kernel launch
///
/// Written by exactly one sampler, read by anyone.
#[derive(Debug)]
pub struct KernelRecord {
	energy: EnergyCell,
	state: AtomicU8,
	core_target: Frequency,
	uncore_target: Frequency,
}

impl KernelRecord {
	/// Record with the requested clocks; zero means "no target"
	pub fn new(core_target: Frequency, uncore_target: Frequency) -> Self {
		Self {
			energy: EnergyCell::new(),
			state: AtomicU8::new(SamplerState::WaitingForStart as u8),
			core_target,
			uncore_target,
		}
	}

	pub fn energy(&self) -> Joules {
		self.energy.get()
	}

	pub(crate) fn energy_cell(&self) -> &EnergyCell {
		&self.energy
	}

	pub fn state(&self) -> SamplerState {
		SamplerState::from_u8(self.state.load(Ordering::Acquire))
	}

	pub(crate) fn set_state(&self, state: SamplerState) {
		self.state.store(state as u8, Ordering::Release);
	}

	pub fn is_complete(&self) -> bool {
		self.state() == SamplerState::Complete
	}

	/// A target is set only when both clocks were requested
	pub fn has_target(&self) -> bool {
		self.core_target != 0 && self.uncore_target != 0
	}

	pub fn core_target(&self) -> Frequency {
		self.core_target
	}

	pub fn uncore_target(&self) -> Frequency {
		self.uncore_target
	}
}

static NEXT_SCRIPTED_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Default)]
struct Timestamps {
	started: Option<Instant>,
	ended: Option<Instant>,
}

#[derive(Debug)]
struct ScriptedInner {
	id: u64,
	polls: AtomicUsize,
	queued_polls: usize,
	running_polls: usize,
	submitted: Instant,
	times: Mutex<Timestamps>,
}

/// Event whose status advances with each poll
///
/// The first `queued_polls` status queries report `Submitted`, the next
/// `running_polls` report `Running`, and every later one `Complete`.
#[derive(Debug, Clone)]
pub struct ScriptedEvent {
	inner: Arc<ScriptedInner>,
}

impl ScriptedEvent {
	pub fn new(queued_polls: usize, running_polls: usize) -> Self {
		Self {
			inner: Arc::new(ScriptedInner {
				id: NEXT_SCRIPTED_ID.fetch_add(1, Ordering::Relaxed),
				polls: AtomicUsize::new(0),
				queued_polls,
				running_polls,
				submitted: Instant::now(),
				times: Mutex::new(Timestamps::default()),
			}),
		}
	}

	/// Number of status queries answered so far
	pub fn polls(&self) -> usize {
		self.inner.polls.load(Ordering::SeqCst)
	}
}

impl PartialEq for ScriptedEvent {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for ScriptedEvent {}

impl Hash for ScriptedEvent {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.inner.id.hash(state);
	}
}

impl KernelEvent for ScriptedEvent {
	fn status(&self) -> ExecutionStatus {
		let poll = self.inner.polls.fetch_add(1, Ordering::SeqCst);
		let mut times = self.inner.times.lock().unwrap_or_else(|e| e.into_inner());
		if poll < self.inner.queued_polls {
			ExecutionStatus::Submitted
		} else if poll < self.inner.queued_polls + self.inner.running_polls {
			times.started.get_or_insert_with(Instant::now);
			ExecutionStatus::Running
		} else {
			let now = Instant::now();
			times.started.get_or_insert(now);
			times.ended.get_or_insert(now);
			ExecutionStatus::Complete
		}
	}

	fn wait(&self) {
		while self.status() != ExecutionStatus::Complete {
			thread::sleep(START_POLL_INTERVAL);
		}
	}

	fn submitted_at(&self) -> Option<Instant> {
		Some(self.inner.submitted)
	}

	fn started_at(&self) -> Option<Instant> {
		self.inner.times.lock().unwrap_or_else(|e| e.into_inner()).started
	}

	fn ended_at(&self) -> Option<Instant> {
		self.inner.times.lock().unwrap_or_else(|e| e.into_inner()).ended
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scripted_event_advances_per_poll() {
		let event = ScriptedEvent::new(2, 1);
		assert_eq!(event.status(), ExecutionStatus::Submitted);
		assert_eq!(event.status(), ExecutionStatus::Submitted);
		assert_eq!(event.started_at(), None);
		assert_eq!(event.status(), ExecutionStatus::Running);
		assert!(event.started_at().is_some());
		assert_eq!(event.status(), ExecutionStatus::Complete);
		assert_eq!(event.status(), ExecutionStatus::Complete);
		assert!(event.ended_at().unwrap() >= event.started_at().unwrap());
		assert_eq!(event.polls(), 5);
	}

	#[test]
	fn identity_is_per_launch() {
		let a = ScriptedEvent::new(0, 0);
		let b = ScriptedEvent::new(0, 0);
		assert_eq!(a, a.clone());
		assert_ne!(a, b);
	}

	#[test]
	fn target_needs_both_clocks() {
		assert!(KernelRecord::new(1410, 877).has_target());
		assert!(!KernelRecord::new(1410, 0).has_target());
		assert!(!KernelRecord::new(0, 0).has_target());
	}

	#[test]
	fn record_starts_waiting() {
		let record = KernelRecord::new(0, 0);
		assert_eq!(record.state(), SamplerState::WaitingForStart);
		assert_eq!(record.energy(), 0.0);
		record.set_state(SamplerState::Complete);
		assert!(record.is_complete());
	}
}
