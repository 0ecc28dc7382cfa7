//! In-order queue running kernels on a host worker thread.
//!
//! Stands in for a device runtime when none is available: each kernel is a
//! closure, executed one at a time in submission order, and its event moves
//! through `Submitted`, `Running` and `Complete` exactly like a device event.

use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::warn;

use crate::error::{Error, Result};
use crate::kernel::{ExecutionStatus, KernelEvent};
use crate::queue::ComputeQueue;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(0);

/// A unit of work for the host queue
pub struct HostKernel(Box<dyn FnOnce() + Send + 'static>);

impl<F> From<F> for HostKernel
where
	F: FnOnce() + Send + 'static,
{
	fn from(body: F) -> Self {
		HostKernel(Box::new(body))
	}
}

#[derive(Debug)]
struct EventState {
	status: ExecutionStatus,
	started: Option<Instant>,
	ended: Option<Instant>,
}

#[derive(Debug)]
struct EventInner {
	id: u64,
	submitted: Instant,
	state: Mutex<EventState>,
	done: Condvar,
}

/// Completion handle of a host kernel
#[derive(Debug, Clone)]
pub struct HostEvent {
	inner: Arc<EventInner>,
}

impl HostEvent {
	fn new() -> Self {
		Self {
			inner: Arc::new(EventInner {
				id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
				submitted: Instant::now(),
				state: Mutex::new(EventState {
					status: ExecutionStatus::Submitted,
					started: None,
					ended: None,
				}),
				done: Condvar::new(),
			}),
		}
	}

	fn state(&self) -> std::sync::MutexGuard<'_, EventState> {
		self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn mark_running(&self) {
		let mut state = self.state();
		state.status = ExecutionStatus::Running;
		state.started = Some(Instant::now());
	}

	fn mark_complete(&self) {
		let mut state = self.state();
		state.status = ExecutionStatus::Complete;
		state.ended = Some(Instant::now());
		self.inner.done.notify_all();
	}
}

impl PartialEq for HostEvent {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for HostEvent {}

impl Hash for HostEvent {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.inner.id.hash(state);
	}
}

impl KernelEvent for HostEvent {
	fn status(&self) -> ExecutionStatus {
		self.state().status
	}

	fn wait(&self) {
		let mut state = self.state();
		while state.status != ExecutionStatus::Complete {
			state = self.inner.done.wait(state).unwrap_or_else(|e| e.into_inner());
		}
	}

	fn submitted_at(&self) -> Option<Instant> {
		Some(self.inner.submitted)
	}

	fn started_at(&self) -> Option<Instant> {
		self.state().started
	}

	fn ended_at(&self) -> Option<Instant> {
		self.state().ended
	}
}

type Job = (HostKernel, HostEvent);

/// Thread-backed in-order queue
pub struct HostQueue {
	sender: Mutex<Option<Sender<Job>>>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for HostQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HostQueue").finish_non_exhaustive()
	}
}

impl Default for HostQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl HostQueue {
	pub fn new() -> Self {
		let (sender, receiver) = mpsc::channel::<Job>();
		let worker = thread::spawn(move || {
			for (HostKernel(body), event) in receiver {
				event.mark_running();
				if panic::catch_unwind(AssertUnwindSafe(body)).is_err() {
					warn!("host kernel panicked");
				}
				event.mark_complete();
			}
		});
		Self {
			sender: Mutex::new(Some(sender)),
			worker: Mutex::new(Some(worker)),
		}
	}

	/// Blocks until every submitted kernel has run
	pub fn wait_all(&self) {
		let event = self.submit(HostKernel::from(|| {}));
		if let Ok(event) = event {
			event.wait();
		}
	}
}

impl ComputeQueue for HostQueue {
	type Event = HostEvent;
	type Kernel = HostKernel;

	fn submit(&self, kernel: HostKernel) -> Result<HostEvent> {
		let event = HostEvent::new();
		let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
		sender
			.as_ref()
			.ok_or(Error::InvalidConfig("host queue is shut down".into()))?
			.send((kernel, event.clone()))
			.map_err(|_| Error::InvalidConfig("host queue worker has stopped".into()))?;
		Ok(event)
	}
}

impl Drop for HostQueue {
	fn drop(&mut self) {
		self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
		if let Some(worker) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
			let _ = worker.join();
		}
	}
}
