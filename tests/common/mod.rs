#![allow(dead_code)]

use std::sync::Arc;

use gpu_power::kernel::ScriptedEvent;
use gpu_power::vendor::scripted::ScriptedAdapter;
use gpu_power::{ComputeQueue, Device, Result};
use tracing_subscriber::EnvFilter;

/// Routes library logs to the test harness; `RUST_LOG=gpu_power=debug` shows them
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub fn open(adapter: &Arc<ScriptedAdapter>) -> Arc<Device> {
	Arc::new(Device::new(adapter.clone(), 0).unwrap())
}

/// Queue launching scripted events that run concurrently with each other
pub struct ScriptedQueue {
	pub queued_polls: usize,
	pub running_polls: usize,
}

impl ComputeQueue for ScriptedQueue {
	type Event = ScriptedEvent;
	type Kernel = ();

	fn submit(&self, _kernel: ()) -> Result<ScriptedEvent> {
		Ok(ScriptedEvent::new(self.queued_polls, self.running_polls))
	}
}
