use std::cell::RefCell;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use leptos::prelude::{IntervalHandle, set_interval_with_handle};
use leptos::task::spawn_local;
use thiserror::Error;

/// Work run on every poll tick. Produces the request future for that tick.
pub type PollTask = Box<dyn FnMut() -> LocalBoxFuture<'static, ()>>;

/// Scheduling failed.
#[derive(Debug, Error)]
#[error("could not schedule polling: {0}")]
pub struct TimerError(pub String);

/// A live recurring schedule. Consumed by cancellation so it cannot fire again.
pub trait PollHandle {
	/// Stop the schedule.
	fn cancel(self);
}

/// Source of recurring ticks for the polling loop.
pub trait Timer {
	type Handle: PollHandle;

	/// Run `task` every `period` until the handle is cancelled.
	fn every(&self, period: Duration, task: PollTask) -> Result<Self::Handle, TimerError>;
}

/// `setInterval` on the browser window; each tick's future is spawned on the local executor.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserTimer;

/// Live `setInterval` registration.
pub struct BrowserPollHandle(IntervalHandle);

impl PollHandle for BrowserPollHandle {
	fn cancel(self) {
		self.0.clear();
	}
}

impl Timer for BrowserTimer {
	type Handle = BrowserPollHandle;

	fn every(&self, period: Duration, task: PollTask) -> Result<Self::Handle, TimerError> {
		let task = RefCell::new(task);
		set_interval_with_handle(
			move || {
				let tick = (task.borrow_mut())();
				spawn_local(tick);
			},
			period,
		)
		.map(BrowserPollHandle)
		.map_err(|err| TimerError(format!("{err:?}")))
	}
}
