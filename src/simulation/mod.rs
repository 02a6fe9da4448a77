//! Run control for the remote epidemic simulation.
//!
//! [`SimulationController`] is the only writer of run state. It talks to a
//! [`SimulationService`] and drives a single polling loop through a [`Timer`]
//! while the service is running on its own.

mod controller;
mod error;
mod http;
mod params;
mod service;
mod timer;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

pub use controller::{GraphSource, ListenerId, SimulationController};
pub use error::{ControllerError, ServiceError};
pub use http::HttpSimulationService;
pub use params::{Knob, ParameterUpdate, SimulationParameters};
pub use service::{RunReport, SimulationService, StepReport};
pub use timer::{BrowserTimer, PollHandle, PollTask, Timer, TimerError};

use crate::graph::StatusCounts;

/// The controller wired to the real service and browser intervals.
pub type AppController = SimulationController<HttpSimulationService, BrowserTimer>;

/// Where a run stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
	/// A baseline is loaded (or nothing is) and day 0 is shown.
	#[default]
	Idle,
	/// Waiting for the service to accept a new run.
	Initializing,
	/// The service advances on its own; the controller polls.
	Running,
	/// Stopped mid-run; resumable.
	Paused,
	/// A single-step request is outstanding.
	Stepping,
	/// The service reported the outbreak over. Left only by a reset.
	Finished,
}

impl Phase {
	/// Lower-case name for logs and the stats panel.
	pub fn label(self) -> &'static str {
		match self {
			Phase::Idle => "idle",
			Phase::Initializing => "initializing",
			Phase::Running => "running",
			Phase::Paused => "paused",
			Phase::Stepping => "stepping",
			Phase::Finished => "finished",
		}
	}

	/// Whether a request to the service is outstanding or the service is advancing.
	pub fn is_active(self) -> bool {
		matches!(self, Phase::Initializing | Phase::Running | Phase::Stepping)
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

/// Read-only view of the run handed to listeners and the UI.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStatus {
	/// Current phase.
	pub phase: Phase,
	/// Day shown.
	pub current_day: u32,
	/// Compartment tallies of the latest snapshot.
	pub counts: StatusCounts,
	/// Whether a network is loaded.
	pub has_graph: bool,
	/// Whether a poll schedule is live.
	pub polling: bool,
}
