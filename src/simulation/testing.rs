//! In-memory stand-ins for the service and the interval timer.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::{LocalBoxFuture, join_all};

use super::error::ServiceError;
use super::params::SimulationParameters;
use super::service::{RunReport, SimulationService, StepReport};
use super::timer::{PollHandle, PollTask, Timer, TimerError};
use crate::graph::{HealthStatus, Snapshot};

#[derive(Default)]
struct FakeInner {
	network: RefCell<Snapshot>,
	polls: RefCell<VecDeque<Result<RunReport, ServiceError>>>,
	failure: RefCell<Option<ServiceError>>,
	start_gate: RefCell<Option<oneshot::Receiver<()>>>,
	poll_gate: RefCell<Option<oneshot::Receiver<()>>>,
	step_gate: RefCell<Option<oneshot::Receiver<()>>>,
	calls: RefCell<Vec<&'static str>>,
	last_params: Cell<Option<SimulationParameters>>,
}

/// Scripted service. Each step moves S to E and I to R so progress is visible.
#[derive(Clone, Default)]
pub(crate) struct FakeService {
	inner: Rc<FakeInner>,
}

impl FakeService {
	pub fn new(network: Snapshot) -> Self {
		let service = Self::default();
		*service.inner.network.borrow_mut() = network;
		service
	}

	/// Queue a response for the next poll. Unscripted polls report "still running".
	pub fn script_poll(&self, response: Result<RunReport, ServiceError>) {
		self.inner.polls.borrow_mut().push_back(response);
	}

	/// Fail the next call of any kind.
	pub fn fail_next(&self, err: ServiceError) {
		*self.inner.failure.borrow_mut() = Some(err);
	}

	/// Hold the next start response until the sender fires.
	pub fn hold_next_start(&self, gate: oneshot::Receiver<()>) {
		*self.inner.start_gate.borrow_mut() = Some(gate);
	}

	/// Hold the next poll response until the sender fires.
	pub fn hold_next_poll(&self, gate: oneshot::Receiver<()>) {
		*self.inner.poll_gate.borrow_mut() = Some(gate);
	}

	/// Hold the next step response until the sender fires.
	pub fn hold_next_step(&self, gate: oneshot::Receiver<()>) {
		*self.inner.step_gate.borrow_mut() = Some(gate);
	}

	pub fn calls(&self) -> Vec<&'static str> {
		self.inner.calls.borrow().clone()
	}

	pub fn count(&self, call: &str) -> usize {
		self.inner.calls.borrow().iter().filter(|c| **c == call).count()
	}

	pub fn last_params(&self) -> Option<SimulationParameters> {
		self.inner.last_params.get()
	}

	async fn wait(gate: &RefCell<Option<oneshot::Receiver<()>>>) {
		let gate = gate.borrow_mut().take();
		if let Some(gate) = gate {
			let _ = gate.await;
		}
	}

	fn record(&self, call: &'static str) -> Result<(), ServiceError> {
		self.inner.calls.borrow_mut().push(call);
		match self.inner.failure.borrow_mut().take() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

fn advance(from: &Snapshot) -> Snapshot {
	let mut next = from.clone();
	for node in &mut next.nodes {
		match node.status {
			HealthStatus::Susceptible => {
				node.status = HealthStatus::Exposed;
				node.days_infected = Some(1);
			}
			HealthStatus::Infected => {
				node.status = HealthStatus::Recovered;
				node.days_infected = None;
			}
			_ => {}
		}
	}
	next.people_state = None;
	next
}

#[async_trait(?Send)]
impl SimulationService for FakeService {
	async fn fetch_default_network(&self) -> Result<Snapshot, ServiceError> {
		self.record("default")?;
		Ok(self.inner.network.borrow().clone())
	}

	async fn fetch_random_network(&self) -> Result<Snapshot, ServiceError> {
		self.record("random")?;
		Ok(self.inner.network.borrow().clone())
	}

	async fn upload_network(&self, graph: &Snapshot) -> Result<Snapshot, ServiceError> {
		self.record("upload")?;
		if graph.nodes.is_empty() {
			return Err(ServiceError::Rejected("graph has no nodes".into()));
		}
		Ok(graph.clone())
	}

	async fn init(
		&self,
		baseline: &Snapshot,
		params: &SimulationParameters,
	) -> Result<RunReport, ServiceError> {
		self.record("init")?;
		self.inner.last_params.set(Some(*params));
		Ok(RunReport {
			snapshot: Some(baseline.clone()),
			current_day: Some(0),
			running: false,
			is_finished: false,
		})
	}

	async fn start(
		&self,
		_from: &Snapshot,
		current_day: u32,
		params: &SimulationParameters,
	) -> Result<RunReport, ServiceError> {
		Self::wait(&self.inner.start_gate).await;
		self.record("start")?;
		self.inner.last_params.set(Some(*params));
		Ok(RunReport {
			snapshot: None,
			current_day: Some(current_day),
			running: true,
			is_finished: false,
		})
	}

	async fn poll(&self) -> Result<RunReport, ServiceError> {
		Self::wait(&self.inner.poll_gate).await;
		self.record("poll")?;
		self.inner.polls.borrow_mut().pop_front().unwrap_or(Ok(RunReport {
			running: true,
			..RunReport::default()
		}))
	}

	async fn step(
		&self,
		from: &Snapshot,
		current_day: u32,
		params: &SimulationParameters,
	) -> Result<StepReport, ServiceError> {
		Self::wait(&self.inner.step_gate).await;
		self.record("step")?;
		self.inner.last_params.set(Some(*params));
		Ok(StepReport {
			snapshot: advance(from),
			current_day: Some(current_day + 1),
			is_finished: false,
		})
	}

	async fn pause(&self) -> Result<(), ServiceError> {
		self.record("pause")
	}
}

#[derive(Default)]
struct TimerInner {
	tasks: Vec<(u64, PollTask)>,
	next_id: u64,
	max_live: usize,
}

/// Timer that only ticks when told to, and remembers how many schedules overlapped.
#[derive(Clone, Default)]
pub(crate) struct ManualTimer {
	inner: Rc<RefCell<TimerInner>>,
}

pub(crate) struct ManualHandle {
	id: u64,
	inner: Rc<RefCell<TimerInner>>,
}

impl PollHandle for ManualHandle {
	fn cancel(self) {
		self.inner.borrow_mut().tasks.retain(|(id, _)| *id != self.id);
	}
}

impl Timer for ManualTimer {
	type Handle = ManualHandle;

	fn every(&self, _period: Duration, task: PollTask) -> Result<ManualHandle, TimerError> {
		let mut inner = self.inner.borrow_mut();
		let id = inner.next_id;
		inner.next_id += 1;
		inner.tasks.push((id, task));
		inner.max_live = inner.max_live.max(inner.tasks.len());
		Ok(ManualHandle {
			id,
			inner: self.inner.clone(),
		})
	}
}

impl ManualTimer {
	pub fn live(&self) -> usize {
		self.inner.borrow().tasks.len()
	}

	pub fn max_live(&self) -> usize {
		self.inner.borrow().max_live
	}

	/// One tick of every live schedule, not yet driven.
	pub fn ticks(&self) -> Vec<LocalBoxFuture<'static, ()>> {
		self.inner
			.borrow_mut()
			.tasks
			.iter_mut()
			.map(|(_, task)| task())
			.collect()
	}

	/// Run one tick of every live schedule to completion.
	pub fn fire(&self) {
		block_on(join_all(self.ticks()));
	}
}
