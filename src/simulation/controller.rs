use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::FutureExt;
use log::{debug, info, warn};

use super::error::ControllerError;
use super::params::{Knob, ParameterUpdate, SimulationParameters};
use super::service::{RunReport, SimulationService};
use super::timer::{PollHandle, PollTask, Timer, TimerError};
use super::{Phase, RunStatus};
use crate::graph::{SharedGraph, Snapshot};

/// Where [`SimulationController::load_graph`] gets its network from.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphSource {
	/// The service's built-in network.
	Default,
	/// A freshly generated network.
	Random,
	/// Raw exchange-format JSON picked by the user. Checked locally before upload.
	Upload(String),
}

/// Handle returned by [`SimulationController::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&RunStatus)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Busy {
	Command,
	Poll,
}

struct RunState {
	phase: Phase,
	current_day: u32,
	parameters: SimulationParameters,
	baseline: Option<Snapshot>,
	last_snapshot: Option<Snapshot>,
	/// Bumped by every transition that abandons the current activity. Responses
	/// carrying an older epoch are dropped.
	epoch: u64,
	command: Option<&'static str>,
	poll_in_flight: bool,
}

impl RunState {
	fn release(&mut self, busy: Busy) {
		match busy {
			Busy::Command => self.command = None,
			Busy::Poll => self.poll_in_flight = false,
		}
	}
}

struct BusyGuard<'a> {
	state: &'a RefCell<RunState>,
	busy: Busy,
}

impl<'a> BusyGuard<'a> {
	fn new(state: &'a RefCell<RunState>, busy: Busy) -> Self {
		Self { state, busy }
	}
}

impl Drop for BusyGuard<'_> {
	fn drop(&mut self) {
		self.state.borrow_mut().release(self.busy);
	}
}

struct Shared<S, T: Timer> {
	service: S,
	timer: T,
	graph: SharedGraph,
	poll_interval: Duration,
	state: RefCell<RunState>,
	poll: RefCell<Option<T::Handle>>,
	listeners: RefCell<Vec<(ListenerId, Listener)>>,
	next_listener: Cell<u64>,
}

impl<S, T: Timer> Drop for Shared<S, T> {
	fn drop(&mut self) {
		if let Some(handle) = self.poll.get_mut().take() {
			handle.cancel();
		}
	}
}

/// State machine driving a remote simulation run.
///
/// Cheap to clone; clones share one run. All state lives behind `RefCell`s that
/// are never held across an `.await`, so UI callbacks may call in at any time.
pub struct SimulationController<S, T: Timer> {
	shared: Rc<Shared<S, T>>,
}

impl<S, T: Timer> Clone for SimulationController<S, T> {
	fn clone(&self) -> Self {
		Self {
			shared: self.shared.clone(),
		}
	}
}

impl<S, T> Shared<S, T>
where
	S: SimulationService + 'static,
	T: Timer + 'static,
{
	fn is_stale(&self, epoch: u64) -> bool {
		self.state.borrow().epoch != epoch
	}

	fn cancel_polling(&self) -> bool {
		let handle = self.poll.borrow_mut().take();
		match handle {
			Some(handle) => {
				handle.cancel();
				debug!("polling cancelled");
				true
			}
			None => false,
		}
	}

	fn begin_polling(this: &Rc<Self>, epoch: u64) -> Result<(), TimerError> {
		this.cancel_polling();
		let weak: Weak<Self> = Rc::downgrade(this);
		let task: PollTask = Box::new(move || {
			let weak = weak.clone();
			async move {
				if let Some(shared) = weak.upgrade() {
					shared.poll_once(epoch).await;
				}
			}
			.boxed_local()
		});
		let handle = this.timer.every(this.poll_interval, task)?;
		*this.poll.borrow_mut() = Some(handle);
		debug!("polling every {:?}", this.poll_interval);
		Ok(())
	}

	async fn poll_once(&self, epoch: u64) {
		{
			let mut st = self.state.borrow_mut();
			if st.epoch != epoch || st.phase != Phase::Running {
				return;
			}
			if st.poll_in_flight || st.command.is_some() {
				debug!("poll tick skipped; a request is outstanding");
				return;
			}
			st.poll_in_flight = true;
		}
		let _busy = BusyGuard::new(&self.state, Busy::Poll);

		let result = self.service.poll().await;
		if self.is_stale(epoch) {
			debug!("discarding poll response from an abandoned run");
			return;
		}
		match result {
			Ok(report) => self.apply_poll(report),
			Err(err) => {
				self.recover(Phase::Running, "poll", err.into());
			}
		}
	}

	fn apply_poll(&self, report: RunReport) {
		let stop = {
			let mut st = self.state.borrow_mut();
			if let Some(day) = report.current_day {
				if day < st.current_day {
					debug!("ignoring poll for day {day}; already at day {}", st.current_day);
					return;
				}
				st.current_day = day;
			}
			if let Some(snapshot) = report.snapshot {
				self.adopt(&mut st, snapshot);
			}
			if report.is_finished {
				st.phase = Phase::Finished;
				info!("run finished on day {}", st.current_day);
				true
			} else if !report.running {
				st.phase = Phase::Paused;
				info!("service stopped the run on day {}", st.current_day);
				true
			} else {
				false
			}
		};
		if stop {
			self.cancel_polling();
		}
		self.notify();
	}

	/// Merge a service snapshot into the run and the live graph.
	fn adopt(&self, st: &mut RunState, mut snapshot: Snapshot) {
		snapshot.normalize();
		if let Some(baseline) = &st.baseline {
			snapshot.inherit_initial_statuses(baseline);
		}
		if let Some(previous) = &st.last_snapshot {
			snapshot.inherit_initial_statuses(previous);
		}
		snapshot.capture_initial_statuses();
		self.graph.borrow_mut().apply_incoming(&snapshot);
		st.last_snapshot = Some(snapshot);
	}

	/// Put the run back in a settled phase after a failed request.
	fn recover(&self, prior: Phase, operation: &str, err: ControllerError) -> ControllerError {
		self.cancel_polling();
		let phase = {
			let mut st = self.state.borrow_mut();
			st.epoch += 1;
			st.phase = match prior {
				Phase::Idle | Phase::Finished => prior,
				_ => Phase::Paused,
			};
			st.phase
		};
		warn!("{operation} failed: {err}; now {phase}");
		self.notify();
		err
	}

	fn status(&self) -> RunStatus {
		let st = self.state.borrow();
		RunStatus {
			phase: st.phase,
			current_day: st.current_day,
			counts: st
				.last_snapshot
				.as_ref()
				.map(Snapshot::counts)
				.unwrap_or_default(),
			has_graph: st.last_snapshot.is_some(),
			polling: self.poll.borrow().is_some(),
		}
	}

	fn notify(&self) {
		let status = self.status();
		let listeners: Vec<Listener> = self
			.listeners
			.borrow()
			.iter()
			.map(|(_, listener)| listener.clone())
			.collect();
		for listener in listeners {
			listener(&status);
		}
	}
}

impl<S, T> SimulationController<S, T>
where
	S: SimulationService + 'static,
	T: Timer + 'static,
{
	/// Controller with no network loaded.
	pub fn new(
		service: S,
		timer: T,
		graph: SharedGraph,
		poll_interval: Duration,
		parameters: SimulationParameters,
	) -> Self {
		Self {
			shared: Rc::new(Shared {
				service,
				timer,
				graph,
				poll_interval,
				state: RefCell::new(RunState {
					phase: Phase::Idle,
					current_day: 0,
					parameters: parameters.sanitized(),
					baseline: None,
					last_snapshot: None,
					epoch: 0,
					command: None,
					poll_in_flight: false,
				}),
				poll: RefCell::new(None),
				listeners: RefCell::new(Vec::new()),
				next_listener: Cell::new(0),
			}),
		}
	}

	/// Live graph the controller merges into.
	pub fn graph(&self) -> SharedGraph {
		self.shared.graph.clone()
	}

	/// Current phase.
	pub fn phase(&self) -> Phase {
		self.shared.state.borrow().phase
	}

	/// Day shown.
	pub fn current_day(&self) -> u32 {
		self.shared.state.borrow().current_day
	}

	/// Parameters sent with the next command.
	pub fn parameters(&self) -> SimulationParameters {
		self.shared.state.borrow().parameters
	}

	/// Latest snapshot adopted.
	pub fn last_snapshot(&self) -> Option<Snapshot> {
		self.shared.state.borrow().last_snapshot.clone()
	}

	/// Whether a poll schedule is live.
	pub fn is_polling(&self) -> bool {
		self.shared.poll.borrow().is_some()
	}

	/// Snapshot of the run for the UI.
	pub fn status(&self) -> RunStatus {
		self.shared.status()
	}

	/// Called after every transition with the resulting status.
	pub fn subscribe(&self, listener: impl Fn(&RunStatus) + 'static) -> ListenerId {
		let id = ListenerId(self.shared.next_listener.get());
		self.shared.next_listener.set(id.0 + 1);
		self.shared
			.listeners
			.borrow_mut()
			.push((id, Rc::new(listener)));
		id
	}

	/// Drop a listener. Returns whether it was registered.
	pub fn unsubscribe(&self, id: ListenerId) -> bool {
		let mut listeners = self.shared.listeners.borrow_mut();
		let before = listeners.len();
		listeners.retain(|(listener, _)| *listener != id);
		listeners.len() != before
	}

	/// Fetch or upload a network and make it the new baseline.
	///
	/// Uploads are validated locally first; a malformed payload fails with
	/// [`ControllerError::InvalidGraphFormat`] and leaves everything untouched.
	pub async fn load_graph(&self, source: GraphSource) -> Result<(), ControllerError> {
		let shared = &self.shared;
		let fetched = match source {
			GraphSource::Default => shared
				.service
				.fetch_default_network()
				.await
				.map_err(ControllerError::from),
			GraphSource::Random => shared
				.service
				.fetch_random_network()
				.await
				.map_err(ControllerError::from),
			GraphSource::Upload(raw) => {
				let graph = Snapshot::from_json(&raw).inspect_err(|err| warn!("upload refused: {err}"))?;
				shared
					.service
					.upload_network(&graph)
					.await
					.map_err(ControllerError::from_upload)
			}
		};
		match fetched {
			Ok(snapshot) => {
				self.load_snapshot(snapshot);
				Ok(())
			}
			Err(err @ ControllerError::InvalidGraphFormat(_)) => {
				warn!("service refused the graph: {err}");
				Err(err)
			}
			Err(err) => Err(shared.recover(self.phase(), "load graph", err)),
		}
	}

	/// Install `snapshot` as the baseline: statuses replayed from their initial
	/// values, day 0, phase idle.
	pub fn load_snapshot(&self, mut snapshot: Snapshot) {
		let shared = &self.shared;
		shared.cancel_polling();
		snapshot.normalize();
		snapshot.capture_initial_statuses();
		snapshot.restore_initial_statuses();
		{
			let mut st = shared.state.borrow_mut();
			st.epoch += 1;
			st.phase = Phase::Idle;
			st.current_day = 0;
			st.baseline = Some(snapshot.clone());
			st.last_snapshot = Some(snapshot.clone());
		}
		{
			let mut graph = shared.graph.borrow_mut();
			graph.release_settled();
			graph.apply_incoming(&snapshot);
		}
		info!(
			"loaded network: {} nodes, {} links",
			snapshot.nodes.len(),
			snapshot.edges.len()
		);
		shared.notify();
	}

	/// Let the service run on its own and poll it until it stops.
	///
	/// Already running is a no-op. A finished run, a missing graph or another
	/// outstanding command is an [`ControllerError::IllegalTransition`] and changes nothing.
	pub async fn start(&self) -> Result<(), ControllerError> {
		let shared = &self.shared;
		let (prior, from, day, params, epoch) = {
			let mut st = shared.state.borrow_mut();
			let phase = st.phase;
			if phase == Phase::Running {
				return Ok(());
			}
			if phase == Phase::Finished || st.command.is_some() {
				return Err(ControllerError::illegal(phase, "start"));
			}
			let from = match phase {
				Phase::Idle => st.baseline.clone(),
				_ => st.last_snapshot.clone(),
			};
			let Some(from) = from else {
				return Err(ControllerError::illegal(phase, "start"));
			};
			st.command = Some("start");
			st.epoch += 1;
			if phase == Phase::Idle {
				st.phase = Phase::Initializing;
			}
			(phase, from, st.current_day, st.parameters, st.epoch)
		};
		let _busy = BusyGuard::new(&shared.state, Busy::Command);
		shared.notify();
		info!("starting run from day {day}");

		let result = shared.service.start(&from, day, &params).await;
		if shared.is_stale(epoch) {
			debug!("start response arrived after the run was abandoned");
			return Ok(());
		}
		let report = result.map_err(|err| shared.recover(prior, "start", err.into()))?;

		let finished = {
			let mut st = shared.state.borrow_mut();
			if let Some(snapshot) = report.snapshot {
				shared.adopt(&mut st, snapshot);
			}
			if let Some(reported) = report.current_day {
				st.current_day = st.current_day.max(reported);
			}
			st.phase = if report.is_finished {
				Phase::Finished
			} else {
				Phase::Running
			};
			report.is_finished
		};
		if !finished {
			if let Err(err) = Shared::begin_polling(shared, epoch) {
				return Err(shared.recover(
					prior,
					"start",
					ControllerError::ServiceUnavailable(err.to_string()),
				));
			}
		}
		shared.notify();
		Ok(())
	}

	/// Stop polling and ask the service to halt.
	///
	/// Acts while running or while a start is outstanding; the start's response is
	/// then discarded. Does nothing otherwise.
	pub async fn pause(&self) -> Result<(), ControllerError> {
		let shared = &self.shared;
		{
			let mut st = shared.state.borrow_mut();
			if st.phase != Phase::Running && st.command != Some("start") {
				return Ok(());
			}
			st.phase = Phase::Paused;
			st.epoch += 1;
		}
		shared.cancel_polling();
		shared.notify();
		info!("run paused on day {}", self.current_day());

		if let Err(err) = shared.service.pause().await {
			return Err(shared.recover(Phase::Paused, "pause", err.into()));
		}
		Ok(())
	}

	/// Advance exactly one day. From idle the run is initialised first and ends up paused.
	///
	/// Not reentrant: while a step, start or poll is outstanding further calls are rejected.
	pub async fn step(&self) -> Result<(), ControllerError> {
		let shared = &self.shared;
		let (prior, epoch) = {
			let mut st = shared.state.borrow_mut();
			let phase = st.phase;
			let blocked = matches!(phase, Phase::Running | Phase::Finished)
				|| st.command.is_some()
				|| st.poll_in_flight
				|| st.last_snapshot.is_none();
			if blocked {
				return Err(ControllerError::illegal(phase, "step"));
			}
			st.command = Some("step");
			st.phase = if phase == Phase::Idle {
				Phase::Initializing
			} else {
				Phase::Stepping
			};
			(phase, st.epoch)
		};
		let _busy = BusyGuard::new(&shared.state, Busy::Command);
		shared.notify();

		if prior == Phase::Idle {
			let (baseline, params) = {
				let st = shared.state.borrow();
				let baseline = st.baseline.as_ref().or(st.last_snapshot.as_ref()).cloned();
				(baseline.unwrap_or_default(), st.parameters)
			};
			let result = shared.service.init(&baseline, &params).await;
			if shared.is_stale(epoch) {
				return Ok(());
			}
			let report = result.map_err(|err| shared.recover(prior, "initialize", err.into()))?;
			let finished = {
				let mut st = shared.state.borrow_mut();
				if let Some(snapshot) = report.snapshot {
					shared.adopt(&mut st, snapshot);
				}
				if let Some(reported) = report.current_day {
					st.current_day = st.current_day.max(reported);
				}
				st.phase = if report.is_finished {
					Phase::Finished
				} else {
					Phase::Stepping
				};
				report.is_finished
			};
			shared.notify();
			if finished {
				return Ok(());
			}
		}

		let (from, day, params) = {
			let st = shared.state.borrow();
			(
				st.last_snapshot.clone().unwrap_or_default(),
				st.current_day,
				st.parameters,
			)
		};
		let result = shared.service.step(&from, day, &params).await;
		if shared.is_stale(epoch) {
			debug!("step response arrived after the run was abandoned");
			return Ok(());
		}
		let report = result.map_err(|err| shared.recover(prior, "step", err.into()))?;
		{
			let mut st = shared.state.borrow_mut();
			shared.adopt(&mut st, report.snapshot);
			st.current_day = report.current_day.unwrap_or(day + 1).max(day);
			st.phase = match prior {
				_ if report.is_finished => Phase::Finished,
				Phase::Idle => Phase::Paused,
				other => other,
			};
			debug!("stepped to day {} ({})", st.current_day, st.phase);
		}
		shared.notify();
		Ok(())
	}

	/// Replay the loaded snapshot from its initial statuses at day 0. No service call.
	pub fn reset(&self) {
		let shared = &self.shared;
		shared.cancel_polling();
		let restored = {
			let mut st = shared.state.borrow_mut();
			st.epoch += 1;
			st.phase = Phase::Idle;
			st.current_day = 0;
			st.last_snapshot.as_mut().map(|snapshot| {
				snapshot.restore_initial_statuses();
				snapshot.clone()
			})
		};
		if let Some(snapshot) = restored {
			shared.graph.borrow_mut().apply_incoming(&snapshot);
		}
		info!("run reset to day 0");
		shared.notify();
	}

	/// Replace the baseline with a fresh copy of the default network at day 0.
	///
	/// Polling stops at once. The run is only reset once the fetch succeeds; on
	/// failure it keeps its day and snapshot and recovers like any other command.
	pub async fn hard_reset(&self) -> Result<(), ControllerError> {
		let shared = &self.shared;
		shared.cancel_polling();
		let (prior, epoch) = {
			let mut st = shared.state.borrow_mut();
			st.epoch += 1;
			(st.phase, st.epoch)
		};

		let fetched = shared.service.fetch_default_network().await;
		if shared.is_stale(epoch) {
			debug!("default network arrived after the run moved on");
			return Ok(());
		}
		match fetched {
			Ok(snapshot) => {
				self.load_snapshot(snapshot);
				Ok(())
			}
			Err(err) => Err(shared.recover(prior, "hard reset", err.into())),
		}
	}

	/// Merge new knob values; they ride along with the next command sent.
	/// Returns the knobs that had to be clamped into range.
	pub fn update_parameters(&self, update: &ParameterUpdate) -> Vec<Knob> {
		let mut st = self.shared.state.borrow_mut();
		let clamped = st.parameters.merge(update);
		debug!("parameters now {:?}", st.parameters);
		clamped
	}

	/// Tear down for view close: no poll may fire afterwards and listeners are dropped.
	pub fn shutdown(&self) {
		let shared = &self.shared;
		shared.cancel_polling();
		shared.state.borrow_mut().epoch += 1;
		shared.listeners.borrow_mut().clear();
		debug!("simulation controller shut down");
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use futures::channel::oneshot;
	use futures::executor::block_on;
	use futures::future::{join, join_all};

	use super::*;
	use crate::graph::{Edge, GraphModel, HealthStatus, Node};
	use crate::simulation::ServiceError;
	use crate::simulation::testing::{FakeService, ManualTimer};

	type TestController = SimulationController<FakeService, ManualTimer>;

	fn network() -> Snapshot {
		let nodes = (0..6)
			.map(|i| {
				let status = if i == 0 {
					HealthStatus::Infected
				} else {
					HealthStatus::Susceptible
				};
				Node::new(i.to_string(), 20.0 + i as f64, status)
			})
			.collect();
		let edges = (0..6)
			.map(|i| Edge::new(i.to_string(), ((i + 1) % 6).to_string(), 0.5))
			.collect();
		Snapshot::new(nodes, edges)
	}

	fn setup() -> (TestController, FakeService, ManualTimer) {
		let service = FakeService::new(network());
		let timer = ManualTimer::default();
		let controller = SimulationController::new(
			service.clone(),
			timer.clone(),
			GraphModel::shared(),
			Duration::from_millis(500),
			SimulationParameters::default(),
		);
		(controller, service, timer)
	}

	fn loaded() -> (TestController, FakeService, ManualTimer) {
		let (controller, service, timer) = setup();
		block_on(controller.load_graph(GraphSource::Default)).unwrap();
		(controller, service, timer)
	}

	fn running_report(day: u32) -> RunReport {
		RunReport {
			snapshot: None,
			current_day: Some(day),
			running: true,
			is_finished: false,
		}
	}

	#[test]
	fn at_most_one_poll_handle_across_start_pause_cycles() {
		let (controller, _, timer) = loaded();
		for _ in 0..4 {
			block_on(controller.start()).unwrap();
			assert!(timer.live() <= 1);
			block_on(controller.start()).unwrap();
			assert_eq!(timer.live(), 1);
			assert!(controller.is_polling());
			assert_eq!(controller.phase(), Phase::Running);

			block_on(controller.pause()).unwrap();
			assert_eq!(timer.live(), 0);
			assert!(!controller.is_polling());
			assert_eq!(controller.phase(), Phase::Paused);
		}
		assert_eq!(timer.max_live(), 1);
	}

	#[test]
	fn pause_is_idempotent() {
		let (controller, service, _) = loaded();
		block_on(controller.pause()).unwrap();
		block_on(controller.start()).unwrap();
		block_on(controller.pause()).unwrap();
		block_on(controller.pause()).unwrap();
		assert_eq!(service.count("pause"), 1);
		assert_eq!(controller.phase(), Phase::Paused);
	}

	#[test]
	fn reset_replays_initial_statuses_at_day_zero() {
		let (controller, _, _) = loaded();
		block_on(controller.step()).unwrap();
		block_on(controller.step()).unwrap();
		assert_eq!(controller.current_day(), 2);
		let moved = controller.last_snapshot().unwrap();
		assert!(moved.nodes.iter().any(|n| n.days_infected.is_some()));

		controller.reset();
		assert_eq!(controller.current_day(), 0);
		assert_eq!(controller.phase(), Phase::Idle);
		let snapshot = controller.last_snapshot().unwrap();
		for node in &snapshot.nodes {
			assert_eq!(Some(node.status), node.initial_status);
			assert_eq!(node.days_infected, None);
		}
		let graph = controller.graph();
		for node in graph.borrow().nodes() {
			assert_eq!(node.status, node.initial_status);
			assert_eq!(node.days_infected, None);
		}
		assert_eq!(
			graph.borrow().node("0").unwrap().status,
			HealthStatus::Infected
		);
	}

	#[test]
	fn first_step_initialises_and_overlapping_step_is_rejected() {
		let (controller, service, _) = loaded();
		let (release, gate) = oneshot::channel();
		service.hold_next_step(gate);

		let first = controller.step();
		let second = async {
			let outcome = controller.step().await;
			release.send(()).unwrap();
			outcome
		};
		let (first, second) = block_on(join(first, second));

		first.unwrap();
		assert!(matches!(
			second,
			Err(ControllerError::IllegalTransition {
				operation: "step",
				..
			})
		));
		assert_eq!(controller.current_day(), 1);
		assert_eq!(controller.phase(), Phase::Paused);
		assert_eq!(service.count("init"), 1);
		assert_eq!(service.count("step"), 1);
	}

	#[test]
	fn step_is_refused_while_running() {
		let (controller, service, _) = loaded();
		block_on(controller.start()).unwrap();
		let err = block_on(controller.step()).unwrap_err();
		assert_eq!(err, ControllerError::illegal(Phase::Running, "step"));
		assert_eq!(service.count("step"), 0);
	}

	#[test]
	fn finished_poll_stops_loop_and_blocks_start_until_reset() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		service.script_poll(Ok(RunReport {
			snapshot: None,
			current_day: Some(12),
			running: false,
			is_finished: true,
		}));
		timer.fire();

		assert_eq!(controller.phase(), Phase::Finished);
		assert_eq!(controller.current_day(), 12);
		assert_eq!(timer.live(), 0);
		assert!(!controller.is_polling());

		assert!(block_on(controller.start()).is_err());
		assert_eq!(service.count("start"), 1);
		assert_eq!(controller.phase(), Phase::Finished);

		controller.reset();
		block_on(controller.start()).unwrap();
		assert_eq!(controller.phase(), Phase::Running);
	}

	#[test]
	fn poll_failure_reverts_to_paused_and_cancels_loop() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		service.script_poll(Err(ServiceError::Transport("connection refused".into())));
		timer.fire();

		assert_eq!(controller.phase(), Phase::Paused);
		assert_eq!(timer.live(), 0);
		assert!(!controller.is_polling());
	}

	#[test]
	fn stale_poll_day_is_ignored() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		service.script_poll(Ok(running_report(5)));
		service.script_poll(Ok(running_report(3)));
		timer.fire();
		timer.fire();
		assert_eq!(controller.current_day(), 5);
		assert_eq!(controller.phase(), Phase::Running);
	}

	#[test]
	fn service_stopping_on_its_own_pauses() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		service.script_poll(Ok(RunReport {
			running: false,
			..running_report(4)
		}));
		timer.fire();
		assert_eq!(controller.phase(), Phase::Paused);
		assert_eq!(timer.live(), 0);
	}

	#[test]
	fn failed_start_leaves_a_paused_run_paused() {
		let (controller, service, timer) = loaded();
		block_on(controller.step()).unwrap();
		service.fail_next(ServiceError::Status(503));
		let err = block_on(controller.start()).unwrap_err();
		assert!(matches!(err, ControllerError::ServiceUnavailable(_)));
		assert_eq!(controller.phase(), Phase::Paused);
		assert_eq!(controller.current_day(), 1);
		assert_eq!(timer.live(), 0);
	}

	#[test]
	fn failed_start_from_idle_stays_idle() {
		let (controller, service, _) = loaded();
		service.fail_next(ServiceError::Transport("offline".into()));
		assert!(block_on(controller.start()).is_err());
		assert_eq!(controller.phase(), Phase::Idle);
	}

	#[test]
	fn start_without_graph_is_illegal() {
		let (controller, service, _) = setup();
		let err = block_on(controller.start()).unwrap_err();
		assert_eq!(err, ControllerError::illegal(Phase::Idle, "start"));
		assert!(service.calls().is_empty());
	}

	#[test]
	fn malformed_upload_changes_nothing() {
		let (controller, service, _) = loaded();
		block_on(controller.step()).unwrap();
		let before = controller.status();

		let err = block_on(controller.load_graph(GraphSource::Upload(r#"{"nodes": []}"#.into())))
			.unwrap_err();
		assert!(matches!(err, ControllerError::InvalidGraphFormat(_)));
		assert_eq!(service.count("upload"), 0);

		let err = block_on(controller.load_graph(GraphSource::Upload(
			r#"{"nodes": [], "links": []}"#.into(),
		)))
		.unwrap_err();
		assert!(matches!(err, ControllerError::InvalidGraphFormat(_)));
		assert_eq!(controller.status(), before);
	}

	#[test]
	fn upload_becomes_new_baseline() {
		let (controller, _, _) = loaded();
		block_on(controller.step()).unwrap();
		let raw = r#"{
			"nodes": [{"id": "x", "age": 10, "status": "I"}, {"id": "y", "age": 50, "status": "S"}],
			"links": [{"source": "x", "target": "y"}, {"source": "x", "target": "ghost"}]
		}"#;
		block_on(controller.load_graph(GraphSource::Upload(raw.into()))).unwrap();

		assert_eq!(controller.phase(), Phase::Idle);
		assert_eq!(controller.current_day(), 0);
		let graph = controller.graph();
		let graph = graph.borrow();
		assert_eq!(graph.len(), 2);
		assert_eq!(graph.edges().len(), 1);
	}

	#[test]
	fn hard_reset_refetches_default_network() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		block_on(controller.hard_reset()).unwrap();
		assert_eq!(service.count("default"), 2);
		assert_eq!(controller.phase(), Phase::Idle);
		assert_eq!(controller.current_day(), 0);
		assert_eq!(timer.live(), 0);
	}

	#[test]
	fn failed_hard_reset_keeps_the_run() {
		let (controller, service, timer) = loaded();
		block_on(controller.step()).unwrap();
		block_on(controller.step()).unwrap();
		let before = controller.last_snapshot().unwrap();

		service.fail_next(ServiceError::Transport("offline".into()));
		let err = block_on(controller.hard_reset()).unwrap_err();
		assert!(matches!(err, ControllerError::ServiceUnavailable(_)));
		assert_eq!(controller.current_day(), 2);
		assert_eq!(controller.phase(), Phase::Paused);
		assert_eq!(controller.last_snapshot().unwrap(), before);
		assert_eq!(service.count("default"), 2);
		assert_eq!(timer.live(), 0);
	}

	#[test]
	fn failed_hard_reset_while_running_pauses() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		service.script_poll(Ok(running_report(4)));
		timer.fire();

		service.fail_next(ServiceError::Transport("offline".into()));
		assert!(block_on(controller.hard_reset()).is_err());
		assert_eq!(controller.current_day(), 4);
		assert_eq!(controller.phase(), Phase::Paused);
		assert!(!controller.is_polling());
		assert_eq!(timer.live(), 0);
	}

	#[test]
	fn pause_while_start_is_outstanding_wins() {
		let (controller, service, timer) = loaded();
		let (release, gate) = oneshot::channel();
		service.hold_next_start(gate);

		let paused = async {
			let outcome = controller.pause().await;
			release.send(()).unwrap();
			outcome
		};
		let (started, paused) = block_on(join(controller.start(), paused));

		started.unwrap();
		paused.unwrap();
		assert_eq!(controller.phase(), Phase::Paused);
		assert!(!controller.is_polling());
		assert_eq!(timer.live(), 0);
		assert_eq!(service.count("start"), 1);
		assert_eq!(service.count("pause"), 1);
	}

	fn all_recovered(day: u32) -> RunReport {
		let mut snapshot = network();
		for node in &mut snapshot.nodes {
			node.status = HealthStatus::Recovered;
		}
		RunReport {
			snapshot: Some(snapshot),
			current_day: Some(day),
			running: true,
			is_finished: false,
		}
	}

	#[test]
	fn poll_landing_after_pause_is_discarded() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		let (release, gate) = oneshot::channel();
		service.hold_next_poll(gate);
		service.script_poll(Ok(all_recovered(9)));

		let pause = async {
			controller.pause().await.unwrap();
			release.send(()).unwrap();
		};
		block_on(join(join_all(timer.ticks()), pause));

		assert_eq!(service.count("poll"), 1);
		assert_eq!(controller.phase(), Phase::Paused);
		assert_eq!(controller.current_day(), 0);
		assert_eq!(
			controller.graph().borrow().node("1").unwrap().status,
			HealthStatus::Susceptible
		);
		assert!(!controller.is_polling());
	}

	#[test]
	fn poll_landing_after_reset_is_discarded() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		let (release, gate) = oneshot::channel();
		service.hold_next_poll(gate);
		service.script_poll(Ok(all_recovered(9)));

		let reset = async {
			controller.reset();
			release.send(()).unwrap();
		};
		block_on(join(join_all(timer.ticks()), reset));

		assert_eq!(service.count("poll"), 1);
		assert_eq!(controller.phase(), Phase::Idle);
		assert_eq!(controller.current_day(), 0);
		let graph = controller.graph();
		for node in graph.borrow().nodes() {
			assert_eq!(node.status, node.initial_status);
		}
		assert_eq!(timer.live(), 0);
	}

	#[test]
	fn parameters_apply_to_the_next_command() {
		let (controller, service, _) = loaded();
		let clamped = controller.update_parameters(
			&ParameterUpdate::new()
				.with(Knob::S2E, 0.9)
				.with(Knob::Speed, 9.0),
		);
		assert_eq!(clamped, vec![Knob::Speed]);
		assert!(service.last_params().is_none());

		block_on(controller.step()).unwrap();
		let sent = service.last_params().unwrap();
		assert_eq!(sent.s2e, 0.9);
		assert_eq!(sent.simulation_speed, 5.0);
	}

	#[test]
	fn listeners_see_transitions_until_unsubscribed() {
		let (controller, _, _) = loaded();
		let seen = Rc::new(Cell::new(0));
		let counter = seen.clone();
		let id = controller.subscribe(move |status| {
			assert!(status.has_graph);
			counter.set(counter.get() + 1);
		});
		block_on(controller.start()).unwrap();
		assert!(seen.get() >= 1);

		assert!(controller.unsubscribe(id));
		let after = seen.get();
		block_on(controller.pause()).unwrap();
		assert_eq!(seen.get(), after);
	}

	#[test]
	fn shutdown_cancels_polling() {
		let (controller, service, timer) = loaded();
		block_on(controller.start()).unwrap();
		controller.shutdown();
		assert_eq!(timer.live(), 0);
		timer.fire();
		assert_eq!(service.count("poll"), 0);
	}

	#[test]
	fn dropping_the_controller_cancels_polling() {
		let (controller, _, timer) = loaded();
		block_on(controller.start()).unwrap();
		drop(controller);
		assert_eq!(timer.live(), 0);
	}
}
