use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ServiceError;
use super::params::SimulationParameters;
use crate::graph::Snapshot;

/// Run state as reported by `init`, `start` and `poll`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
	/// Network state, when sent.
	#[serde(rename = "data", alias = "simulationData", default)]
	pub snapshot: Option<Snapshot>,
	/// Day the service is on.
	#[serde(default)]
	pub current_day: Option<u32>,
	/// Whether the service advances on its own.
	#[serde(default)]
	pub running: bool,
	/// Whether the outbreak is over.
	#[serde(default)]
	pub is_finished: bool,
}

/// Result of a single-step request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
	/// Network after the step.
	#[serde(rename = "simulationData", alias = "data")]
	pub snapshot: Snapshot,
	/// Some services only report the new state; the caller then counts the day itself.
	#[serde(default)]
	pub current_day: Option<u32>,
	/// Whether the outbreak is over.
	#[serde(default)]
	pub is_finished: bool,
}

/// The remote epidemic engine.
///
/// Every call carries what it needs as arguments; implementations keep no
/// knowledge of the controller's state.
#[async_trait(?Send)]
pub trait SimulationService {
	/// The built-in network.
	async fn fetch_default_network(&self) -> Result<Snapshot, ServiceError>;

	/// A generated network.
	async fn fetch_random_network(&self) -> Result<Snapshot, ServiceError>;

	/// Hand a caller-supplied graph over for validation. Bad graphs fail with
	/// [`ServiceError::Rejected`].
	async fn upload_network(&self, graph: &Snapshot) -> Result<Snapshot, ServiceError>;

	/// Prepare a run over `baseline` without advancing it.
	async fn init(
		&self,
		baseline: &Snapshot,
		params: &SimulationParameters,
	) -> Result<RunReport, ServiceError>;

	/// Let the service advance on its own from `from`, which is at `current_day`.
	async fn start(
		&self,
		from: &Snapshot,
		current_day: u32,
		params: &SimulationParameters,
	) -> Result<RunReport, ServiceError>;

	/// Current run state.
	async fn poll(&self) -> Result<RunReport, ServiceError>;

	/// Advance one day from `from`.
	async fn step(
		&self,
		from: &Snapshot,
		current_day: u32,
		params: &SimulationParameters,
	) -> Result<StepReport, ServiceError>;

	/// Halt the service's own loop.
	async fn pause(&self) -> Result<(), ServiceError>;
}
