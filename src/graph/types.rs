use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Stable identity of a person in the contact network.
pub type NodeId = String;

/// Health compartment of a node. Travels on the wire as a single letter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
	/// Never infected, or lost immunity.
	#[default]
	#[serde(rename = "S", alias = "susceptible")]
	Susceptible,
	/// Infected but not yet infectious.
	#[serde(rename = "E", alias = "exposed")]
	Exposed,
	/// Infectious.
	#[serde(rename = "I", alias = "infected")]
	Infected,
	/// Immune for now.
	#[serde(rename = "R", alias = "recovered")]
	Recovered,
	/// Removed from the population.
	#[serde(rename = "D", alias = "deceased")]
	Deceased,
}

impl HealthStatus {
	/// Compartments in wire order (`peopleState` index order).
	pub const ALL: [HealthStatus; 5] = [
		HealthStatus::Susceptible,
		HealthStatus::Exposed,
		HealthStatus::Infected,
		HealthStatus::Recovered,
		HealthStatus::Deceased,
	];

	/// Position in [`StatusCounts`].
	pub fn index(self) -> usize {
		match self {
			HealthStatus::Susceptible => 0,
			HealthStatus::Exposed => 1,
			HealthStatus::Infected => 2,
			HealthStatus::Recovered => 3,
			HealthStatus::Deceased => 4,
		}
	}

	/// Human-readable name.
	pub fn label(self) -> &'static str {
		match self {
			HealthStatus::Susceptible => "Susceptible",
			HealthStatus::Exposed => "Exposed",
			HealthStatus::Infected => "Infected",
			HealthStatus::Recovered => "Recovered",
			HealthStatus::Deceased => "Deceased",
		}
	}

	/// Whether `daysInfected` is meaningful in this compartment.
	pub fn tracks_days_infected(self) -> bool {
		matches!(self, HealthStatus::Exposed | HealthStatus::Infected)
	}
}

/// Population per compartment, `[S, E, I, R, D]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCounts(pub [u32; 5]);

impl StatusCounts {
	/// Population of one compartment.
	pub fn get(&self, status: HealthStatus) -> u32 {
		self.0[status.index()]
	}

	/// Whole population.
	pub fn total(&self) -> u32 {
		self.0.iter().sum()
	}

	/// Tally statuses from a node list.
	pub fn tally(statuses: impl IntoIterator<Item = HealthStatus>) -> Self {
		let mut counts = [0u32; 5];
		for status in statuses {
			counts[status.index()] += 1;
		}
		Self(counts)
	}
}

/// A node as exchanged with the simulation service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	/// Person id; integers on the wire become strings.
	#[serde(deserialize_with = "de_node_id")]
	pub id: NodeId,
	/// Age in years.
	pub age: f64,
	/// Current compartment.
	pub status: HealthStatus,
	/// Days since exposure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub days_infected: Option<u32>,
	/// Compartment at day 0.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub initial_status: Option<HealthStatus>,
	/// Layout hint, only consulted when the node is first seen.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub x: Option<f64>,
	/// Layout hint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub y: Option<f64>,
	/// Fixed x position.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fx: Option<f64>,
	/// Fixed y position.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fy: Option<f64>,
}

impl Node {
	/// Node with no layout hints.
	pub fn new(id: impl Into<NodeId>, age: f64, status: HealthStatus) -> Self {
		Self {
			id: id.into(),
			age,
			status,
			days_infected: None,
			initial_status: None,
			x: None,
			y: None,
			fx: None,
			fy: None,
		}
	}
}

/// An undirected, weighted contact between two nodes. Endpoints are ids only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
	/// One endpoint.
	#[serde(deserialize_with = "de_node_ref")]
	pub source: NodeId,
	/// The other endpoint.
	#[serde(deserialize_with = "de_node_ref")]
	pub target: NodeId,
	/// Contact strength, clamped to `[0, 1]`.
	#[serde(default = "default_weight", deserialize_with = "de_weight")]
	pub weight: f64,
}

impl Edge {
	/// Weighted edge between two ids.
	pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, weight: f64) -> Self {
		Self {
			source: source.into(),
			target: target.into(),
			weight,
		}
	}
}

fn default_weight() -> f64 {
	1.0
}

/// Upload payload rejected before it reached the service.
#[derive(Debug, Error)]
pub enum GraphFormatError {
	/// Not JSON at all.
	#[error("graph data is not valid JSON: {0}")]
	Json(#[source] serde_json::Error),
	/// A required collection is absent.
	#[error("graph data has no `{0}` list")]
	MissingList(&'static str),
	/// JSON of the wrong shape.
	#[error("graph data is malformed: {0}")]
	Malformed(#[source] serde_json::Error),
}

/// One simulated day of the network: nodes, edges and optional compartment tallies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
	/// People in the network.
	pub nodes: Vec<Node>,
	/// Contacts, `links` on the wire.
	#[serde(rename = "links")]
	pub edges: Vec<Edge>,
	/// Tallies reported by the service.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub people_state: Option<StatusCounts>,
}

impl Snapshot {
	/// Snapshot without reported tallies.
	pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
		Self {
			nodes,
			edges,
			people_state: None,
		}
	}

	/// Parse an uploaded graph document.
	///
	/// Both the `nodes` and the `links` collections must be present, even if empty.
	pub fn from_json(raw: &str) -> Result<Self, GraphFormatError> {
		let value: serde_json::Value = serde_json::from_str(raw).map_err(GraphFormatError::Json)?;
		for list in ["nodes", "links"] {
			if !value.get(list).is_some_and(serde_json::Value::is_array) {
				return Err(GraphFormatError::MissingList(list));
			}
		}
		let mut snapshot: Snapshot =
			serde_json::from_value(value).map_err(GraphFormatError::Malformed)?;
		snapshot.normalize();
		Ok(snapshot)
	}

	/// Counts reported by the service, or tallied from the nodes.
	pub fn counts(&self) -> StatusCounts {
		self.people_state
			.unwrap_or_else(|| StatusCounts::tally(self.nodes.iter().map(|n| n.status)))
	}

	/// Enforce per-node and per-edge field invariants.
	pub fn normalize(&mut self) {
		for node in &mut self.nodes {
			if !node.status.tracks_days_infected() {
				node.days_infected = None;
			}
			if !node.age.is_finite() || node.age < 0.0 {
				node.age = 0.0;
			}
		}
		for edge in &mut self.edges {
			edge.weight = if edge.weight.is_finite() {
				edge.weight.clamp(0.0, 1.0)
			} else {
				default_weight()
			};
		}
	}

	/// Record the current status as the initial one wherever none was captured.
	pub fn capture_initial_statuses(&mut self) {
		for node in &mut self.nodes {
			node.initial_status.get_or_insert(node.status);
		}
	}

	/// Carry captured initial statuses over from an earlier snapshot of the same run.
	pub fn inherit_initial_statuses(&mut self, earlier: &Snapshot) {
		let known: std::collections::HashMap<&str, HealthStatus> = earlier
			.nodes
			.iter()
			.filter_map(|n| n.initial_status.map(|s| (n.id.as_str(), s)))
			.collect();
		for node in &mut self.nodes {
			if node.initial_status.is_none() {
				node.initial_status = known.get(node.id.as_str()).copied();
			}
		}
	}

	/// Put every node back in its initial compartment and clear infection clocks.
	pub fn restore_initial_statuses(&mut self) {
		for node in &mut self.nodes {
			node.status = node.initial_status.unwrap_or_default();
			node.days_infected = None;
		}
		self.people_state = None;
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
	Text(String),
	Number(serde_json::Number),
}

impl From<RawId> for NodeId {
	fn from(raw: RawId) -> Self {
		match raw {
			RawId::Text(text) => text,
			RawId::Number(number) => number.to_string(),
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNodeRef {
	Id(RawId),
	Node { id: RawId },
}

fn de_node_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeId, D::Error> {
	RawId::deserialize(deserializer).map(NodeId::from)
}

// Edges exported from a live force layout may carry whole node objects as endpoints.
fn de_node_ref<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeId, D::Error> {
	Ok(match RawNodeRef::deserialize(deserializer)? {
		RawNodeRef::Id(id) | RawNodeRef::Node { id } => id.into(),
	})
}

fn de_weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
	Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_else(default_weight))
}
