use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::DVec2;
use log::debug;

use super::types::{HealthStatus, Node, NodeId, Snapshot, StatusCounts};

/// Graph shared between the controller (snapshot merges), the layout engine and pointer input.
pub type SharedGraph = Rc<RefCell<GraphModel>>;

/// Render radius for a node of the given age.
pub fn node_radius(age: f64) -> f64 {
	5.0 + age.max(0.0) / 20.0
}

/// Who fixed a node in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinKind {
	/// Placed by the user; survives stabilisation and reheats.
	User,
	/// Frozen by the layout engine after convergence.
	Settled,
}

/// A fixed node position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pin {
	/// Layout-space position the node is held at.
	pub at: DVec2,
	/// Who placed it.
	pub kind: PinKind,
}

/// A node in the live, mutable set: domain fields from the latest snapshot plus layout state.
#[derive(Clone, Debug)]
pub struct LiveNode {
	/// Identity, stable across snapshots.
	pub id: NodeId,
	/// Age in years; drives the radius.
	pub age: f64,
	/// Current compartment.
	pub status: HealthStatus,
	/// Days since exposure, while exposed or infected.
	pub days_infected: Option<u32>,
	/// Compartment at day 0, replayed by a reset.
	pub initial_status: HealthStatus,
	/// Layout-space position.
	pub position: DVec2,
	/// Per-tick displacement.
	pub velocity: DVec2,
	/// Set while the node is held in place.
	pub pin: Option<Pin>,
	/// Set for nodes that arrived without a position; cleared once the layout seeds them.
	pub needs_placement: bool,
}

impl LiveNode {
	fn from_incoming(node: &Node) -> Self {
		let hint = node.x.zip(node.y).map(|(x, y)| DVec2::new(x, y));
		let pin = node.fx.zip(node.fy).map(|(x, y)| Pin {
			at: DVec2::new(x, y),
			kind: PinKind::User,
		});
		let position = pin.map(|p| p.at).or(hint);
		Self {
			id: node.id.clone(),
			age: node.age,
			status: node.status,
			days_infected: node.days_infected,
			initial_status: node.initial_status.unwrap_or(node.status),
			position: position.unwrap_or(DVec2::ZERO),
			velocity: DVec2::ZERO,
			pin,
			needs_placement: position.is_none(),
		}
	}

	fn absorb(&mut self, node: &Node) {
		self.age = node.age;
		self.status = node.status;
		self.days_infected = node.days_infected;
		if let Some(initial) = node.initial_status {
			self.initial_status = initial;
		}
	}

	/// Render radius in layout units.
	pub fn radius(&self) -> f64 {
		node_radius(self.age)
	}

	/// Whether the layout may move this node.
	pub fn is_pinned(&self) -> bool {
		self.pin.is_some()
	}
}

/// An edge resolved against the node arena at merge time.
#[derive(Clone, Debug)]
pub struct LiveEdge {
	/// Source id.
	pub source_id: NodeId,
	/// Target id.
	pub target_id: NodeId,
	/// Source index into [`GraphModel::nodes`].
	pub source: usize,
	/// Target index into [`GraphModel::nodes`].
	pub target: usize,
	/// Contact strength in `[0, 1]`.
	pub weight: f64,
}

/// What a merge did to the live set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
	/// Nodes seen for the first time.
	pub added: usize,
	/// Nodes that took new domain fields.
	pub updated: usize,
	/// Nodes absent from the snapshot.
	pub removed: usize,
	/// Repeated ids ignored.
	pub duplicates: usize,
	/// Edges with an unknown endpoint.
	pub dropped_edges: usize,
}

impl MergeReport {
	/// Whether nodes came or went.
	pub fn topology_changed(&self) -> bool {
		self.added > 0 || self.removed > 0
	}
}

/// Arena of live nodes indexed by id, plus the resolved edge list.
#[derive(Debug, Default)]
pub struct GraphModel {
	nodes: Vec<LiveNode>,
	index: HashMap<NodeId, usize>,
	edges: Vec<LiveEdge>,
	counts: StatusCounts,
	revision: u64,
}

impl GraphModel {
	/// Empty graph.
	pub fn new() -> Self {
		Self::default()
	}

	/// Empty graph behind a shared handle.
	pub fn shared() -> SharedGraph {
		Rc::new(RefCell::new(Self::new()))
	}

	/// Merge a snapshot into the live set.
	///
	/// Nodes present on both sides take the incoming domain fields but keep their
	/// position, velocity and pin. Nodes only in the snapshot are appended and flagged
	/// for placement. Nodes missing from the snapshot are removed. Edges are rebuilt
	/// from the snapshot; any edge whose endpoint is unknown is dropped.
	pub fn apply_incoming(&mut self, snapshot: &Snapshot) -> MergeReport {
		let mut report = MergeReport::default();

		let incoming: HashSet<&str> = snapshot.nodes.iter().map(|n| n.id.as_str()).collect();
		let before = self.nodes.len();
		self.nodes.retain(|n| incoming.contains(n.id.as_str()));
		report.removed = before - self.nodes.len();
		if report.removed > 0 {
			self.reindex();
		}

		let mut seen = HashSet::with_capacity(snapshot.nodes.len());
		for node in &snapshot.nodes {
			if !seen.insert(node.id.as_str()) {
				report.duplicates += 1;
				continue;
			}
			match self.index.get(&node.id) {
				Some(&idx) => {
					self.nodes[idx].absorb(node);
					report.updated += 1;
				}
				None => {
					self.index.insert(node.id.clone(), self.nodes.len());
					self.nodes.push(LiveNode::from_incoming(node));
					report.added += 1;
				}
			}
		}

		self.edges.clear();
		for edge in &snapshot.edges {
			match (self.index.get(&edge.source), self.index.get(&edge.target)) {
				(Some(&source), Some(&target)) => self.edges.push(LiveEdge {
					source_id: edge.source.clone(),
					target_id: edge.target.clone(),
					source,
					target,
					weight: edge.weight,
				}),
				_ => report.dropped_edges += 1,
			}
		}

		self.counts = snapshot.counts();
		self.revision += 1;
		debug!(
			"graph merge r{}: +{} ~{} -{} (dup {}, dropped edges {})",
			self.revision,
			report.added,
			report.updated,
			report.removed,
			report.duplicates,
			report.dropped_edges
		);
		report
	}

	fn reindex(&mut self) {
		self.index.clear();
		for (idx, node) in self.nodes.iter().enumerate() {
			self.index.insert(node.id.clone(), idx);
		}
	}

	/// Live nodes in arena order.
	pub fn nodes(&self) -> &[LiveNode] {
		&self.nodes
	}

	/// Live nodes, mutably.
	pub fn nodes_mut(&mut self) -> &mut [LiveNode] {
		&mut self.nodes
	}

	/// Resolved edges.
	pub fn edges(&self) -> &[LiveEdge] {
		&self.edges
	}

	/// Split borrow used by the layout engine: positions change, edges are read.
	pub fn parts_mut(&mut self) -> (&mut [LiveNode], &[LiveEdge]) {
		(&mut self.nodes, &self.edges)
	}

	/// Arena index for an id.
	pub fn index_of(&self, id: &str) -> Option<usize> {
		self.index.get(id).copied()
	}

	/// Node by id.
	pub fn node(&self, id: &str) -> Option<&LiveNode> {
		self.index_of(id).map(|idx| &self.nodes[idx])
	}

	/// Node by id, mutably.
	pub fn node_mut(&mut self, id: &str) -> Option<&mut LiveNode> {
		self.index_of(id).map(|idx| &mut self.nodes[idx])
	}

	/// Ids adjacent to `id` in the current edge set.
	pub fn neighbors(&self, id: &str) -> HashSet<NodeId> {
		let Some(idx) = self.index_of(id) else {
			return HashSet::new();
		};
		self.edges
			.iter()
			.filter_map(|e| {
				if e.source == idx {
					Some(e.target_id.clone())
				} else if e.target == idx {
					Some(e.source_id.clone())
				} else {
					None
				}
			})
			.collect()
	}

	/// Fix a node at `at`. Returns false if the id is unknown.
	pub fn pin(&mut self, id: &str, at: DVec2, kind: PinKind) -> bool {
		let Some(node) = self.node_mut(id) else {
			return false;
		};
		node.pin = Some(Pin { at, kind });
		node.position = at;
		node.velocity = DVec2::ZERO;
		node.needs_placement = false;
		true
	}

	/// Hand a node back to the layout. Returns whether it was pinned.
	pub fn unpin(&mut self, id: &str) -> bool {
		self.node_mut(id).and_then(|node| node.pin.take()).is_some()
	}

	/// Hand every convergence-frozen node back to the layout engine.
	pub fn release_settled(&mut self) -> usize {
		let mut released = 0;
		for node in &mut self.nodes {
			if node.pin.is_some_and(|p| p.kind == PinKind::Settled) {
				node.pin = None;
				released += 1;
			}
		}
		released
	}

	/// Counts from the latest snapshot.
	pub fn counts(&self) -> StatusCounts {
		self.counts
	}

	/// Bumped on every merge.
	pub fn revision(&self) -> u64 {
		self.revision
	}

	/// Number of live nodes.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Whether no nodes are loaded.
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}
}
