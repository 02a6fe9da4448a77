use glam::DVec2;
use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::forces;
use super::quadtree::QuadTree;
use super::{Bounds, LayoutConfig};
use crate::graph::{GraphModel, LiveEdge, LiveNode, Pin, PinKind};

/// Handle returned by [`LayoutEngine::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What a subscriber sees after a tick.
pub struct Frame<'a> {
	/// Nodes after the tick.
	pub nodes: &'a [LiveNode],
	/// Edges after the tick.
	pub edges: &'a [LiveEdge],
	/// Current energy.
	pub alpha: f64,
	/// Whether this tick converged.
	pub settled: bool,
}

/// Result of [`LayoutEngine::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
	/// The engine was torn down.
	Stopped,
	/// Nothing is moving.
	Idle,
	/// Nodes moved.
	Moved,
	/// Converged on this tick; free nodes are now pinned.
	Settled,
}

type Subscriber = Box<dyn FnMut(&Frame<'_>)>;

/// Iterative relaxation over a [`GraphModel`].
///
/// The engine holds no per-node state of its own: velocities and pins live on the
/// graph, so snapshot merges between ticks are picked up as-is.
pub struct LayoutEngine {
	config: LayoutConfig,
	alpha: f64,
	alpha_target: f64,
	bounds: Bounds,
	rng: SmallRng,
	subscribers: Vec<(SubscriptionId, Subscriber)>,
	next_subscription: u64,
	active: bool,
	stopped: bool,
	seen_revision: Option<u64>,
	warm_ticks: u32,
}

impl LayoutEngine {
	/// Engine seeding new nodes inside `bounds` from `seed`.
	pub fn new(config: LayoutConfig, bounds: Bounds, seed: u64) -> Self {
		Self {
			config,
			alpha: 1.0,
			alpha_target: 0.0,
			bounds,
			rng: SmallRng::seed_from_u64(seed),
			subscribers: Vec::new(),
			next_subscription: 0,
			active: false,
			stopped: false,
			seen_revision: None,
			warm_ticks: 0,
		}
	}

	/// Visible layout-space region; new nodes are seeded inside it.
	pub fn set_bounds(&mut self, bounds: Bounds) {
		self.bounds = bounds;
	}

	/// Current energy.
	pub fn alpha(&self) -> f64 {
		self.alpha
	}

	/// Restart the relaxation with at least the configured reheat energy.
	pub fn reheat(&mut self) {
		if self.stopped {
			return;
		}
		self.alpha = self.alpha.max(self.config.reheat_alpha);
		self.active = true;
		self.warm_ticks = 0;
	}

	/// Hold the energy up while a drag is in progress.
	pub fn begin_drag(&mut self) {
		self.alpha_target = self.config.drag_alpha_target;
		self.reheat();
	}

	/// Let the energy decay again.
	pub fn end_drag(&mut self) {
		self.alpha_target = 0.0;
	}

	/// Call `subscriber` after every tick that moves nodes.
	pub fn subscribe(&mut self, subscriber: impl FnMut(&Frame<'_>) + 'static) -> SubscriptionId {
		let id = SubscriptionId(self.next_subscription);
		self.next_subscription += 1;
		self.subscribers.push((id, Box::new(subscriber)));
		id
	}

	/// Drop a subscriber. Returns whether it was registered.
	pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
		let before = self.subscribers.len();
		self.subscribers.retain(|(sub, _)| *sub != id);
		self.subscribers.len() != before
	}

	/// Registered subscribers.
	pub fn subscriber_count(&self) -> usize {
		self.subscribers.len()
	}

	/// Tear down: drop subscribers and refuse further ticks.
	pub fn stop(&mut self) {
		self.stopped = true;
		self.active = false;
		self.subscribers.clear();
	}

	/// Advance the relaxation by one step.
	pub fn tick(&mut self, graph: &mut GraphModel) -> TickOutcome {
		if self.stopped {
			return TickOutcome::Stopped;
		}
		if self.seen_revision != Some(graph.revision()) {
			self.seen_revision = Some(graph.revision());
			let placed = self.place_new_nodes(graph);
			let loose = !self.active && graph.nodes().iter().any(|n| !n.is_pinned());
			if placed > 0 || loose {
				self.reheat();
			}
		}
		if !self.active || graph.is_empty() {
			return TickOutcome::Idle;
		}

		self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay;
		self.warm_ticks = self.warm_ticks.saturating_add(1);

		let center = self.bounds.center();
		let config = &self.config;
		let (nodes, edges) = graph.parts_mut();
		let tree = QuadTree::build(forces::bodies(nodes, config));
		forces::apply_links(nodes, edges, config, self.alpha);
		forces::apply_charge(nodes, &tree, config, self.alpha);
		forces::apply_collisions(nodes, &tree, config);
		forces::apply_centering(nodes, center, config, self.alpha);
		let energy = forces::integrate(nodes, config);

		let cooled = self.alpha < config.alpha_min;
		let calm = self.warm_ticks > config.warmup_ticks && energy < config.kinetic_threshold;
		let settled = self.alpha_target == 0.0 && (cooled || calm);
		if settled {
			self.active = false;
			if config.freeze_on_settle {
				let frozen = freeze(nodes);
				debug!("layout settled at alpha {:.4}; froze {frozen} nodes", self.alpha);
			}
		}

		self.notify(graph, settled);
		if settled {
			TickOutcome::Settled
		} else {
			TickOutcome::Moved
		}
	}

	fn notify(&mut self, graph: &GraphModel, settled: bool) {
		if self.subscribers.is_empty() {
			return;
		}
		let frame = Frame {
			nodes: graph.nodes(),
			edges: graph.edges(),
			alpha: self.alpha,
			settled,
		};
		for (_, subscriber) in &mut self.subscribers {
			subscriber(&frame);
		}
	}

	fn place_new_nodes(&mut self, graph: &mut GraphModel) -> usize {
		let Bounds { min, max } = self.bounds;
		let mut placed = 0;
		for node in graph.nodes_mut().iter_mut().filter(|n| n.needs_placement) {
			node.position = DVec2::new(
				sample(&mut self.rng, min.x, max.x),
				sample(&mut self.rng, min.y, max.y),
			);
			node.velocity = DVec2::ZERO;
			node.needs_placement = false;
			placed += 1;
		}
		if placed > 0 {
			debug!("seeded {placed} new nodes inside {min}..{max}");
		}
		placed
	}
}

fn sample(rng: &mut SmallRng, lo: f64, hi: f64) -> f64 {
	if hi > lo { rng.gen_range(lo..hi) } else { lo }
}

fn freeze(nodes: &mut [LiveNode]) -> usize {
	let mut frozen = 0;
	for node in nodes.iter_mut().filter(|n| n.pin.is_none()) {
		node.pin = Some(Pin {
			at: node.position,
			kind: PinKind::Settled,
		});
		node.velocity = DVec2::ZERO;
		frozen += 1;
	}
	frozen
}
