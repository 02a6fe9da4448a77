use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use glam::DVec2;

use super::types::Tooltip;
use crate::config::AppConfig;
use crate::graph::{NodeId, PinKind, SharedGraph};
use crate::layout::{LayoutEngine, TickOutcome};
use crate::viewport::Viewport;

/// Extra pick tolerance around a node, in screen pixels.
pub const HIT_SLOP: f64 = 3.0;

#[derive(Clone, Debug, Default)]
pub struct DragState {
	pub node: Option<NodeId>,
	pub moved: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PanState {
	pub active: bool,
	pub last: DVec2,
}

#[derive(Clone, Debug, Default)]
pub struct HoverState {
	pub node: Option<NodeId>,
	pub neighbors: HashSet<NodeId>,
	pub highlight_t: f64,
	pub prev_node: Option<NodeId>,
	pub prev_neighbors: HashSet<NodeId>,
	delay_t: f64,
}

/// Everything the canvas needs between frames: layout, view, and pointer state.
pub struct ForceGraphState {
	pub graph: SharedGraph,
	pub engine: LayoutEngine,
	pub viewport: Viewport,
	pub drag: DragState,
	pub pan: PanState,
	pub hover: HoverState,
	pin_on_release: bool,
	dirty: Rc<Cell<bool>>,
	seen_revision: Option<u64>,
}

impl ForceGraphState {
	pub fn new(graph: SharedGraph, config: &AppConfig, width: f64, height: f64, seed: u64) -> Self {
		let viewport = Viewport::new(config.viewport.clone(), width, height);
		let mut engine =
			LayoutEngine::new(config.layout.clone(), viewport.visible_layout_bounds(), seed);
		let dirty = Rc::new(Cell::new(true));
		let on_tick = dirty.clone();
		engine.subscribe(move |_| on_tick.set(true));

		Self {
			graph,
			engine,
			viewport,
			drag: DragState::default(),
			pan: PanState::default(),
			hover: HoverState::default(),
			pin_on_release: config.pin_on_release,
			dirty,
			seen_revision: None,
		}
	}

	pub fn mark_dirty(&self) {
		self.dirty.set(true);
	}

	/// Topmost node under a screen point.
	pub fn node_at_position(&self, screen: DVec2) -> Option<NodeId> {
		let point = self.viewport.to_layout(screen);
		let slop = HIT_SLOP / self.viewport.transform().k;
		let graph = self.graph.borrow();
		graph
			.nodes()
			.iter()
			.rev()
			.find(|node| node.position.distance(point) <= node.radius() + slop)
			.map(|node| node.id.clone())
	}

	/// Pointer down: grab a node, or start panning on empty canvas.
	pub fn press(&mut self, screen: DVec2) {
		match self.node_at_position(screen) {
			Some(id) => {
				let at = self.viewport.to_layout(screen);
				{
					let mut graph = self.graph.borrow_mut();
					graph.release_settled();
					graph.pin(&id, at, PinKind::User);
				}
				self.engine.begin_drag();
				self.drag = DragState {
					node: Some(id),
					moved: false,
				};
			}
			None => {
				self.pan = PanState {
					active: true,
					last: screen,
				};
			}
		}
		self.mark_dirty();
	}

	pub fn move_to(&mut self, screen: DVec2) {
		if let Some(id) = &self.drag.node {
			let at = self.viewport.to_layout(screen);
			self.graph.borrow_mut().pin(id, at, PinKind::User);
			self.drag.moved = true;
			self.mark_dirty();
		} else if self.pan.active {
			self.viewport.pan_by(screen - self.pan.last);
			self.pan.last = screen;
			self.sync_bounds();
		} else {
			let hovered = self.node_at_position(screen);
			self.set_hover(hovered);
		}
	}

	/// Pointer up: keep the dragged node pinned or hand it back to the layout.
	pub fn release(&mut self) {
		if let Some(id) = self.drag.node.take() {
			self.engine.end_drag();
			if !self.pin_on_release {
				self.graph.borrow_mut().unpin(&id);
			}
			self.drag.moved = false;
			self.mark_dirty();
		}
		self.pan.active = false;
	}

	pub fn leave(&mut self) {
		self.release();
		self.set_hover(None);
	}

	pub fn wheel(&mut self, screen: DVec2, delta_y: f64) {
		self.viewport.zoom_at(screen, delta_y);
		self.sync_bounds();
	}

	pub fn resize(&mut self, width: f64, height: f64) {
		self.viewport.resize(width, height);
		self.sync_bounds();
	}

	fn sync_bounds(&mut self) {
		self.engine.set_bounds(self.viewport.visible_layout_bounds());
		self.mark_dirty();
	}

	pub fn set_hover(&mut self, node: Option<NodeId>) {
		if self.hover.node == node {
			return;
		}
		let was_hovering = self.hover.node.is_some();

		if was_hovering && node.is_none() {
			self.hover.prev_node = self.hover.node.take();
			self.hover.prev_neighbors = std::mem::take(&mut self.hover.neighbors);
		} else {
			self.hover.prev_node = None;
			self.hover.prev_neighbors.clear();
		}

		self.hover.neighbors = match &node {
			Some(id) => self.graph.borrow().neighbors(id),
			None => HashSet::new(),
		};
		if node.is_some() && !was_hovering {
			self.hover.delay_t = 0.0;
		}
		self.hover.node = node;
		self.mark_dirty();
	}

	pub fn is_highlighted(&self, id: &str) -> bool {
		self.hover.node.as_deref() == Some(id)
			|| self.hover.neighbors.contains(id)
			|| self.hover.prev_node.as_deref() == Some(id)
			|| self.hover.prev_neighbors.contains(id)
	}

	pub fn is_hovered(&self, id: &str) -> bool {
		self.hover.node.as_deref() == Some(id) || self.hover.prev_node.as_deref() == Some(id)
	}

	pub fn has_active_highlight(&self) -> bool {
		self.hover.node.is_some() || self.hover.prev_node.is_some()
	}

	/// Inspector for the hovered node at its current on-screen position.
	pub fn tooltip(&self) -> Option<Tooltip> {
		let id = self.hover.node.as_ref()?;
		let graph = self.graph.borrow();
		let node = graph.node(id)?;
		Some(Tooltip {
			anchor: self.viewport.to_screen(node.position),
			id: node.id.clone(),
			age: node.age,
			status: node.status,
			days_infected: node.days_infected,
		})
	}

	/// Advance layout and hover easing. Returns whether the frame needs a redraw.
	pub fn tick(&mut self, dt: f64) -> bool {
		let outcome = self.engine.tick(&mut self.graph.borrow_mut());
		// Status-only merges move nothing but still change colours.
		if outcome == TickOutcome::Idle && self.graph_changed() {
			self.mark_dirty();
		}

		let easing = self.ease_highlight(dt);
		self.dirty.replace(false) || easing
	}

	fn graph_changed(&mut self) -> bool {
		let revision = self.graph.borrow().revision();
		let changed = self.seen_revision != Some(revision);
		self.seen_revision = Some(revision);
		changed
	}

	fn ease_highlight(&mut self, dt: f64) -> bool {
		let before = self.hover.highlight_t;
		let (target, delay, speed) = if self.hover.node.is_some() {
			(1.0, 0.08, 1.8)
		} else {
			(0.0, 0.0, 1.26)
		};

		if self.hover.node.is_some() {
			self.hover.delay_t = (self.hover.delay_t + dt).min(delay);
			if self.hover.delay_t >= delay {
				self.hover.highlight_t += (target - self.hover.highlight_t) * speed * dt;
			}
		} else {
			self.hover.highlight_t += (target - self.hover.highlight_t) * speed * dt;
			if self.hover.highlight_t < 0.01 {
				self.hover.highlight_t = 0.0;
				self.hover.prev_node = None;
				self.hover.prev_neighbors.clear();
			}
		}
		(self.hover.highlight_t - before).abs() > 1e-4
	}

	/// View teardown: the layout stops and drops its subscribers.
	pub fn shutdown(&mut self) {
		self.engine.stop();
		self.drag = DragState::default();
		self.pan.active = false;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::graph::{Edge, GraphModel, HealthStatus, Node, Snapshot};

	fn placed(id: &str, x: f64, y: f64, status: HealthStatus) -> Node {
		let mut node = Node::new(id, 40.0, status);
		node.x = Some(x);
		node.y = Some(y);
		node
	}

	fn pair(status: HealthStatus) -> Snapshot {
		Snapshot::new(
			vec![
				placed("a", 100.0, 100.0, status),
				placed("b", 300.0, 300.0, HealthStatus::Susceptible),
			],
			vec![Edge::new("a", "b", 1.0)],
		)
	}

	fn state(pin_on_release: bool) -> ForceGraphState {
		let graph = GraphModel::shared();
		graph.borrow_mut().apply_incoming(&pair(HealthStatus::Susceptible));
		let config = AppConfig {
			pin_on_release,
			..AppConfig::default()
		};
		ForceGraphState::new(graph, &config, 800.0, 600.0, 1)
	}

	#[test]
	fn hit_test_respects_zoom() {
		let mut state = state(true);
		assert_eq!(state.node_at_position(DVec2::new(100.0, 100.0)).as_deref(), Some("a"));
		assert_eq!(state.node_at_position(DVec2::new(200.0, 200.0)), None);

		state.viewport.scale_at(DVec2::ZERO, 2.0);
		assert_eq!(state.node_at_position(DVec2::new(200.0, 200.0)).as_deref(), Some("a"));
	}

	#[test]
	fn dropped_node_stays_where_released_across_merges() {
		let mut state = state(true);
		state.press(DVec2::new(100.0, 100.0));
		state.move_to(DVec2::new(50.0, 50.0));
		state.release();

		let target = DVec2::new(50.0, 50.0);
		for _ in 0..20 {
			state.tick(0.016);
		}
		state.graph.borrow_mut().apply_incoming(&pair(HealthStatus::Infected));
		for _ in 0..20 {
			state.tick(0.016);
		}

		let graph = state.graph.borrow();
		let a = graph.node("a").unwrap();
		assert_eq!(a.position, target);
		assert_eq!(a.status, HealthStatus::Infected);
		assert_eq!(a.pin.map(|p| p.kind), Some(PinKind::User));
	}

	#[test]
	fn release_can_hand_node_back_to_layout() {
		let mut state = state(false);
		state.press(DVec2::new(100.0, 100.0));
		assert!(state.graph.borrow().node("a").unwrap().is_pinned());
		state.release();
		assert!(!state.graph.borrow().node("a").unwrap().is_pinned());
	}

	#[test]
	fn empty_space_pans() {
		let mut state = state(true);
		state.press(DVec2::new(600.0, 50.0));
		state.move_to(DVec2::new(640.0, 80.0));
		state.release();
		assert_eq!(state.viewport.transform().translation(), DVec2::new(40.0, 30.0));
		assert_eq!(state.node_at_position(DVec2::new(140.0, 130.0)).as_deref(), Some("a"));
		assert!(state.drag.node.is_none());
	}

	#[test]
	fn tooltip_follows_zoom() {
		let mut state = state(true);
		state.move_to(DVec2::new(300.0, 300.0));
		assert_eq!(state.tooltip().unwrap().id, "b");
		assert!(state.hover.neighbors.contains("a"));

		state.wheel(DVec2::ZERO, -1.0);
		let k = state.viewport.transform().k;
		let tooltip = state.tooltip().unwrap();
		assert!((tooltip.anchor - DVec2::new(300.0 * k, 300.0 * k)).length() < 1e-9);

		state.leave();
		assert!(state.tooltip().is_none());
	}

	#[test]
	fn redraw_only_when_something_changed() {
		let mut state = state(true);
		state.engine.stop();
		assert!(state.tick(0.016));
		assert!(!state.tick(0.016));
		state.wheel(DVec2::new(10.0, 10.0), 1.0);
		assert!(state.tick(0.016));
	}
}
