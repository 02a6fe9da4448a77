//! Force-directed positioning of the live graph.
//!
//! The engine combines four terms every tick:
//! - attraction along each edge towards a rest length, stiffer for heavier edges
//! - Barnes-Hut repulsion between all nodes
//! - a pull of the free nodes' centroid towards the viewport centre
//! - collision keeping rendered discs apart
//!
//! Once the relaxation cools, every node is pinned where it rests.

mod engine;
mod forces;
mod quadtree;

use glam::DVec2;
use serde::{Deserialize, Serialize};

pub use engine::{Frame, LayoutEngine, SubscriptionId, TickOutcome};
pub use quadtree::{Body, QuadTree};

/// Axis-aligned rectangle in layout space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
	/// Top-left corner.
	pub min: DVec2,
	/// Bottom-right corner.
	pub max: DVec2,
}

impl Bounds {
	/// Rectangle spanned by two corners in any order.
	pub fn new(min: DVec2, max: DVec2) -> Self {
		Self {
			min: min.min(max),
			max: min.max(max),
		}
	}

	/// Rectangle from the origin.
	pub fn from_size(width: f64, height: f64) -> Self {
		Self::new(DVec2::ZERO, DVec2::new(width, height))
	}

	/// Smallest rectangle holding every point; a unit box at the origin when empty.
	pub fn enclosing(points: impl IntoIterator<Item = DVec2>) -> Self {
		let (mut min, mut max) = (DVec2::INFINITY, DVec2::NEG_INFINITY);
		for p in points {
			min = min.min(p);
			max = max.max(p);
		}
		if min.x > max.x {
			return Self::new(DVec2::ZERO, DVec2::ONE);
		}
		Self { min, max }
	}

	/// Width and height.
	pub fn size(&self) -> DVec2 {
		self.max - self.min
	}

	/// Midpoint.
	pub fn center(&self) -> DVec2 {
		(self.min + self.max) / 2.0
	}

	/// Whether `p` lies inside, edges included.
	pub fn contains(&self, p: DVec2) -> bool {
		p.cmpge(self.min).all() && p.cmple(self.max).all()
	}
}

/// Tuning for [`LayoutEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
	/// Rest length of an edge.
	pub link_distance: f64,
	/// Edge stiffness at weight 1.
	pub link_strength: f64,
	/// Many-body strength; negative repels.
	pub charge_strength: f64,
	/// Barnes-Hut opening angle. `0.0` is exact and quadratic.
	pub theta: f64,
	/// Floor on pair distance for repulsion.
	pub min_distance: f64,
	/// Extra clearance added to each node's render radius.
	pub collide_padding: f64,
	/// How much of an overlap is resolved per tick.
	pub collide_strength: f64,
	/// Pull of the centroid towards the view centre.
	pub center_strength: f64,
	/// Fraction of velocity lost per tick.
	pub velocity_decay: f64,
	/// Energy below which the layout settles.
	pub alpha_min: f64,
	/// Fraction of the energy gap closed per tick.
	pub alpha_decay: f64,
	/// Energy the relaxation is pulled towards while a node is dragged.
	pub drag_alpha_target: f64,
	/// Energy restored when new nodes arrive or a drag begins.
	pub reheat_alpha: f64,
	/// Mean squared speed under which the layout counts as settled.
	pub kinetic_threshold: f64,
	/// Ticks after a reheat before the kinetic test applies.
	pub warmup_ticks: u32,
	/// Pin free nodes once settled.
	pub freeze_on_settle: bool,
}

impl Default for LayoutConfig {
	fn default() -> Self {
		let alpha_min = 0.001;
		Self {
			link_distance: 50.0,
			link_strength: 1.0,
			charge_strength: -30.0,
			theta: 0.9,
			min_distance: 1.0,
			collide_padding: 5.0,
			collide_strength: 0.7,
			center_strength: 0.1,
			velocity_decay: 0.4,
			alpha_min,
			alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
			drag_alpha_target: 0.3,
			reheat_alpha: 0.3,
			kinetic_threshold: 0.01,
			warmup_ticks: 30,
			freeze_on_settle: true,
		}
	}
}
