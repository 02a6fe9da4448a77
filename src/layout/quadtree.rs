use glam::DVec2;

use super::Bounds;

// Coincident bodies would otherwise split forever.
const MAX_DEPTH: u32 = 24;

/// A point mass the tree is built from.
#[derive(Clone, Copy, Debug)]
pub struct Body {
	/// Centre.
	pub position: DVec2,
	/// Repulsion weight.
	pub mass: f64,
	/// Collision radius including padding.
	pub radius: f64,
}

#[derive(Clone, Debug)]
struct Cell {
	min: DVec2,
	size: f64,
	mass: f64,
	centroid: DVec2,
	max_radius: f64,
	children: Option<[usize; 4]>,
	bodies: Vec<usize>,
}

impl Cell {
	fn new(min: DVec2, size: f64) -> Self {
		Self {
			min,
			size,
			mass: 0.0,
			centroid: DVec2::ZERO,
			max_radius: 0.0,
			children: None,
			bodies: Vec::new(),
		}
	}

	fn quadrant(&self, p: DVec2) -> usize {
		let mid = self.min + DVec2::splat(self.size / 2.0);
		(p.x >= mid.x) as usize | (((p.y >= mid.y) as usize) << 1)
	}

	fn contains(&self, p: DVec2) -> bool {
		p.x >= self.min.x
			&& p.x <= self.min.x + self.size
			&& p.y >= self.min.y
			&& p.y <= self.min.y + self.size
	}

	/// Whether the square, grown by the widest body radius inside it, comes within `reach` of `p`.
	fn overlaps(&self, p: DVec2, reach: f64) -> bool {
		let pad = self.max_radius;
		p.x + reach >= self.min.x - pad
			&& p.x - reach <= self.min.x + self.size + pad
			&& p.y + reach >= self.min.y - pad
			&& p.y - reach <= self.min.y + self.size + pad
	}
}

/// Barnes-Hut quadtree over a set of bodies, rebuilt every layout tick.
#[derive(Clone, Debug, Default)]
pub struct QuadTree {
	cells: Vec<Cell>,
	bodies: Vec<Body>,
}

impl QuadTree {
	/// Tree over `bodies`; indices follow input order.
	pub fn build(bodies: Vec<Body>) -> Self {
		let mut tree = Self {
			cells: Vec::with_capacity(bodies.len() * 2),
			bodies,
		};
		if tree.bodies.is_empty() {
			return tree;
		}

		let bounds = Bounds::enclosing(tree.bodies.iter().map(|b| b.position));
		let extent = bounds.size();
		let size = extent.x.max(extent.y).max(1.0);
		tree.cells.push(Cell::new(bounds.min, size));

		for body in 0..tree.bodies.len() {
			tree.insert(0, body, 0);
		}
		tree.summarize(0);
		tree
	}

	/// Number of bodies.
	pub fn len(&self) -> usize {
		self.bodies.len()
	}

	/// Whether the tree is empty.
	pub fn is_empty(&self) -> bool {
		self.bodies.is_empty()
	}

	fn insert(&mut self, cell: usize, body: usize, depth: u32) {
		let position = self.bodies[body].position;
		if let Some(children) = self.cells[cell].children {
			let q = self.cells[cell].quadrant(position);
			self.insert(children[q], body, depth + 1);
			return;
		}

		self.cells[cell].bodies.push(body);
		if self.cells[cell].bodies.len() < 2 || depth >= MAX_DEPTH {
			return;
		}

		let (min, half) = (self.cells[cell].min, self.cells[cell].size / 2.0);
		let first = self.cells.len();
		for q in 0..4 {
			let offset = DVec2::new((q & 1) as f64 * half, (q >> 1) as f64 * half);
			self.cells.push(Cell::new(min + offset, half));
		}
		self.cells[cell].children = Some([first, first + 1, first + 2, first + 3]);
		for moved in std::mem::take(&mut self.cells[cell].bodies) {
			self.insert(cell, moved, depth);
		}
	}

	fn summarize(&mut self, cell: usize) {
		let (mut mass, mut weighted, mut max_radius) = (0.0, DVec2::ZERO, 0.0f64);
		if let Some(children) = self.cells[cell].children {
			for child in children {
				self.summarize(child);
				let c = &self.cells[child];
				mass += c.mass;
				weighted += c.centroid * c.mass;
				max_radius = max_radius.max(c.max_radius);
			}
		} else {
			for &b in &self.cells[cell].bodies {
				let body = &self.bodies[b];
				mass += body.mass;
				weighted += body.position * body.mass;
				max_radius = max_radius.max(body.radius);
			}
		}
		let c = &mut self.cells[cell];
		c.mass = mass;
		c.centroid = if mass > 0.0 { weighted / mass } else { c.min };
		c.max_radius = max_radius;
	}

	/// Sum of `mass * delta / |delta|²` over every other body, with far cells
	/// approximated by their centre of mass when `size / distance < theta`.
	///
	/// `delta` points from `body` towards the source, so a negative strength
	/// applied by the caller repels.
	pub fn field_at(&self, body: usize, theta: f64, min_distance_sq: f64) -> DVec2 {
		let mut field = DVec2::ZERO;
		if self.cells.is_empty() {
			return field;
		}
		let origin = self.bodies[body].position;
		let mut stack = vec![0usize];
		while let Some(idx) = stack.pop() {
			let cell = &self.cells[idx];
			if cell.mass == 0.0 {
				continue;
			}
			match cell.children {
				Some(children) => {
					let delta = cell.centroid - origin;
					let dist_sq = delta.length_squared();
					let far = dist_sq > 0.0 && cell.size * cell.size < theta * theta * dist_sq;
					if far && !cell.contains(origin) {
						field += delta * cell.mass / dist_sq.max(min_distance_sq);
					} else {
						stack.extend(children);
					}
				}
				None => {
					for &other in &cell.bodies {
						if other == body {
							continue;
						}
						let source = &self.bodies[other];
						let delta = source.position - origin;
						let dist_sq = delta.length_squared();
						if dist_sq > 0.0 {
							field += delta * source.mass / dist_sq.max(min_distance_sq);
						}
					}
				}
			}
		}
		field
	}

	/// Visit every body whose disc may come within `reach` of `point`.
	pub fn visit_near(&self, point: DVec2, reach: f64, mut visit: impl FnMut(usize, &Body)) {
		if self.cells.is_empty() {
			return;
		}
		let mut stack = vec![0usize];
		while let Some(idx) = stack.pop() {
			let cell = &self.cells[idx];
			if !cell.overlaps(point, reach) {
				continue;
			}
			match cell.children {
				Some(children) => stack.extend(children),
				None => {
					for &b in &cell.bodies {
						visit(b, &self.bodies[b]);
					}
				}
			}
		}
	}
}
