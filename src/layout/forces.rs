use glam::DVec2;

use super::LayoutConfig;
use super::quadtree::{Body, QuadTree};
use crate::graph::{LiveEdge, LiveNode};

/// Bodies for the spatial index. Pinned nodes still repel and collide.
pub(super) fn bodies(nodes: &[LiveNode], config: &LayoutConfig) -> Vec<Body> {
	nodes
		.iter()
		.map(|n| Body {
			position: n.position,
			mass: 1.0,
			radius: n.radius() + config.collide_padding,
		})
		.collect()
}

/// Springs along edges. Degrees are recounted from the current edge set on every call.
pub(super) fn apply_links(
	nodes: &mut [LiveNode],
	edges: &[LiveEdge],
	config: &LayoutConfig,
	alpha: f64,
) {
	let mut degree = vec![0u32; nodes.len()];
	for edge in edges {
		degree[edge.source] += 1;
		degree[edge.target] += 1;
	}

	for edge in edges {
		if edge.source == edge.target {
			continue;
		}
		let (s, t) = (&nodes[edge.source], &nodes[edge.target]);
		let delta = (t.position + t.velocity) - (s.position + s.velocity);
		let length = delta.length();
		if length == 0.0 {
			continue;
		}

		let (ds, dt) = (degree[edge.source] as f64, degree[edge.target] as f64);
		let strength = config.link_strength * edge.weight / ds.min(dt);
		let bias = ds / (ds + dt);
		let pull = delta * ((length - config.link_distance) / length * alpha * strength);

		if !nodes[edge.target].is_pinned() {
			nodes[edge.target].velocity -= pull * bias;
		}
		if !nodes[edge.source].is_pinned() {
			nodes[edge.source].velocity += pull * (1.0 - bias);
		}
	}
}

pub(super) fn apply_charge(
	nodes: &mut [LiveNode],
	tree: &QuadTree,
	config: &LayoutConfig,
	alpha: f64,
) {
	let min_distance_sq = config.min_distance * config.min_distance;
	for (idx, node) in nodes.iter_mut().enumerate() {
		if node.is_pinned() {
			continue;
		}
		let field = tree.field_at(idx, config.theta, min_distance_sq);
		node.velocity += field * (config.charge_strength * alpha);
	}
}

/// Push overlapping discs apart, splitting the correction by relative area.
pub(super) fn apply_collisions(nodes: &mut [LiveNode], tree: &QuadTree, config: &LayoutConfig) {
	let reach_extra = nodes
		.iter()
		.map(|n| n.radius() + config.collide_padding)
		.fold(0.0, f64::max);

	for i in 0..nodes.len() {
		let ri = nodes[i].radius() + config.collide_padding;
		let pi = nodes[i].position + nodes[i].velocity;
		let mut contacts = Vec::new();
		tree.visit_near(pi, ri + reach_extra, |j, body| {
			if j > i {
				contacts.push((j, body.radius));
			}
		});

		for (j, rj) in contacts {
			let pj = nodes[j].position + nodes[j].velocity;
			let delta = pi - pj;
			let reach = ri + rj;
			let dist_sq = delta.length_squared();
			if dist_sq == 0.0 || dist_sq >= reach * reach {
				continue;
			}
			let dist = dist_sq.sqrt();
			let push = delta * ((reach - dist) / dist * config.collide_strength);
			let share = rj * rj / (ri * ri + rj * rj);
			if !nodes[i].is_pinned() {
				nodes[i].velocity += push * share;
			}
			if !nodes[j].is_pinned() {
				nodes[j].velocity -= push * (1.0 - share);
			}
		}
	}
}

/// Nudge free nodes so the overall centroid drifts towards `center`.
pub(super) fn apply_centering(
	nodes: &mut [LiveNode],
	center: DVec2,
	config: &LayoutConfig,
	alpha: f64,
) {
	if nodes.is_empty() {
		return;
	}
	let centroid = nodes.iter().map(|n| n.position).sum::<DVec2>() / nodes.len() as f64;
	let shift = (center - centroid) * (config.center_strength * alpha);
	for node in nodes.iter_mut().filter(|n| !n.is_pinned()) {
		node.velocity += shift;
	}
}

/// Advance free nodes by their damped velocity and hold pinned ones in place.
/// Returns the mean squared speed of the free nodes.
pub(super) fn integrate(nodes: &mut [LiveNode], config: &LayoutConfig) -> f64 {
	let (mut energy, mut free) = (0.0, 0usize);
	for node in nodes.iter_mut() {
		match node.pin {
			Some(pin) => {
				node.position = pin.at;
				node.velocity = DVec2::ZERO;
			}
			None => {
				node.velocity *= 1.0 - config.velocity_decay;
				node.position += node.velocity;
				energy += node.velocity.length_squared();
				free += 1;
			}
		}
	}
	if free == 0 { 0.0 } else { energy / free as f64 }
}
