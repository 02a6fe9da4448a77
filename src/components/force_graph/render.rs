use std::f64::consts::PI;

use web_sys::CanvasRenderingContext2d;

use super::state::ForceGraphState;
use super::types::{Tooltip, edge_alpha, edge_width, status_color};
use crate::graph::{GraphModel, PinKind};

const BACKGROUND: &str = "#0f172a";
const TOOLTIP_FONT_PX: f64 = 12.0;

fn ease_out_cubic(t: f64) -> f64 {
	1.0 - (1.0 - t).powi(3)
}

pub fn render(state: &ForceGraphState, ctx: &CanvasRenderingContext2d) {
	let size = state.viewport.size();
	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, size.x, size.y);

	let t = state.viewport.transform();
	ctx.save();
	let _ = ctx.translate(t.x, t.y);
	let _ = ctx.scale(t.k, t.k);
	{
		let graph = state.graph.borrow();
		draw_edges(state, &graph, ctx);
		draw_nodes(state, &graph, ctx);
	}
	ctx.restore();

	if let Some(tooltip) = state.tooltip() {
		draw_tooltip(&tooltip, size.x, ctx);
	}
}

fn draw_edges(state: &ForceGraphState, graph: &GraphModel, ctx: &CanvasRenderingContext2d) {
	let t = ease_out_cubic(state.hover.highlight_t);
	let nodes = graph.nodes();

	for edge in graph.edges() {
		let (a, b) = (&nodes[edge.source], &nodes[edge.target]);
		let lit = state.is_highlighted(&a.id) && state.is_highlighted(&b.id);
		let base = edge_alpha(edge.weight);
		let (alpha, width) = if lit {
			(base + (1.0 - base) * t, edge_width(edge.weight) * (1.0 + 0.3 * t))
		} else {
			(base * (1.0 - 0.75 * t), edge_width(edge.weight) * (1.0 - 0.3 * t))
		};

		ctx.set_stroke_style_str(&format!("rgba(148, 163, 184, {alpha})"));
		ctx.set_line_width(width);
		ctx.begin_path();
		ctx.move_to(a.position.x, a.position.y);
		ctx.line_to(b.position.x, b.position.y);
		ctx.stroke();
	}
}

fn draw_nodes(state: &ForceGraphState, graph: &GraphModel, ctx: &CanvasRenderingContext2d) {
	let (has_highlight, t, k) = (
		state.has_active_highlight(),
		ease_out_cubic(state.hover.highlight_t),
		state.viewport.transform().k,
	);

	for node in graph.nodes() {
		if has_highlight && state.is_highlighted(&node.id) {
			continue;
		}
		let (x, y) = (node.position.x, node.position.y);
		ctx.set_global_alpha(1.0 - 0.7 * t);
		ctx.begin_path();
		let _ = ctx.arc(x, y, node.radius() * (1.0 - 0.15 * t), 0.0, 2.0 * PI);
		ctx.set_fill_style_str(status_color(node.status));
		ctx.fill();
		ctx.set_global_alpha(1.0);

		if node.pin.is_some_and(|p| p.kind == PinKind::User) {
			ctx.set_stroke_style_str("rgba(255, 255, 255, 0.8)");
			ctx.set_line_width(1.5 / k);
			ctx.stroke();
		}
	}

	if !has_highlight {
		return;
	}

	// Highlighted nodes go on top.
	for node in graph.nodes() {
		if !state.is_highlighted(&node.id) {
			continue;
		}
		let (x, y) = (node.position.x, node.position.y);
		let base = node.radius();
		let hovered = state.is_hovered(&node.id);
		let (radius, glow_radius) = if hovered {
			(base * (1.0 + 0.35 * t), base * (1.8 + 1.2 * t))
		} else {
			(base * (1.0 + 0.2 * t), base * (1.4 + 0.6 * t))
		};

		if t > 0.01 {
			if let Ok(gradient) = ctx.create_radial_gradient(x, y, radius * 0.3, x, y, glow_radius) {
				let alpha = if hovered { 0.35 * t } else { 0.2 * t };
				let _ = gradient.add_color_stop(0.0, &format!("rgba(255, 255, 255, {alpha})"));
				let _ = gradient.add_color_stop(1.0, "rgba(255, 255, 255, 0)");
				ctx.begin_path();
				let _ = ctx.arc(x, y, glow_radius, 0.0, 2.0 * PI);
				#[allow(deprecated)]
				ctx.set_fill_style(&gradient);
				ctx.fill();
			}
		}

		ctx.begin_path();
		let _ = ctx.arc(x, y, radius, 0.0, 2.0 * PI);
		ctx.set_fill_style_str(status_color(node.status));
		ctx.fill();

		if hovered && t > 0.01 {
			ctx.begin_path();
			let _ = ctx.arc(x, y, radius + 2.0 / k, 0.0, 2.0 * PI);
			ctx.set_stroke_style_str(&format!("rgba(255, 255, 255, {})", 0.7 * t));
			ctx.set_line_width(1.5 / k);
			ctx.stroke();
		}
	}
}

/// Screen-space box beside the node, flipped left near the right edge.
fn draw_tooltip(tooltip: &Tooltip, viewport_width: f64, ctx: &CanvasRenderingContext2d) {
	let lines = tooltip.lines();
	ctx.set_font(&format!("{TOOLTIP_FONT_PX}px sans-serif"));
	let text_width = lines
		.iter()
		.filter_map(|line| ctx.measure_text(line).ok())
		.map(|m| m.width())
		.fold(0.0, f64::max);

	let (pad, line_height) = (6.0, TOOLTIP_FONT_PX + 4.0);
	let (w, h) = (text_width + pad * 2.0, lines.len() as f64 * line_height + pad * 2.0 - 4.0);
	let mut x = tooltip.anchor.x + 12.0;
	if x + w > viewport_width {
		x = tooltip.anchor.x - 12.0 - w;
	}
	let y = tooltip.anchor.y - h / 2.0;

	ctx.set_fill_style_str("rgba(15, 23, 42, 0.92)");
	ctx.fill_rect(x, y, w, h);
	ctx.set_stroke_style_str(status_color(tooltip.status));
	ctx.set_line_width(1.0);
	ctx.stroke_rect(x, y, w, h);

	ctx.set_fill_style_str("white");
	for (i, line) in lines.iter().enumerate() {
		let _ = ctx.fill_text(line, x + pad, y + pad + TOOLTIP_FONT_PX + i as f64 * line_height - 2.0);
	}
}
