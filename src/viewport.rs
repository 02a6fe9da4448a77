//! Pan and zoom state for the canvas, and the mapping between layout and screen space.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::layout::Bounds;

/// Zoom and pan limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
	/// Smallest allowed zoom.
	pub min_scale: f64,
	/// Largest allowed zoom.
	pub max_scale: f64,
	/// Scale factor applied per wheel notch.
	pub zoom_step: f64,
	/// Layout-space region the view may not be panned away from. Unbounded when absent.
	pub translate_extent: Option<Bounds>,
}

impl Default for ViewportConfig {
	fn default() -> Self {
		Self {
			min_scale: 0.1,
			max_scale: 8.0,
			zoom_step: 1.1,
			translate_extent: None,
		}
	}
}

/// `screen = layout * k + (x, y)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportTransform {
	/// Horizontal offset in screen pixels.
	pub x: f64,
	/// Vertical offset in screen pixels.
	pub y: f64,
	/// Scale factor.
	pub k: f64,
}

impl Default for ViewportTransform {
	fn default() -> Self {
		Self::IDENTITY
	}
}

impl ViewportTransform {
	/// No pan, no zoom.
	pub const IDENTITY: Self = Self {
		x: 0.0,
		y: 0.0,
		k: 1.0,
	};

	/// Offset as a vector.
	pub fn translation(&self) -> DVec2 {
		DVec2::new(self.x, self.y)
	}

	/// Layout point to screen point.
	pub fn to_screen(&self, layout: DVec2) -> DVec2 {
		layout * self.k + self.translation()
	}

	/// Screen point to layout point. Exact inverse of [`Self::to_screen`].
	pub fn to_layout(&self, screen: DVec2) -> DVec2 {
		(screen - self.translation()) / self.k
	}

	/// Shift by a layout-space offset.
	fn translate(self, by: DVec2) -> Self {
		Self {
			x: self.x + by.x * self.k,
			y: self.y + by.y * self.k,
			k: self.k,
		}
	}
}

/// The transform plus the canvas it is applied to.
#[derive(Clone, Debug)]
pub struct Viewport {
	transform: ViewportTransform,
	config: ViewportConfig,
	size: DVec2,
}

impl Viewport {
	/// Viewport over a `width` x `height` canvas.
	pub fn new(config: ViewportConfig, width: f64, height: f64) -> Self {
		let mut viewport = Self {
			transform: ViewportTransform::IDENTITY,
			config,
			size: DVec2::new(width, height),
		};
		viewport.set_transform(ViewportTransform::IDENTITY);
		viewport
	}

	/// Current transform.
	pub fn transform(&self) -> ViewportTransform {
		self.transform
	}

	/// Canvas size in pixels.
	pub fn size(&self) -> DVec2 {
		self.size
	}

	/// Track a canvas resize.
	pub fn resize(&mut self, width: f64, height: f64) {
		self.size = DVec2::new(width, height);
		self.transform = self.constrain(self.transform);
	}

	/// Replace the transform, clamping scale and translation.
	pub fn set_transform(&mut self, transform: ViewportTransform) {
		let k = self.clamp_scale(transform.k);
		self.transform = self.constrain(ViewportTransform { k, ..transform });
	}

	/// Layout point to screen point.
	pub fn to_screen(&self, layout: DVec2) -> DVec2 {
		self.transform.to_screen(layout)
	}

	/// Screen point to layout point.
	pub fn to_layout(&self, screen: DVec2) -> DVec2 {
		self.transform.to_layout(screen)
	}

	/// One wheel notch around `anchor`. Positive `delta_y` zooms out.
	pub fn zoom_at(&mut self, anchor: DVec2, delta_y: f64) {
		let factor = if delta_y > 0.0 {
			1.0 / self.config.zoom_step
		} else {
			self.config.zoom_step
		};
		self.scale_at(anchor, self.transform.k * factor);
	}

	/// Set the scale while keeping the layout point under `anchor` in place.
	pub fn scale_at(&mut self, anchor: DVec2, k: f64) {
		let k = self.clamp_scale(k);
		let pinned = self.transform.to_layout(anchor);
		let t = anchor - pinned * k;
		self.transform = self.constrain(ViewportTransform { x: t.x, y: t.y, k });
	}

	/// Pan by a screen-space offset.
	pub fn pan_by(&mut self, screen_delta: DVec2) {
		let t = self.transform;
		self.transform = self.constrain(ViewportTransform {
			x: t.x + screen_delta.x,
			y: t.y + screen_delta.y,
			k: t.k,
		});
	}

	/// Layout-space rectangle currently on screen.
	pub fn visible_layout_bounds(&self) -> Bounds {
		Bounds::new(self.to_layout(DVec2::ZERO), self.to_layout(self.size))
	}

	fn clamp_scale(&self, k: f64) -> f64 {
		if k.is_finite() {
			k.clamp(self.config.min_scale, self.config.max_scale)
		} else {
			self.transform.k
		}
	}

	/// Keep the translate extent covering the screen; centre it when it is smaller.
	fn constrain(&self, transform: ViewportTransform) -> ViewportTransform {
		let Some(extent) = self.config.translate_extent else {
			return transform;
		};
		let d0 = transform.to_layout(DVec2::ZERO) - extent.min;
		let d1 = transform.to_layout(self.size) - extent.max;
		transform.translate(DVec2::new(axis_shift(d0.x, d1.x), axis_shift(d0.y, d1.y)))
	}
}

fn axis_shift(d0: f64, d1: f64) -> f64 {
	if d1 > d0 {
		(d0 + d1) / 2.0
	} else if d0 < 0.0 {
		d0
	} else {
		d1.max(0.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn close(a: DVec2, b: DVec2) -> bool {
		(a - b).length() <= 1e-9 * (1.0 + a.length().max(b.length()))
	}

	#[test]
	fn screen_and_layout_are_inverse() {
		let points = [
			DVec2::ZERO,
			DVec2::new(10.0, 20.0),
			DVec2::new(-1234.5, 987.25),
			DVec2::new(1e6, -1e-3),
		];
		for k in [0.1, 0.37, 1.0, 2.5, 8.0] {
			for (x, y) in [(0.0, 0.0), (-300.0, 42.5), (1e4, -7.0)] {
				let t = ViewportTransform { x, y, k };
				for p in points {
					assert!(close(t.to_layout(t.to_screen(p)), p), "{p} at {t:?}");
					assert!(close(t.to_screen(t.to_layout(p)), p), "{p} at {t:?}");
				}
			}
		}
	}

	#[test]
	fn scale_is_clamped() {
		let mut viewport = Viewport::new(ViewportConfig::default(), 800.0, 600.0);
		for _ in 0..200 {
			viewport.zoom_at(DVec2::new(400.0, 300.0), -1.0);
		}
		assert_eq!(viewport.transform().k, 8.0);
		for _ in 0..400 {
			viewport.zoom_at(DVec2::new(400.0, 300.0), 1.0);
		}
		assert_eq!(viewport.transform().k, 0.1);

		viewport.set_transform(ViewportTransform {
			x: 0.0,
			y: 0.0,
			k: 50.0,
		});
		assert_eq!(viewport.transform().k, 8.0);
	}

	#[test]
	fn zoom_keeps_anchor_fixed() {
		let mut viewport = Viewport::new(ViewportConfig::default(), 800.0, 600.0);
		viewport.pan_by(DVec2::new(35.0, -12.0));
		let anchor = DVec2::new(220.0, 410.0);
		let under = viewport.to_layout(anchor);
		viewport.zoom_at(anchor, -120.0);
		viewport.zoom_at(anchor, -120.0);
		assert!(viewport.transform().k > 1.2);
		assert!(close(viewport.to_screen(under), anchor));
	}

	#[test]
	fn pan_is_held_inside_translate_extent() {
		let config = ViewportConfig {
			translate_extent: Some(Bounds::from_size(1000.0, 1000.0)),
			..Default::default()
		};
		let mut viewport = Viewport::new(config, 400.0, 300.0);
		viewport.pan_by(DVec2::new(500.0, 500.0));
		assert_eq!(viewport.transform().translation(), DVec2::ZERO);

		viewport.pan_by(DVec2::new(-5000.0, -5000.0));
		let visible = viewport.visible_layout_bounds();
		assert!(close(visible.max, DVec2::new(1000.0, 1000.0)));
	}

	#[test]
	fn extent_smaller_than_screen_is_centred() {
		let config = ViewportConfig {
			translate_extent: Some(Bounds::from_size(100.0, 100.0)),
			..Default::default()
		};
		let viewport = Viewport::new(config, 400.0, 300.0);
		let visible = viewport.visible_layout_bounds();
		assert!(close(visible.center(), DVec2::new(50.0, 50.0)));
	}

	#[test]
	fn visible_bounds_follow_transform() {
		let mut viewport = Viewport::new(ViewportConfig::default(), 800.0, 600.0);
		viewport.set_transform(ViewportTransform {
			x: 100.0,
			y: 50.0,
			k: 2.0,
		});
		let visible = viewport.visible_layout_bounds();
		assert_eq!(visible.min, DVec2::new(-50.0, -25.0));
		assert_eq!(visible.max, DVec2::new(350.0, 275.0));
	}
}
