use glam::DVec2;

use crate::graph::{HealthStatus, NodeId};

pub fn status_color(status: HealthStatus) -> &'static str {
	match status {
		HealthStatus::Susceptible => "#10b981",
		HealthStatus::Exposed => "#f59e0b",
		HealthStatus::Infected => "#ef4444",
		HealthStatus::Recovered => "#3b82f6",
		HealthStatus::Deceased => "#6b7280",
	}
}

/// Heavier contacts are drawn more opaque.
pub fn edge_alpha(weight: f64) -> f64 {
	weight * 0.7 + 0.3
}

/// Stroke width in layout units.
pub fn edge_width(weight: f64) -> f64 {
	weight * 2.0 + 0.5
}

/// Inspector contents for the hovered node, anchored in screen space.
#[derive(Clone, Debug, PartialEq)]
pub struct Tooltip {
	pub anchor: DVec2,
	pub id: NodeId,
	pub age: f64,
	pub status: HealthStatus,
	pub days_infected: Option<u32>,
}

impl Tooltip {
	pub fn lines(&self) -> Vec<String> {
		let mut lines = vec![
			format!("ID: {}", self.id),
			format!("Age: {:.0}", self.age),
			format!("Status: {}", self.status.label()),
		];
		if let Some(days) = self.days_infected {
			lines.push(format!("Days infected: {days}"));
		}
		lines
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn edge_styling_scales_with_weight() {
		assert_eq!(edge_alpha(0.0), 0.3);
		assert_eq!(edge_alpha(1.0), 1.0);
		assert_eq!(edge_width(0.5), 1.5);
	}

	#[test]
	fn tooltip_mentions_days_only_when_known() {
		let mut tooltip = Tooltip {
			anchor: DVec2::ZERO,
			id: "7".into(),
			age: 41.6,
			status: HealthStatus::Recovered,
			days_infected: None,
		};
		assert_eq!(tooltip.lines(), ["ID: 7", "Age: 42", "Status: Recovered"]);
		tooltip.days_infected = Some(3);
		assert_eq!(tooltip.lines().last().unwrap(), "Days infected: 3");
	}
}
