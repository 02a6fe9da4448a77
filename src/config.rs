//! Runtime settings, read from an inline JSON block in the host page.

use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::layout::LayoutConfig;
use crate::simulation::SimulationParameters;
use crate::viewport::ViewportConfig;

/// Id of the `<script type="application/json">` element holding overrides.
pub const CONFIG_ELEMENT_ID: &str = "app-config";

/// Everything the page can override, with working defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
	/// Base URL of the simulation service.
	pub service_url: String,
	/// UI refresh cadence while running. Unrelated to playback speed.
	pub poll_interval_ms: u64,
	/// Keep a dragged node fixed where it was dropped.
	pub pin_on_release: bool,
	/// Force layout tuning.
	pub layout: LayoutConfig,
	/// Pan and zoom limits.
	pub viewport: ViewportConfig,
	/// Starting values for the control panel.
	pub parameters: SimulationParameters,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			service_url: "http://127.0.0.1:5000".into(),
			poll_interval_ms: 500,
			pin_on_release: true,
			layout: LayoutConfig::default(),
			viewport: ViewportConfig::default(),
			parameters: SimulationParameters::default(),
		}
	}
}

impl AppConfig {
	/// Parse a config document, sanitising parameters and the poll floor.
	pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
		let mut config: Self = serde_json::from_str(raw)?;
		config.parameters = config.parameters.sanitized();
		config.poll_interval_ms = config.poll_interval_ms.max(50);
		Ok(config)
	}

	/// Read overrides from the page, falling back to defaults.
	pub fn from_document() -> Self {
		let raw = web_sys::window()
			.and_then(|w| w.document())
			.and_then(|d| d.get_element_by_id(CONFIG_ELEMENT_ID))
			.and_then(|el| el.text_content());
		let Some(raw) = raw.filter(|text| !text.trim().is_empty()) else {
			info!("no #{CONFIG_ELEMENT_ID} block; using default settings");
			return Self::default();
		};
		match Self::from_json(&raw) {
			Ok(config) => config,
			Err(err) => {
				warn!("ignoring malformed #{CONFIG_ELEMENT_ID}: {err}");
				Self::default()
			}
		}
	}

	/// Poll cadence as a [`Duration`].
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}
}
