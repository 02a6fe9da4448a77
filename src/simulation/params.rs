use std::ops::RangeInclusive;

use log::warn;
use serde::{Deserialize, Serialize};

/// Transition probabilities and playback speed, sent with every command.
///
/// Field names on the wire follow the service's compartment shorthand.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
	/// Exposure through an infected neighbour.
	#[serde(rename = "S2E")]
	pub s2e: f64,
	/// Background exposure regardless of contacts.
	#[serde(rename = "S2E_TAU")]
	pub s2e_tau: f64,
	/// Exposed to infectious.
	#[serde(rename = "E2I")]
	pub e2i: f64,
	/// Recovery straight from exposure.
	#[serde(rename = "E2R")]
	pub e2r: f64,
	/// Infectious to recovered.
	#[serde(rename = "I2R")]
	pub i2r: f64,
	/// Infectious to deceased.
	#[serde(rename = "I2D")]
	pub i2d: f64,
	/// Loss of immunity.
	#[serde(rename = "R2S")]
	pub r2s: f64,
	/// Days advanced per service tick.
	#[serde(rename = "simulationSpeed")]
	pub simulation_speed: f64,
}

impl Default for SimulationParameters {
	fn default() -> Self {
		Self {
			s2e: 0.4,
			s2e_tau: 0.01,
			e2i: 0.3,
			e2r: 0.1,
			i2r: 0.2,
			i2d: 0.05,
			r2s: 0.01,
			simulation_speed: 1.0,
		}
	}
}

/// One adjustable parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Knob {
	/// Exposure through contact.
	S2E,
	/// Background exposure.
	S2ETau,
	/// Incubation.
	E2I,
	/// Asymptomatic recovery.
	E2R,
	/// Recovery.
	I2R,
	/// Mortality.
	I2D,
	/// Immunity loss.
	R2S,
	/// Playback speed.
	Speed,
}

impl Knob {
	/// Every knob, in panel order.
	pub const ALL: [Knob; 8] = [
		Knob::S2E,
		Knob::S2ETau,
		Knob::E2I,
		Knob::E2R,
		Knob::I2R,
		Knob::I2D,
		Knob::R2S,
		Knob::Speed,
	];

	/// Transition probabilities, without the playback speed.
	pub const PROBABILITIES: [Knob; 7] = [
		Knob::S2E,
		Knob::S2ETau,
		Knob::E2I,
		Knob::E2R,
		Knob::I2R,
		Knob::I2D,
		Knob::R2S,
	];

	/// Panel label.
	pub fn label(self) -> &'static str {
		match self {
			Knob::S2E => "Transmission (S→E)",
			Knob::S2ETau => "Background exposure",
			Knob::E2I => "Incubation (E→I)",
			Knob::E2R => "Asymptomatic recovery (E→R)",
			Knob::I2R => "Recovery (I→R)",
			Knob::I2D => "Mortality (I→D)",
			Knob::R2S => "Immunity loss (R→S)",
			Knob::Speed => "Speed",
		}
	}

	/// Allowed values.
	pub fn range(self) -> RangeInclusive<f64> {
		match self {
			Knob::Speed => 0.5..=5.0,
			_ => 0.0..=1.0,
		}
	}

	/// Input granularity for the control panel.
	pub fn step(self) -> f64 {
		match self {
			Knob::Speed => 0.5,
			_ => 0.01,
		}
	}
}

impl SimulationParameters {
	/// Current value of a knob.
	pub fn get(&self, knob: Knob) -> f64 {
		match knob {
			Knob::S2E => self.s2e,
			Knob::S2ETau => self.s2e_tau,
			Knob::E2I => self.e2i,
			Knob::E2R => self.e2r,
			Knob::I2R => self.i2r,
			Knob::I2D => self.i2d,
			Knob::R2S => self.r2s,
			Knob::Speed => self.simulation_speed,
		}
	}

	fn slot(&mut self, knob: Knob) -> &mut f64 {
		match knob {
			Knob::S2E => &mut self.s2e,
			Knob::S2ETau => &mut self.s2e_tau,
			Knob::E2I => &mut self.e2i,
			Knob::E2R => &mut self.e2r,
			Knob::I2R => &mut self.i2r,
			Knob::I2D => &mut self.i2d,
			Knob::R2S => &mut self.r2s,
			Knob::Speed => &mut self.simulation_speed,
		}
	}

	/// Store `value` clamped into the knob's range. Returns whether it had to be clamped.
	/// Non-finite values leave the parameter untouched.
	pub fn set(&mut self, knob: Knob, value: f64) -> bool {
		if !value.is_finite() {
			warn!("ignoring non-finite value for {knob:?}");
			return false;
		}
		let range = knob.range();
		let clamped = value.clamp(*range.start(), *range.end());
		*self.slot(knob) = clamped;
		if clamped != value {
			warn!("{knob:?} = {value} is outside {range:?}; using {clamped}");
			return true;
		}
		false
	}

	/// Apply a partial update. Returns the knobs whose values were clamped.
	pub fn merge(&mut self, update: &ParameterUpdate) -> Vec<Knob> {
		update
			.values
			.iter()
			.filter(|&&(knob, value)| self.set(knob, value))
			.map(|&(knob, _)| knob)
			.collect()
	}

	/// Copy with every knob forced into range.
	pub fn sanitized(mut self) -> Self {
		for knob in Knob::ALL {
			let value = self.get(knob);
			if !value.is_finite() {
				*self.slot(knob) = Self::default().get(knob);
			} else {
				self.set(knob, value);
			}
		}
		self
	}
}

/// A partial set of parameter values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterUpdate {
	values: Vec<(Knob, f64)>,
}

impl ParameterUpdate {
	/// Empty update.
	pub fn new() -> Self {
		Self::default()
	}

	/// Add one knob value.
	pub fn with(mut self, knob: Knob, value: f64) -> Self {
		self.values.push((knob, value));
		self
	}

	/// Whether nothing is set.
	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

impl From<(Knob, f64)> for ParameterUpdate {
	fn from((knob, value): (Knob, f64)) -> Self {
		Self::new().with(knob, value)
	}
}
