use thiserror::Error;

use super::Phase;
use crate::graph::GraphFormatError;

/// Failure talking to the simulation service.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
	/// The request never completed.
	#[error("request failed: {0}")]
	Transport(String),
	/// Non-success HTTP status.
	#[error("service answered with HTTP {0}")]
	Status(u16),
	/// Body did not parse.
	#[error("could not decode service response: {0}")]
	Decode(String),
	/// The service refused the payload as invalid.
	#[error("service rejected the request: {0}")]
	Rejected(String),
}

/// Error surfaced by [`super::SimulationController`] after it has recovered its state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
	/// Graph data failed validation.
	#[error("invalid graph format: {0}")]
	InvalidGraphFormat(String),
	/// The service could not be reached or failed.
	#[error("simulation service unavailable: {0}")]
	ServiceUnavailable(String),
	/// The operation is not allowed in this phase.
	#[error("cannot {operation} while {phase}")]
	IllegalTransition {
		/// Phase the run was in.
		phase: Phase,
		/// What was attempted.
		operation: &'static str,
	},
}

impl ControllerError {
	/// Shorthand for [`ControllerError::IllegalTransition`].
	pub fn illegal(phase: Phase, operation: &'static str) -> Self {
		ControllerError::IllegalTransition { phase, operation }
	}

	/// Map a failure on the upload path, where a rejection means the graph was bad.
	pub fn from_upload(err: ServiceError) -> Self {
		match err {
			ServiceError::Rejected(reason) => ControllerError::InvalidGraphFormat(reason),
			other => other.into(),
		}
	}
}

impl From<ServiceError> for ControllerError {
	fn from(err: ServiceError) -> Self {
		ControllerError::ServiceUnavailable(err.to_string())
	}
}

impl From<GraphFormatError> for ControllerError {
	fn from(err: GraphFormatError) -> Self {
		ControllerError::InvalidGraphFormat(err.to_string())
	}
}
