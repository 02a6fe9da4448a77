//! Population network: wire types and the live node/edge set the view is drawn from.

mod model;
mod types;

pub use model::{
	GraphModel, LiveEdge, LiveNode, MergeReport, Pin, PinKind, SharedGraph, node_radius,
};
pub use types::{Edge, GraphFormatError, HealthStatus, Node, NodeId, Snapshot, StatusCounts};
