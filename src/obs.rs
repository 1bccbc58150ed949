//! Optional observability helpers for gateway flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `session_gateway.flow` with the `flow` and
//!   `stage` fields, plus a `warn` event whenever a session is terminated.
//! - Enable `metrics` to increment the `session_gateway_flow_total` counter for every outcome,
//!   labeled by `flow` + `outcome`, and `session_gateway_mutation_rollback_total` for every
//!   reverted mutation, labeled by `policy` + `restored`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flows observed by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authenticated request dispatch.
	Request,
	/// Credential renewal (initiated or joined).
	Refresh,
	/// Login exchange.
	Login,
	/// Optimistic resource mutation.
	Mutation,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Request => "request",
			FlowKind::Refresh => "refresh",
			FlowKind::Login => "login",
			FlowKind::Mutation => "mutation",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a gateway helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Caller joined a renewal that was already in flight.
	Coalesced,
	/// Optimistic state was reverted after a failed remote call.
	RolledBack,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Coalesced => "coalesced",
			FlowOutcome::RolledBack => "rolled_back",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
