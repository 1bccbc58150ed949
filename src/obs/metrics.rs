// self
use crate::{
	cache::{RevertTarget, RollbackPolicy},
	obs::{FlowKind, FlowOutcome},
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_gateway_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records which snapshot a reverted mutation left published, labeled by rollback policy.
pub fn record_rollback(policy: RollbackPolicy, target: RevertTarget) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_gateway_mutation_rollback_total",
			"policy" => policy.as_str(),
			"restored" => target.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (policy, target);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_flow_outcome_noop_without_metrics() {
		record_flow_outcome(FlowKind::Mutation, FlowOutcome::Failure);
	}

	#[test]
	fn rollback_labels_are_stable() {
		record_rollback(RollbackPolicy::RestorePrevious, RevertTarget::Confirmed);

		assert_eq!(RollbackPolicy::RestorePrevious.as_str(), "restore_previous");
		assert_eq!(RollbackPolicy::Rebase.as_str(), "rebase");
		assert_eq!(RevertTarget::Previous.as_str(), "previous");
		assert_eq!(RevertTarget::Confirmed.as_str(), "confirmed");
		assert_eq!(RevertTarget::Projection.as_str(), "projection");
	}
}
