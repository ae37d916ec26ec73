// self
use crate::obs::RefreshOutcomeLabel;

/// Records a refresh outcome via the global metrics recorder (when enabled).
pub fn record_refresh_outcome(outcome: RefreshOutcomeLabel) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("workload_bearer_refresh_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}
