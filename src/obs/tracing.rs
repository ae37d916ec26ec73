// self
use crate::{_prelude::*, obs::RefreshPhase};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRefresh<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRefresh<F> = F;

/// A span builder used by the coordinator.
#[derive(Clone, Debug)]
pub struct RefreshSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RefreshSpan {
	/// Creates a new span tagged with the call-site stage and the requesting principal.
	pub fn new(stage: &'static str, principal: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("workload_bearer.refresh", stage, principal);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, principal);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRefresh<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a phase transition event inside the current span.
pub fn record_phase(phase: RefreshPhase) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(phase = phase.as_str(), "refresh phase changed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = phase;
	}
}

/// Emits a failure event carrying the reason that is handed to the client.
pub fn record_failure(phase: RefreshPhase, reason: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(phase = phase.as_str(), reason, "token refresh failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (phase, reason);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn phase_hooks_noop_without_subscriber() {
		record_phase(RefreshPhase::Connecting);
		record_failure(RefreshPhase::Failed, "unable to create connection");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = RefreshSpan::new("instrument_wraps_future", "svc-a");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
