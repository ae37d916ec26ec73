//! Optional observability helpers for refresh invocations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `workload_bearer.refresh` with the `stage`
//!   (call site) field, plus `tracing` events for every phase transition.
//! - Enable `metrics` to increment the `workload_bearer_refresh_total` counter for every
//!   attempt/success/failure/timeout, labeled by `outcome`.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Per-invocation refresh state machine.
///
/// `Idle → Connecting → Fetching → {Delivered | Failed}`. Both `Connecting` and `Fetching`
/// share the single fetch deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshPhase {
	/// Refresh requested but no work started.
	Idle,
	/// Establishing the scoped provider connection.
	Connecting,
	/// Waiting for the provider to issue a credential.
	Fetching,
	/// Token handed to the client.
	Delivered,
	/// Failure reported to the client.
	Failed,
}
impl RefreshPhase {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshPhase::Idle => "idle",
			RefreshPhase::Connecting => "connecting",
			RefreshPhase::Fetching => "fetching",
			RefreshPhase::Delivered => "delivered",
			RefreshPhase::Failed => "failed",
		}
	}
}
impl Display for RefreshPhase {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshOutcomeLabel {
	/// Entry to the coordinator.
	Attempt,
	/// Token delivered (fetched or served from cache).
	Success,
	/// Failure reported back to the client.
	Failure,
	/// Failure caused by the fetch deadline.
	Timeout,
}
impl RefreshOutcomeLabel {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshOutcomeLabel::Attempt => "attempt",
			RefreshOutcomeLabel::Success => "success",
			RefreshOutcomeLabel::Failure => "failure",
			RefreshOutcomeLabel::Timeout => "timeout",
		}
	}
}
impl Display for RefreshOutcomeLabel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
