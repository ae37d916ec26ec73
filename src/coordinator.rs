//! Refresh coordination: bounded-time credential fetches and the success/failure bridge.
//!
//! [`RefreshCoordinator::handle_refresh`] is what a client's poll loop calls whenever it raises
//! a token-refresh event (at startup, and again once ~80% of the previous token's lifetime has
//! elapsed). Each call opens a scoped provider connection, requests one credential for the
//! request's principal and first audience, and settles by calling exactly one of the
//! [`TokenSink`] callbacks. A single deadline covers connecting and fetching; when it fires the
//! in-flight future is dropped, which closes the connection, and the client is told the provider
//! is unreachable.
//!
//! The coordinator spawns nothing and keeps no per-refresh state between calls. Concurrent calls
//! run independently; only the optional [`TokenCache`] is shared.

mod cache;
mod metrics;
mod request;

pub use cache::TokenCache;
pub use metrics::RefreshMetrics;
pub use request::RefreshRequest;

// crates.io
use tokio::runtime::{Handle, RuntimeFlavor};
// self
use crate::{
	_prelude::*,
	auth::{BearerToken, Extensions},
	error::ConfigError,
	obs::{self, RefreshOutcomeLabel, RefreshPhase, RefreshSpan},
	provider::{IdentityProvider, ProviderError, ScopedConnection},
	sink::{RefreshOutcome, TokenSink},
};

/// Construction-time settings for a [`RefreshCoordinator`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
	/// Deadline covering connection setup and credential fetch.
	#[serde(rename = "fetch_timeout_ms", with = "duration_ms")]
	pub fetch_timeout: StdDuration,
	/// Extension attributes attached to every token (cluster or identity-pool hints).
	pub extensions: Extensions,
	/// Reuse tokens that have not yet reached their refresh point.
	pub cache_tokens: bool,
}
impl CoordinatorConfig {
	/// Default fetch deadline.
	pub const DEFAULT_FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(1);

	/// Overrides the fetch deadline.
	pub fn with_fetch_timeout(mut self, timeout: StdDuration) -> Self {
		self.fetch_timeout = timeout;

		self
	}

	/// Replaces the extension attributes.
	pub fn with_extensions(mut self, extensions: Extensions) -> Self {
		self.extensions = extensions;

		self
	}

	/// Enables or disables the token cache.
	pub fn with_cache(mut self, enabled: bool) -> Self {
		self.cache_tokens = enabled;

		self
	}

	/// Checks invariants that cannot be expressed in the field types.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.fetch_timeout.is_zero() {
			return Err(ConfigError::ZeroFetchTimeout);
		}

		Ok(())
	}
}
impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self {
			fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
			extensions: Extensions::default(),
			cache_tokens: false,
		}
	}
}

/// Keeps a client's bearer token valid by fetching workload-identity credentials on demand.
pub struct RefreshCoordinator<P>
where
	P: ?Sized + IdentityProvider,
{
	/// Identity provider used for every fetch.
	pub provider: Arc<P>,
	/// Counters for refresh outcomes.
	pub metrics: Arc<RefreshMetrics>,
	config: CoordinatorConfig,
	cache: Option<TokenCache>,
}
impl<P> RefreshCoordinator<P>
where
	P: ?Sized + IdentityProvider,
{
	/// Creates a coordinator after validating `config`.
	pub fn new(provider: Arc<P>, config: CoordinatorConfig) -> Result<Self, ConfigError> {
		config.validate()?;

		let cache = config.cache_tokens.then(TokenCache::default);

		Ok(Self { provider, metrics: Default::default(), config, cache })
	}

	/// Active configuration.
	pub fn config(&self) -> &CoordinatorConfig {
		&self.config
	}

	/// Token cache, when enabled.
	pub fn cache(&self) -> Option<&TokenCache> {
		self.cache.as_ref()
	}

	/// Serves one refresh event: fetches a token and hands it (or the failure) to `sink`.
	///
	/// Exactly one of [`TokenSink::set_token`] or [`TokenSink::set_token_failure`] is called,
	/// except when the client rejects a token in `set_token`, in which case the rejection is
	/// reported back through `set_token_failure`.
	pub async fn handle_refresh<S>(&self, request: &RefreshRequest, sink: &S) -> RefreshOutcome
	where
		S: ?Sized + TokenSink,
	{
		let result = self.fetch_token(request).await;

		self.settle(result, sink)
	}

	/// Fetches a fresh token (or a cached one, when the cache is enabled and still active).
	///
	/// Must run inside a tokio runtime with the time driver enabled.
	pub async fn fetch_token(&self, request: &RefreshRequest) -> Result<BearerToken> {
		let span = RefreshSpan::new("fetch_token", request.principal());
		let started = OffsetDateTime::now_utc();

		obs::record_refresh_outcome(RefreshOutcomeLabel::Attempt);
		self.metrics.record_attempt();

		if let Some(token) = self.cache.as_ref().and_then(|cache| cache.lookup(request, started)) {
			self.metrics.record_cache_hit();
			self.metrics.record_success();
			obs::record_refresh_outcome(RefreshOutcomeLabel::Success);

			return Ok(token);
		}

		let phase = PhaseTracker::default();
		let result = span
			.instrument(async {
				let deadline = self.config.fetch_timeout;
				let result =
					match tokio::time::timeout(deadline, self.fetch_once(request, started, &phase))
						.await
					{
						Ok(result) => result,
						Err(_) => Err(Error::ProviderUnreachable {
							address: request.address().to_string(),
							phase: phase.current(),
							reason: format!("deadline of {}ms exceeded", deadline.as_millis()),
							timed_out: true,
						}),
					};

				match &result {
					Ok(_) => phase.advance(RefreshPhase::Delivered),
					Err(err) => {
						obs::record_failure(phase.current(), &err.to_string());
						phase.advance(RefreshPhase::Failed);
					},
				}

				result
			})
			.await;

		match &result {
			Ok(token) => {
				if let Some(cache) = &self.cache {
					cache.store(request, token);
				}

				self.metrics.record_success();
				obs::record_refresh_outcome(RefreshOutcomeLabel::Success);
			},
			Err(err) => {
				if err.is_timeout() {
					self.metrics.record_timeout();
					obs::record_refresh_outcome(RefreshOutcomeLabel::Timeout);
				}

				self.metrics.record_failure();
				obs::record_refresh_outcome(RefreshOutcomeLabel::Failure);
			},
		}

		result
	}

	/// Blocking variant of [`RefreshCoordinator::handle_refresh`] for clients whose refresh
	/// callback is synchronous.
	///
	/// See [`RefreshCoordinator::fetch_token_blocking`] for how the fetch is driven.
	pub fn handle_refresh_blocking<S>(&self, request: &RefreshRequest, sink: &S) -> RefreshOutcome
	where
		S: ?Sized + TokenSink,
	{
		let result = self.fetch_token_blocking(request);

		self.settle(result, sink)
	}

	/// Blocking variant of [`RefreshCoordinator::fetch_token`].
	///
	/// Outside any runtime the fetch runs on a private current-thread runtime. On a multi-thread
	/// runtime worker it runs in place on the ambient runtime. A current-thread runtime cannot
	/// be parked, so the call fails with [`Error::BlockingInAsyncContext`] there.
	pub fn fetch_token_blocking(&self, request: &RefreshRequest) -> Result<BearerToken> {
		match Handle::try_current() {
			Ok(handle) => match handle.runtime_flavor() {
				RuntimeFlavor::MultiThread =>
					tokio::task::block_in_place(|| handle.block_on(self.fetch_token(request))),
				_ => Err(Error::BlockingInAsyncContext),
			},
			Err(_) => {
				let runtime = tokio::runtime::Builder::new_current_thread()
					.enable_all()
					.build()
					.map_err(Error::Runtime)?;

				runtime.block_on(self.fetch_token(request))
			},
		}
	}

	async fn fetch_once(
		&self,
		request: &RefreshRequest,
		started: OffsetDateTime,
		phase: &PhaseTracker,
	) -> Result<BearerToken> {
		let address = request.address();

		phase.advance(RefreshPhase::Connecting);

		let connection =
			self.provider.connect(address).await.map_err(|e| Error::ProviderUnreachable {
				address: address.to_string(),
				phase: RefreshPhase::Connecting,
				reason: format!("unable to create provider connection: {e}"),
				timed_out: false,
			})?;
		let mut connection = ScopedConnection::new(connection);

		phase.advance(RefreshPhase::Fetching);

		let fetched = connection.fetch_credential(request.principal(), request.audience()).await;

		connection.release();

		let credential = fetched.map_err(|e| map_fetch_error(request, e))?;

		if credential.expires_at <= started {
			return Err(Error::CredentialFetchFailed {
				reason: format!("credential already expired at {}", credential.expires_at),
			});
		}

		BearerToken::builder(request.principal().clone())
			.value(credential.token.into_exposed())
			.expires_at(credential.expires_at)
			.extensions(self.config.extensions.clone())
			.build()
			.map_err(|e| Error::CredentialFetchFailed { reason: e.to_string() })
	}

	fn settle<S>(&self, result: Result<BearerToken>, sink: &S) -> RefreshOutcome
	where
		S: ?Sized + TokenSink,
	{
		match result {
			Ok(token) => {
				let expires_at = token.expires_at();

				match sink.set_token(token) {
					Ok(()) => RefreshOutcome::Delivered { expires_at },
					Err(rejected) => {
						let reason = rejected.to_string();

						obs::record_failure(RefreshPhase::Delivered, &reason);
						sink.set_token_failure(&reason);

						RefreshOutcome::Failed { reason }
					},
				}
			},
			Err(err) => {
				let reason = err.to_string();

				sink.set_token_failure(&reason);

				RefreshOutcome::Failed { reason }
			},
		}
	}
}
impl<P> Debug for RefreshCoordinator<P>
where
	P: ?Sized + IdentityProvider,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("config", &self.config)
			.field("metrics", &self.metrics)
			.field("cache_enabled", &self.cache.is_some())
			.finish()
	}
}

#[derive(Debug)]
struct PhaseTracker(Mutex<RefreshPhase>);
impl PhaseTracker {
	fn current(&self) -> RefreshPhase {
		*self.0.lock()
	}

	fn advance(&self, next: RefreshPhase) {
		*self.0.lock() = next;

		obs::record_phase(next);
	}
}
impl Default for PhaseTracker {
	fn default() -> Self {
		Self(Mutex::new(RefreshPhase::Idle))
	}
}

fn map_fetch_error(request: &RefreshRequest, e: ProviderError) -> Error {
	let reason = format!("unable to fetch credential: {e}");

	if e.is_transport() {
		Error::ProviderUnreachable {
			address: request.address().to_string(),
			phase: RefreshPhase::Fetching,
			reason,
			timed_out: false,
		}
	} else {
		Error::CredentialFetchFailed { reason }
	}
}

mod duration_ms {
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &StdDuration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<StdDuration, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(StdDuration::from_millis)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, auth::TokenStatus};

	#[tokio::test]
	async fn delivers_token_with_configured_extensions() {
		let provider = Arc::new(MockProvider::issuing("tok123", Duration::hours(1)));
		let coordinator = build_test_coordinator(provider.clone(), StdDuration::from_secs(1));
		let sink = RecordingSink::default();
		let started = OffsetDateTime::now_utc();
		let outcome =
			coordinator.handle_refresh(&test_request("svc-a", &["aud1", "aud2"]), &sink).await;

		assert!(outcome.is_delivered());

		let token = sink.last_token().expect("Sink should have received a token.");

		assert_eq!(token.value().expose(), "tok123");
		assert_eq!(token.principal().as_str(), "svc-a");
		assert!(token.expires_at() > started);
		assert_eq!(token.extensions().get("logicalCluster"), Some("lkc-0yoqvq"));
		assert_eq!(token.extensions().get("identityPoolId"), Some("pool-W9j5"));
		assert_eq!(provider.requested_audiences(), vec!["aud1".to_owned()]);
		assert_eq!(provider.releases(), 1);
		assert!(sink.failures().is_empty());
	}

	#[tokio::test]
	async fn rejected_credential_is_reported_as_fetch_failure() {
		let provider = Arc::new(MockProvider::new(MockBehavior::Reject("attestation failed")));
		let coordinator = build_test_coordinator(provider.clone(), StdDuration::from_secs(1));
		let err = coordinator
			.fetch_token(&test_request("svc-a", &["aud1"]))
			.await
			.expect_err("Rejected credential must fail.");

		assert!(matches!(err, Error::CredentialFetchFailed { .. }));
		assert!(err.to_string().contains("unable to fetch credential: attestation failed"));
		assert_eq!(provider.releases(), 1);
		assert_eq!(coordinator.metrics.failures(), 1);
	}

	#[tokio::test]
	async fn already_expired_credential_is_never_delivered() {
		let provider = Arc::new(MockProvider::issuing("old", Duration::seconds(-5)));
		let coordinator = build_test_coordinator(provider.clone(), StdDuration::from_secs(1));
		let sink = RecordingSink::default();
		let outcome = coordinator.handle_refresh(&test_request("svc-a", &["aud1"]), &sink).await;

		assert!(!outcome.is_delivered());
		assert!(sink.last_token().is_none());
		assert_eq!(sink.failures().len(), 1);
		assert!(sink.failures()[0].contains("already expired"));
	}

	#[tokio::test]
	async fn client_rejection_falls_back_to_failure_callback() {
		let provider = Arc::new(MockProvider::issuing("tok123", Duration::hours(1)));
		let coordinator = build_test_coordinator(provider, StdDuration::from_secs(1));
		let sink = RecordingSink::rejecting("invalid extension");
		let outcome = coordinator.handle_refresh(&test_request("svc-a", &["aud1"]), &sink).await;

		assert_eq!(
			outcome,
			RefreshOutcome::Failed {
				reason: "Client rejected the token: invalid extension.".into()
			}
		);
		assert_eq!(
			sink.failures(),
			vec!["Client rejected the token: invalid extension.".to_owned()]
		);
	}

	#[tokio::test]
	async fn deadline_covers_connection_setup() {
		let provider = Arc::new(MockProvider::new(MockBehavior::HangOnConnect));
		let coordinator = build_test_coordinator(provider.clone(), StdDuration::from_millis(50));
		let err = coordinator
			.fetch_token(&test_request("svc-a", &["aud1"]))
			.await
			.expect_err("Hanging connect must time out.");

		assert!(err.is_timeout());
		assert!(matches!(
			err,
			Error::ProviderUnreachable { phase: RefreshPhase::Connecting, timed_out: true, .. }
		));
		assert_eq!(provider.connections(), 0);
		assert_eq!(provider.releases(), 0);
		assert_eq!(coordinator.metrics.timeouts(), 1);
	}

	#[tokio::test]
	async fn cache_serves_active_tokens_only_when_enabled() {
		let provider = Arc::new(MockProvider::issuing("tok", Duration::hours(1)));
		let config = CoordinatorConfig::default().with_cache(true);
		let coordinator =
			RefreshCoordinator::new(provider.clone(), config).expect("Config should be valid.");
		let request = test_request("svc-a", &["aud1"]);
		let first = coordinator.fetch_token(&request).await.expect("First fetch should succeed.");
		let second = coordinator.fetch_token(&request).await.expect("Cached fetch should succeed.");

		assert_eq!(first.expires_at(), second.expires_at());
		assert_eq!(second.status_at(OffsetDateTime::now_utc()), TokenStatus::Active);
		assert_eq!(provider.connections(), 1);
		assert_eq!(coordinator.metrics.cache_hits(), 1);
		assert_eq!(coordinator.metrics.successes(), 2);
	}

	#[test]
	fn config_rejects_zero_timeout_and_reads_millis() {
		let provider = Arc::new(MockProvider::issuing("tok", Duration::hours(1)));
		let err = RefreshCoordinator::new(
			provider,
			CoordinatorConfig::default().with_fetch_timeout(StdDuration::ZERO),
		)
		.expect_err("Zero timeout must be rejected.");

		assert_eq!(err, ConfigError::ZeroFetchTimeout);

		let config: CoordinatorConfig = serde_json::from_str(
			r#"{"fetch_timeout_ms":250,"extensions":{"logicalCluster":"lkc-0yoqvq"}}"#,
		)
		.expect("Config should deserialize.");

		assert_eq!(config.fetch_timeout, StdDuration::from_millis(250));
		assert_eq!(config.extensions.get("logicalCluster"), Some("lkc-0yoqvq"));
		assert!(!config.cache_tokens);
	}

	#[test]
	fn blocking_bridge_matches_async_behavior() {
		let provider = Arc::new(MockProvider::issuing("tok123", Duration::minutes(10)));
		let coordinator = build_test_coordinator(provider.clone(), StdDuration::from_secs(1));
		let sink = RecordingSink::default();
		let outcome =
			coordinator.handle_refresh_blocking(&test_request("svc-a", &["aud1"]), &sink);

		assert!(outcome.is_delivered());
		assert_eq!(sink.tokens().len(), 1);
		assert_eq!(provider.releases(), 1);
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn blocking_bridge_runs_in_place_on_multi_thread_runtime() {
		let provider = Arc::new(MockProvider::issuing("tok123", Duration::minutes(10)));
		let coordinator = build_test_coordinator(provider.clone(), StdDuration::from_secs(1));
		let sink = RecordingSink::default();
		let outcome =
			coordinator.handle_refresh_blocking(&test_request("svc-a", &["aud1"]), &sink);

		assert!(outcome.is_delivered());
		assert_eq!(sink.tokens().len(), 1);
		assert_eq!(provider.releases(), 1);
	}

	#[tokio::test]
	async fn blocking_bridge_reports_current_thread_runtime_as_failure() {
		let provider = Arc::new(MockProvider::issuing("tok123", Duration::minutes(10)));
		let coordinator = build_test_coordinator(provider.clone(), StdDuration::from_secs(1));
		let sink = RecordingSink::default();
		let outcome =
			coordinator.handle_refresh_blocking(&test_request("svc-a", &["aud1"]), &sink);

		assert_eq!(
			outcome,
			RefreshOutcome::Failed { reason: Error::BlockingInAsyncContext.to_string() }
		);
		assert!(sink.tokens().is_empty());
		assert_eq!(sink.failures().len(), 1);
		assert_eq!(provider.connect_attempts(), 0);
	}
}
