// self
use workload_bearer::{
	_preludet::*,
	coordinator::RefreshRequest,
	error::ConfigError,
	obs::RefreshPhase,
	sink::RefreshOutcome,
};

const DEADLINE: StdDuration = StdDuration::from_millis(100);

#[tokio::test]
async fn delivers_provider_token_for_first_audience() {
	let expires_at = OffsetDateTime::now_utc() + Duration::seconds(3600);
	let provider = Arc::new(MockProvider::issuing_until("tok123", expires_at));
	let coordinator = build_test_coordinator(provider.clone(), DEADLINE);
	let sink = RecordingSink::default();
	let outcome =
		coordinator.handle_refresh(&test_request("svc-a", &["aud1", "aud2"]), &sink).await;

	assert_eq!(outcome, RefreshOutcome::Delivered { expires_at });

	let token = sink.last_token().expect("Token should be delivered to the sink.");

	assert_eq!(token.value().expose(), "tok123");
	assert_eq!(token.expires_at(), expires_at);
	assert_eq!(token.principal().as_str(), "svc-a");
	assert_eq!(provider.requested_audiences(), vec!["aud1".to_owned()]);
	assert_eq!(provider.requested_principals(), vec!["svc-a".to_owned()]);
	assert_eq!(provider.releases(), 1);
	assert!(sink.failures().is_empty());
}

#[tokio::test]
async fn connection_error_reports_unable_to_create() {
	let provider = Arc::new(MockProvider::new(MockBehavior::ConnectError("no such file")));
	let coordinator = build_test_coordinator(provider.clone(), DEADLINE);
	let sink = RecordingSink::default();
	let outcome = coordinator.handle_refresh(&test_request("svc-a", &["aud1"]), &sink).await;

	assert!(!outcome.is_delivered());
	assert!(sink.tokens().is_empty());

	let failures = sink.failures();

	assert_eq!(failures.len(), 1);
	assert!(failures[0].contains("unable to create"), "Unexpected reason: {}", failures[0]);
	assert_eq!(provider.connections(), 0);
	assert_eq!(provider.releases(), 0);
}

#[tokio::test]
async fn unreachable_provider_never_yields_a_token() {
	for behavior in [
		MockBehavior::ConnectError("connection refused"),
		MockBehavior::FetchTransportError("stream closed"),
	] {
		let provider = Arc::new(MockProvider::new(behavior));
		let coordinator = build_test_coordinator(provider.clone(), DEADLINE);
		let err = coordinator
			.fetch_token(&test_request("svc-a", &["aud1"]))
			.await
			.expect_err("Unreachable provider must fail.");

		assert!(matches!(err, Error::ProviderUnreachable { .. }), "Unexpected error: {err:?}");
		assert!(err.is_recoverable());
		assert_eq!(provider.releases(), provider.connections());
	}
}

#[tokio::test]
async fn hanging_fetch_times_out_and_releases_once() {
	let provider = Arc::new(MockProvider::new(MockBehavior::HangOnFetch));
	let coordinator = build_test_coordinator(provider.clone(), DEADLINE);
	let sink = RecordingSink::default();
	let started = Instant::now();
	let outcome = coordinator.handle_refresh(&test_request("svc-a", &["aud1"]), &sink).await;
	let elapsed = started.elapsed();

	assert!(elapsed >= DEADLINE, "Returned before the deadline: {elapsed:?}");
	assert!(elapsed < DEADLINE + StdDuration::from_millis(500), "Deadline overrun: {elapsed:?}");
	assert!(!outcome.is_delivered());
	assert!(sink.tokens().is_empty());
	assert_eq!(provider.connections(), 1);
	assert_eq!(provider.releases(), 1);
	assert_eq!(coordinator.metrics.timeouts(), 1);

	let err = coordinator
		.fetch_token(&test_request("svc-a", &["aud1"]))
		.await
		.expect_err("Second hanging fetch must also time out.");

	assert!(matches!(err, Error::ProviderUnreachable { phase: RefreshPhase::Fetching, .. }));
	assert!(err.is_timeout());
	assert_eq!(provider.releases(), 2);
}

#[tokio::test]
async fn empty_audience_list_fails_before_any_network_call() {
	let provider = Arc::new(MockProvider::issuing("tok123", Duration::hours(1)));
	let _coordinator = build_test_coordinator(provider.clone(), DEADLINE);
	let empty: [&str; 0] = [];
	let err = RefreshRequest::parse("svc-a", TEST_SOCKET, &empty)
		.expect_err("Empty audience list must be rejected.");

	assert_eq!(err, ConfigError::EmptyAudienceList);
	assert!(!Error::from(err).is_recoverable());
	assert_eq!(provider.connect_attempts(), 0);
}

#[tokio::test]
async fn repeated_refreshes_never_move_expiry_backwards() {
	let provider = Arc::new(MockProvider::issuing("tok", Duration::hours(1)));
	let coordinator = build_test_coordinator(provider.clone(), DEADLINE);
	let request = test_request("svc-a", &["aud1", "aud2"]);
	let mut previous = None;

	for _ in 0..5 {
		let token = coordinator.fetch_token(&request).await.expect("Fetch should succeed.");

		if let Some(prev) = previous {
			assert!(
				token.expires_at() >= prev,
				"Expiry regressed from {prev} to {}.",
				token.expires_at()
			);
		}

		previous = Some(token.expires_at());
	}

	assert_eq!(provider.connections(), 5);
	assert_eq!(provider.releases(), 5);
	assert_eq!(coordinator.metrics.successes(), 5);
}

#[tokio::test]
async fn concurrent_refreshes_proceed_independently() {
	let provider = Arc::new(MockProvider::issuing("tok", Duration::hours(1)));
	let coordinator = build_test_coordinator(provider.clone(), DEADLINE);
	let sink = RecordingSink::default();
	let request = test_request("svc-a", &["aud1"]);
	let (first, second) = tokio::join!(
		coordinator.handle_refresh(&request, &sink),
		coordinator.handle_refresh(&request, &sink),
	);

	assert!(first.is_delivered());
	assert!(second.is_delivered());
	assert_eq!(sink.tokens().len(), 2);
	assert_eq!(provider.connections(), 2);
	assert_eq!(provider.releases(), 2);
}
