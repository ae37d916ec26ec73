//! Simulated streaming consumer that authenticates with JWT-SVIDs from a SPIFFE Workload API
//! agent.
//!
//! Usage: `cargo run --example consumer --features spiffe,tracing -- <bootstrap-servers> <topic>
//! <principal> <socket-path>`
//!
//! The broker client is simulated by a task that emits message, error, refresh, and other events.
//! Every refresh event is answered by [`RefreshCoordinator::handle_refresh`], which fetches a
//! JWT-SVID from the agent at `<socket-path>` and installs it on the consumer handle, or reports
//! why none is available. Ctrl-C stops the loop.

// std
use std::{
	env,
	sync::{Arc, Mutex, PoisonError},
	time::Duration as StdDuration,
};
// crates.io
use color_eyre::{Result, eyre::eyre};
use time::OffsetDateTime;
use tokio::{signal, sync::mpsc, time::interval};
// self
use workload_bearer::{
	auth::{Audience, BearerToken, Extensions, PrincipalId},
	coordinator::{CoordinatorConfig, RefreshCoordinator, RefreshRequest},
	provider::{ProviderAddress, WorkloadApiProvider},
	sink::{RefreshOutcome, TokenRejected, TokenSink},
};

const AUDIENCES: [&str; 2] = ["audience1", "audience2"];

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt::init();

	let args = env::args().skip(1).collect::<Vec<_>>();
	let [bootstrap_servers, topic, principal, socket_path] = args.as_slice() else {
		return Err(eyre!(
			"usage: consumer <bootstrap-servers> <topic> <principal> <socket-path>"
		));
	};
	let request = RefreshRequest::new(
		PrincipalId::new(principal.as_str())?,
		ProviderAddress::parse(socket_path)?,
		AUDIENCES.iter().map(|aud| Audience::new(*aud)).collect::<Result<Vec<_>, _>>()?,
	)?;
	let extensions =
		Extensions::new([("logicalCluster", "lkc-0yoqvq"), ("identityPoolId", "pool-W9j5")])?;
	let coordinator = RefreshCoordinator::new(
		Arc::new(WorkloadApiProvider),
		CoordinatorConfig::default().with_extensions(extensions),
	)?;
	let consumer = Arc::new(ConsumerHandle::default());
	let (events_tx, mut events_rx) = mpsc::channel(16);
	let broker = tokio::spawn(simulate_broker(topic.clone(), consumer.clone(), events_tx));

	tracing::info!(%bootstrap_servers, %topic, address = %request.address(), "consumer started");

	loop {
		tokio::select! {
			_ = signal::ctrl_c() => {
				tracing::info!("shutdown requested");

				break;
			},
			event = events_rx.recv() => match event {
				Some(ClientEvent::Message { topic, offset, payload }) =>
					tracing::info!(%topic, offset, %payload, "message received"),
				Some(ClientEvent::Error(reason)) => tracing::warn!(%reason, "client error"),
				Some(ClientEvent::TokenRefresh) =>
					match coordinator.handle_refresh(&request, &consumer).await {
						RefreshOutcome::Delivered { expires_at } =>
							tracing::info!(%expires_at, "token installed"),
						RefreshOutcome::Failed { reason } =>
							tracing::warn!(%reason, "token refresh failed"),
					},
				Some(ClientEvent::Other(name)) => tracing::debug!(%name, "ignored event"),
				None => break,
			},
		}
	}

	broker.abort();

	let metrics = &coordinator.metrics;

	tracing::info!(
		attempts = metrics.attempts(),
		successes = metrics.successes(),
		failures = metrics.failures(),
		"consumer stopped"
	);

	Ok(())
}

/// Events a streaming client surfaces from its poll loop.
#[derive(Debug)]
enum ClientEvent {
	Message { topic: String, offset: u64, payload: String },
	Error(String),
	TokenRefresh,
	Other(&'static str),
}

/// Client-side token slot, standing in for the broker library's OAUTHBEARER callbacks.
#[derive(Debug, Default)]
struct ConsumerHandle {
	token: Mutex<Option<BearerToken>>,
	last_failure: Mutex<Option<String>>,
}
impl ConsumerHandle {
	fn needs_refresh(&self, now: OffsetDateTime) -> bool {
		self.token
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.is_none_or(|token| now >= token.refresh_at())
	}

	fn take_failure(&self) -> Option<String> {
		self.last_failure.lock().unwrap_or_else(PoisonError::into_inner).take()
	}
}
impl TokenSink for ConsumerHandle {
	fn set_token(&self, token: BearerToken) -> Result<(), TokenRejected> {
		if token.extensions().get("logicalCluster").is_none() {
			return Err(TokenRejected::new("logicalCluster extension is required"));
		}

		*self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);

		Ok(())
	}

	fn set_token_failure(&self, reason: &str) {
		*self.last_failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_owned());
	}
}

/// Emits a refresh whenever the installed token reaches its refresh point, messages otherwise.
async fn simulate_broker(
	topic: String,
	consumer: Arc<ConsumerHandle>,
	events: mpsc::Sender<ClientEvent>,
) {
	let mut ticker = interval(StdDuration::from_millis(500));
	let mut offset = 0;

	loop {
		ticker.tick().await;

		let event = if let Some(reason) = consumer.take_failure() {
			ClientEvent::Error(format!("SASL authentication unavailable: {reason}"))
		} else if consumer.needs_refresh(OffsetDateTime::now_utc()) {
			ClientEvent::TokenRefresh
		} else if offset % 8 == 7 {
			offset += 1;

			ClientEvent::Other("partition rebalance")
		} else {
			offset += 1;

			ClientEvent::Message {
				topic: topic.clone(),
				offset,
				payload: format!("record-{offset}"),
			}
		};

		if events.send(event).await.is_err() {
			return;
		}
	}
}
