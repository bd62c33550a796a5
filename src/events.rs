//! Component C2 — fire-and-forget publisher of comparison records.
//!
//! Construction tolerates the event bus being unavailable at startup: up to
//! 30 connection attempts, 2s fixed backoff between them
//! (`original_source/.../services/kafka.go`'s retry loop). If every attempt
//! fails, [`EventEmitter::connect`] returns the [`EventEmitter::Null`]
//! variant instead of an error — the gateway must still serve legacy-only
//! traffic with no event bus at all. Once constructed, `emit` failures are
//! logged and swallowed, never surfaced to the request path.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;

const TOPIC: &str = "shadow-requests";
const MAX_CONNECT_ATTEMPTS: u32 = 30;
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Component C2. The `Null` variant is a real enum case, not an `Option`
/// wrapper — every call site sees the same `emit` surface whether or not a
/// broker is actually reachable, the same way the teacher hides "no adapter
/// needed" behind `BackendClient`'s enum dispatch (`src/backends/mod.rs`).
pub enum EventEmitter {
    Kafka(FutureProducer),
    Null,
}

impl EventEmitter {
    /// Attempt to connect to `bootstrap_servers`, retrying per the policy
    /// above. Returns `Null` (never an error) if every attempt fails or no
    /// bootstrap servers were configured at all.
    pub async fn connect(bootstrap_servers: Option<&str>) -> Self {
        let Some(bootstrap_servers) = bootstrap_servers else {
            tracing::warn!("KAFKA_BOOTSTRAP_SERVERS not set — event emission disabled");
            return Self::Null;
        };

        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            match ClientConfig::new()
                .set("bootstrap.servers", bootstrap_servers)
                .set("message.timeout.ms", "5000")
                .create::<FutureProducer>()
            {
                Ok(producer) => {
                    tracing::info!(attempt, "event bus producer connected");
                    return Self::Kafka(producer);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = MAX_CONNECT_ATTEMPTS,
                        error = %e,
                        "failed to create event bus producer — retrying"
                    );
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                }
            }
        }

        tracing::error!(
            attempts = MAX_CONNECT_ATTEMPTS,
            "event bus unreachable after all retries — emission disabled"
        );
        Self::Null
    }

    /// Publish `record` to the fixed `shadow-requests` topic. Fire-and-forget:
    /// the publish runs on its own task and its outcome is only logged, never
    /// propagated to the caller.
    pub fn emit<T: Serialize + Send + 'static>(&self, record: T) {
        let producer = match self {
            Self::Kafka(p) => p.clone(),
            Self::Null => return,
        };

        let payload = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize comparison record — dropping");
                return;
            }
        };

        tokio::spawn(async move {
            let record = FutureRecord::to(TOPIC).payload(&payload).key("");
            if let Err((e, _)) = producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
                tracing::warn!(error = %e, "failed to publish comparison event");
            }
        });
    }

    /// Best-effort flush of any outstanding messages. Called once at shutdown.
    pub fn shutdown(&self) {
        if let Self::Kafka(producer) = self {
            if let Err(e) = producer.flush(Duration::from_secs(5)) {
                tracing::warn!(error = %e, "event bus flush on shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_with_no_bootstrap_servers_is_null() {
        let emitter = EventEmitter::connect(None).await;
        assert!(matches!(emitter, EventEmitter::Null));
    }

    #[tokio::test]
    async fn emit_on_null_emitter_never_panics() {
        let emitter = EventEmitter::connect(None).await;
        emitter.emit(serde_json::json!({ "transaction_id": "abc" }));
        // No broker, no task spawned, nothing to await — this is the point.
    }

    #[test]
    fn shutdown_on_null_emitter_is_a_no_op() {
        let emitter = EventEmitter::Null;
        emitter.shutdown();
    }
}
