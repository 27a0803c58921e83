//! State publisher: outbound half of the hub channel.
//!
//! Keeps the hub's view of extension state eventually consistent:
//!   - a background loop snapshots state every `state_interval` and publishes
//!     only when the serialized form changed since the last publish
//!   - `publish_state` forces a push (used right after boot)
//!   - ad-hoc events are dropped once the last ping is older than
//!     `ping_timeout`
//!   - every transport write goes through one lock, so payloads never
//!     interleave

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::events::Event;
use crate::hub::HubTransport;
use crate::liveness::{now_millis, LivenessTracker};
use crate::types::RuntimeConfig;

/// Floor applied to a zero `state_interval`.
const MIN_STATE_INTERVAL: Duration = Duration::from_millis(1);

/// Produces the current extension state.
pub type StateProvider = Arc<dyn Fn() -> Value + Send + Sync>;

/// Outbound event publisher.
pub struct Publisher {
    transport: Arc<dyn HubTransport>,
    state: StateProvider,
    liveness: Arc<LivenessTracker>,
    /// Serialized form of the last state event the hub accepted.
    last_state: Mutex<Option<String>>,
    write_lock: tokio::sync::Mutex<()>,
    state_interval: Duration,
    ping_timeout: Duration,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("transport", &self.transport)
            .field("liveness", &self.liveness)
            .field("state_interval", &self.state_interval)
            .field("ping_timeout", &self.ping_timeout)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Create a publisher without side effects. See [`Publisher::start`].
    pub fn new(
        transport: Arc<dyn HubTransport>,
        state: StateProvider,
        liveness: Arc<LivenessTracker>,
        config: &RuntimeConfig,
    ) -> Self {
        let state_interval = if config.state_interval.is_zero() {
            tracing::warn!(
                "state_interval of zero is not usable, using {}ms",
                MIN_STATE_INTERVAL.as_millis()
            );
            MIN_STATE_INTERVAL
        } else {
            config.state_interval
        };
        Self {
            transport,
            state,
            liveness,
            last_state: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
            state_interval,
            ping_timeout: config.ping_timeout,
        }
    }

    /// Announce the extension with `init` (not gated) and spawn the diff loop.
    pub async fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        match Event::init().to_payload() {
            Ok(payload) => {
                self.transmit(payload).await;
            }
            Err(e) => tracing::error!("init_encode_failed: {}", e),
        }

        let publisher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(publisher.state_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first
            // snapshot happens one interval after start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                publisher.publish_state_if_changed().await;
            }
        })
    }

    fn snapshot(&self) -> Option<(Event, String)> {
        let event = Event::state((self.state)());
        match event.to_payload() {
            Ok(payload) => Some((event, payload)),
            Err(e) => {
                tracing::warn!("state_encode_failed: {}", e);
                None
            }
        }
    }

    fn remember(&self, payload: String) {
        *self.last_state.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload);
    }

    /// Force a state push, bypassing the diff check.
    pub async fn publish_state(&self) -> bool {
        let Some((event, payload)) = self.snapshot() else {
            return false;
        };
        tracing::debug!("Forced state publish");
        let sent = self.publish_payload(event.event_type(), payload.clone()).await;
        if sent {
            self.remember(payload);
        }
        sent
    }

    /// One diff-loop step: publish only if the serialized state differs from
    /// the last state the hub accepted. Returns true when it was delivered.
    pub async fn publish_state_if_changed(&self) -> bool {
        let Some((event, payload)) = self.snapshot() else {
            return false;
        };
        let unchanged = self
            .last_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(payload.as_str());
        if unchanged {
            return false;
        }
        tracing::debug!("State changed, publishing");
        let sent = self.publish_payload(event.event_type(), payload.clone()).await;
        if sent {
            self.remember(payload);
        }
        sent
    }

    /// Publish an ad-hoc event unless the hub is presumed gone.
    /// Returns whether the hub accepted the event.
    pub async fn publish_event(&self, event: &Event) -> bool {
        match event.to_payload() {
            Ok(payload) => self.publish_payload(event.event_type(), payload).await,
            Err(e) => {
                tracing::warn!("event_encode_failed type={}: {}", event.event_type(), e);
                false
            }
        }
    }

    async fn publish_payload(&self, event_type: &str, payload: String) -> bool {
        if self.is_suppressed() {
            tracing::debug!("Dropping {} event: last ping is stale", event_type);
            return false;
        }
        self.transmit(payload).await
    }

    /// True when the liveness gate is closed.
    pub fn is_suppressed(&self) -> bool {
        let threshold = i64::try_from(self.ping_timeout.as_millis()).unwrap_or(i64::MAX);
        self.liveness.is_stale(now_millis(), threshold)
    }

    /// Record an inbound ping, reopening the gate.
    pub fn record_ping(&self) {
        self.liveness.record(now_millis());
    }

    /// Answer a ping with `pong`, bypassing the gate.
    pub async fn send_pong(&self) -> bool {
        match Event::pong().to_payload() {
            Ok(payload) => self.transmit(payload).await,
            Err(e) => {
                tracing::error!("pong_encode_failed: {}", e);
                false
            }
        }
    }

    /// Record the ping and answer with `pong`.
    pub async fn on_ping(&self) -> bool {
        self.record_ping();
        self.send_pong().await
    }

    /// Hand one payload to the transport under the write lock. Failures are
    /// logged and not retried; state catches up on the next diff tick.
    async fn transmit(&self, payload: String) -> bool {
        let _guard = self.write_lock.lock().await;
        match self.transport.publish(payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("publish_failed: {}", e);
                false
            }
        }
    }

    pub fn liveness(&self) -> &Arc<LivenessTracker> {
        &self.liveness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::MemoryTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn publisher_with(
        transport: &Arc<MemoryTransport>,
        state: StateProvider,
    ) -> (Arc<Publisher>, Arc<LivenessTracker>) {
        let liveness = Arc::new(LivenessTracker::new());
        let hub: Arc<dyn HubTransport> = transport.clone();
        let publisher = Arc::new(Publisher::new(
            hub,
            state,
            Arc::clone(&liveness),
            &RuntimeConfig::default(),
        ));
        (publisher, liveness)
    }

    fn counter_state() -> (StateProvider, Arc<AtomicI64>) {
        let counter = Arc::new(AtomicI64::new(0));
        let c = Arc::clone(&counter);
        let state: StateProvider = Arc::new(move || json!({"count": c.load(Ordering::SeqCst)}));
        (state, counter)
    }

    // =========================================================================
    // Diff suppression
    // =========================================================================

    #[tokio::test]
    async fn test_unchanged_state_published_once() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, _counter) = counter_state();
        let (publisher, _) = publisher_with(&transport, state);

        assert!(publisher.publish_state_if_changed().await);
        assert!(!publisher.publish_state_if_changed().await);
        assert!(!publisher.publish_state_if_changed().await);
        assert_eq!(transport.count_of("state"), 1);
    }

    #[tokio::test]
    async fn test_forced_publish_primes_diff() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, counter) = counter_state();
        let (publisher, _) = publisher_with(&transport, state);

        assert!(publisher.publish_state().await);
        assert!(!publisher.publish_state_if_changed().await);

        counter.store(1, Ordering::SeqCst);
        assert!(publisher.publish_state_if_changed().await);
        assert!(!publisher.publish_state_if_changed().await);

        // Forced publishes always go out, even with no change.
        assert!(publisher.publish_state().await);
        assert_eq!(transport.count_of("state"), 3);

        let last = transport.published_events().pop().unwrap();
        assert_eq!(last.get("state").cloned().unwrap(), json!({"count": 1}));
    }

    // =========================================================================
    // Liveness gate
    // =========================================================================

    #[tokio::test]
    async fn test_gate_open_without_any_ping() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, _) = counter_state();
        let (publisher, _) = publisher_with(&transport, state);

        assert!(publisher.publish_event(&Event::message("hello")).await);
        assert_eq!(transport.count_of("message"), 1);
    }

    #[tokio::test]
    async fn test_gate_drops_after_stale_ping() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, _) = counter_state();
        let (publisher, liveness) = publisher_with(&transport, state);

        liveness.record(now_millis() - 10_000);
        assert!(publisher.is_suppressed());
        assert!(!publisher.publish_event(&Event::notification("lost")).await);
        assert!(!publisher.publish_state().await);
        assert!(transport.published().is_empty());

        liveness.record(now_millis() - 1_000);
        assert!(publisher.publish_event(&Event::notification("kept")).await);
        assert_eq!(transport.count_of("notification"), 1);
    }

    #[tokio::test]
    async fn test_pong_bypasses_gate_and_refreshes() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, _) = counter_state();
        let (publisher, liveness) = publisher_with(&transport, state);

        liveness.record(now_millis() - 60_000);
        assert!(publisher.on_ping().await);

        assert_eq!(transport.published(), vec![r#"{"type":"pong"}"#.to_string()]);
        assert!(!publisher.is_suppressed());
        assert!(publisher.publish_event(&Event::alarm()).await);
    }

    // =========================================================================
    // Start-up and transport failures
    // =========================================================================

    #[tokio::test]
    async fn test_start_sends_init_even_when_gate_closed() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, _) = counter_state();
        let (publisher, liveness) = publisher_with(&transport, state);
        liveness.record(now_millis() - 60_000);

        let handle = publisher.start().await;
        assert_eq!(transport.published()[0], r#"{"type":"init"}"#);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_publishes_changes() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, counter) = counter_state();
        let (publisher, _) = publisher_with(&transport, state);

        let handle = publisher.start().await;
        transport.wait_for_published(2).await;
        assert_eq!(transport.count_of("state"), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(transport.count_of("state"), 1);

        counter.store(5, Ordering::SeqCst);
        transport.wait_for_published(3).await;
        assert_eq!(transport.count_of("state"), 2);
        handle.abort();
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_transport_failure_is_swallowed() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_fail_publish(true);
        let (state, _) = counter_state();
        let (publisher, _) = publisher_with(&transport, state);

        assert!(!publisher.publish_event(&Event::message("x")).await);
        assert!(transport.published().is_empty());
        assert!(logs_contain("publish_failed"));
    }

    // =========================================================================
    // Recovery after missed state publishes
    // =========================================================================

    #[tokio::test]
    async fn test_state_dropped_by_gate_is_sent_after_ping() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, counter) = counter_state();
        let (publisher, liveness) = publisher_with(&transport, state);

        liveness.record(now_millis() - 10_000);
        counter.store(7, Ordering::SeqCst);
        assert!(!publisher.publish_state_if_changed().await);
        assert_eq!(transport.count_of("state"), 0);

        assert!(publisher.on_ping().await);
        assert!(publisher.publish_state_if_changed().await);
        assert!(!publisher.publish_state_if_changed().await);

        let states: Vec<Event> = transport
            .published_events()
            .into_iter()
            .filter(|e| e.event_type() == "state")
            .collect();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].get("state").cloned().unwrap(), json!({"count": 7}));
    }

    #[tokio::test]
    async fn test_state_lost_in_transport_is_resent() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, _counter) = counter_state();
        let (publisher, _) = publisher_with(&transport, state);

        transport.set_fail_publish(true);
        assert!(!publisher.publish_state().await);
        assert!(!publisher.publish_state_if_changed().await);

        transport.set_fail_publish(false);
        assert!(publisher.publish_state_if_changed().await);
        assert!(!publisher.publish_state_if_changed().await);
        assert_eq!(transport.count_of("state"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_loop_keeps_running() {
        let transport = Arc::new(MemoryTransport::new());
        let (state, counter) = counter_state();
        let hub: Arc<dyn HubTransport> = transport.clone();
        let config = RuntimeConfig {
            state_interval: Duration::ZERO,
            ..RuntimeConfig::default()
        };
        let publisher = Arc::new(Publisher::new(
            hub,
            state,
            Arc::new(LivenessTracker::new()),
            &config,
        ));

        let handle = publisher.start().await;
        transport.wait_for_published(2).await;
        counter.store(3, Ordering::SeqCst);
        transport.wait_for_published(3).await;

        assert_eq!(transport.count_of("state"), 2);
        assert!(!handle.is_finished());
        handle.abort();
    }
}
