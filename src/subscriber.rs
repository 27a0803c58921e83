//! Event subscriber: inbound half of the hub channel.
//!
//! The [`Subscriber`] owns the long-lived subscription: connect, decode SSE
//! frames, hand each event to the [`Dispatcher`], and on failure back off and
//! reconnect forever.
//!
//! Dispatch rules:
//!   ping           → record liveness inline, pong sent on a tracked task
//!   boot           → store parameters, force a state push; stop here unless
//!                    every required parameter is set, then fall through to
//!                    the `boot` callback
//!   function_call  → merge args over defaultArgs, run the function on a
//!                    tracked task, republish the event with `output`
//!   anything else  → run the catalogued callback on a tracked task, if any

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

use crate::events::{Event, EventKind};
use crate::handlers::{merge_args, CallbackTable, FunctionTable};
use crate::hub::{HubTransport, SseDecoder};
use crate::parameters::ParameterRegistry;
use crate::publisher::Publisher;
use crate::types::RuntimeConfig;

// =============================================================================
// Dispatcher
// =============================================================================

/// What the dispatcher did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Ping recorded, pong queued.
    Pong,
    /// Boot handled and state pushed; `ready` tells whether it fell through.
    Boot { ready: bool, callback: bool },
    /// Function invocation queued.
    FunctionCall { name: String },
    /// Callback invocation queued.
    Callback { event_type: String },
    /// Nothing matched.
    Dropped,
}

/// Routes decoded events to the registry, the function table, or a callback.
#[derive(Debug)]
pub struct Dispatcher {
    parameters: Arc<ParameterRegistry>,
    functions: Arc<FunctionTable>,
    callbacks: Arc<CallbackTable>,
    publisher: Arc<Publisher>,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        parameters: Arc<ParameterRegistry>,
        functions: Arc<FunctionTable>,
        callbacks: Arc<CallbackTable>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            parameters,
            functions,
            callbacks,
            publisher,
            tasks: TaskTracker::new(),
        }
    }

    pub async fn dispatch(&self, event: Event) -> Dispatched {
        match event.kind() {
            EventKind::Ping => {
                self.publisher.record_ping();
                let publisher = Arc::clone(&self.publisher);
                self.tasks.spawn(async move {
                    publisher.send_pong().await;
                });
                Dispatched::Pong
            }
            EventKind::Boot => self.on_boot(event).await,
            EventKind::FunctionCall => self.on_function_call(event),
            _ => {
                if self.spawn_callback(&event) {
                    Dispatched::Callback {
                        event_type: event.event_type().to_string(),
                    }
                } else {
                    tracing::trace!("Dropping unhandled event type={}", event.event_type());
                    Dispatched::Dropped
                }
            }
        }
    }

    async fn on_boot(&self, event: Event) -> Dispatched {
        if let Some(Value::Object(parameters)) = event.get("parameters") {
            for (name, value) in parameters {
                self.parameters.set_value(name, value);
            }
        }

        let ready = self.parameters.is_ready();
        self.publisher.publish_state().await;
        if !ready {
            tracing::info!(
                "Boot received, waiting for parameters: {:?}",
                self.parameters.missing()
            );
            return Dispatched::Boot {
                ready: false,
                callback: false,
            };
        }

        tracing::info!("Boot complete, extension ready");
        let callback = self.spawn_callback(&event);
        Dispatched::Boot {
            ready: true,
            callback,
        }
    }

    fn on_function_call(&self, mut event: Event) -> Dispatched {
        let Some(name) = event.str_field("name").map(str::to_string) else {
            tracing::debug!("Dropping function_call without a name");
            return Dispatched::Dropped;
        };
        let Some(handler) = self.functions.get(&name).cloned() else {
            tracing::debug!("Dropping call to unknown function {}", name);
            return Dispatched::Dropped;
        };

        let args = merge_args(event.object_field("defaultArgs"), event.object_field("args"));
        let publisher = Arc::clone(&self.publisher);
        let task_name = name.clone();
        self.tasks.spawn(async move {
            let output = handler.call(args).await;
            event.insert("output", output.unwrap_or(Value::Null));
            if !publisher.publish_event(&event).await {
                tracing::debug!("Result of {} dropped by liveness gate", task_name);
            }
        });
        Dispatched::FunctionCall { name }
    }

    fn spawn_callback(&self, event: &Event) -> bool {
        let Some(handler) = self.callbacks.get(event.event_type()).cloned() else {
            return false;
        };
        let args = event.handler_args();
        self.tasks.spawn(async move {
            handler.call(args).await;
        });
        true
    }

    /// Wait for every handler task spawned so far to finish.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Number of handler tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// Long-lived subscription loop.
#[derive(Debug)]
pub struct Subscriber {
    transport: Arc<dyn HubTransport>,
    dispatcher: Arc<Dispatcher>,
    reconnect_backoff: Duration,
    reconnect_delay: Duration,
    max_frame_bytes: usize,
}

impl Subscriber {
    pub fn new(
        transport: Arc<dyn HubTransport>,
        dispatcher: Arc<Dispatcher>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            reconnect_backoff: config.reconnect_backoff,
            reconnect_delay: config.reconnect_delay,
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    /// Run the subscription loop in the background.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Subscribe forever. Connection failures wait `reconnect_backoff`; a
    /// stream that ends waits the shorter `reconnect_delay`.
    pub async fn run(&self) {
        loop {
            match self.transport.subscribe().await {
                Ok(stream) => {
                    tracing::info!("Subscribed to hub");
                    self.consume(stream).await;
                    tracing::info!(
                        "Hub stream closed, reconnecting in {}ms",
                        self.reconnect_delay.as_millis()
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
                Err(e) => {
                    tracing::warn!(
                        "Subscription failed: {}; retrying in {}ms",
                        e,
                        self.reconnect_backoff.as_millis()
                    );
                    tokio::time::sleep(self.reconnect_backoff).await;
                }
            }
        }
    }

    async fn consume(&self, mut stream: crate::hub::ByteStream) {
        let mut decoder = SseDecoder::new(self.max_frame_bytes);
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!("Hub stream error: {}", e);
                    return;
                }
            };
            for payload in decoder.feed(&chunk) {
                self.handle_payload(&payload).await;
            }
        }
    }

    /// Decode and dispatch one payload; malformed payloads are dropped.
    pub async fn handle_payload(&self, payload: &str) -> Dispatched {
        match Event::from_payload(payload) {
            Ok(event) => self.dispatcher.dispatch(event).await,
            Err(e) => {
                tracing::debug!("Dropping malformed payload: {}", e);
                Dispatched::Dropped
            }
        }
    }
}
