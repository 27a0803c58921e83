//! Extension runtime: assembles the registries, publisher and subscriber.
//!
//! ```text
//!   hub ──SSE──▶ Subscriber ──▶ Dispatcher ──▶ ParameterRegistry
//!                                   │      ├──▶ FunctionTable
//!                                   │      └──▶ CallbackTable
//!                                   ▼
//!   hub ◀─POST── Publisher ◀── state provider / send_* calls
//! ```
//! `Extension` is consumed by `start`, so an extension can only be started
//! once.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::events::{Event, EventTypeCatalog, Media};
use crate::handlers::{CallbackTable, FunctionTable, Handler};
use crate::hub::{HttpTransport, HubTransport};
use crate::liveness::LivenessTracker;
use crate::parameters::{EnvLookup, Parameter, ParameterRegistry};
use crate::publisher::{Publisher, StateProvider};
use crate::subscriber::{Dispatcher, Subscriber};
use crate::types::{Config, Result};

/// SDK identity reported in the state snapshot.
pub const SDK_NAME: &str = "rust";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// An extension being assembled.
pub struct Extension {
    config: Config,
    parameters: Vec<Parameter>,
    functions: FunctionTable,
    callbacks: CallbackTable,
    metadata: Map<String, Value>,
    state_provider: Option<StateProvider>,
    env_lookup: Option<EnvLookup>,
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("hub", &self.config.hub.url)
            .field("parameters", &self.parameters.len())
            .field("functions", &self.functions.len())
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl Extension {
    /// New extension accepting callbacks for the built-in event types.
    pub fn new(config: Config) -> Self {
        Self::with_catalog(config, EventTypeCatalog::default())
    }

    pub fn with_catalog(config: Config, catalog: EventTypeCatalog) -> Self {
        Self {
            config,
            parameters: Vec::new(),
            functions: FunctionTable::new(),
            callbacks: CallbackTable::new(Arc::new(catalog)),
            metadata: Map::new(),
            state_provider: None,
            env_lookup: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, handler: Handler) -> Result<Self> {
        self.functions.register(name, handler)?;
        Ok(self)
    }

    pub fn on(mut self, event_type: impl Into<String>, handler: Handler) -> Result<Self> {
        self.callbacks.on(event_type, handler)?;
        Ok(self)
    }

    /// Static metadata merged into every state snapshot.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Replace the default state snapshot entirely.
    pub fn with_state_provider(mut self, provider: StateProvider) -> Self {
        self.state_provider = Some(provider);
        self
    }

    /// Override the environment lookup used for parameter overrides.
    pub fn with_env_lookup(mut self, lookup: EnvLookup) -> Self {
        self.env_lookup = Some(lookup);
        self
    }

    /// Start against the HTTP hub described by the configuration.
    pub async fn start_http(self) -> RunningExtension {
        let transport: Arc<dyn HubTransport> = Arc::new(HttpTransport::new(self.config.hub.clone()));
        self.start(transport).await
    }

    /// Send `init`, then spawn the state diff loop and the subscription loop.
    pub async fn start(self, transport: Arc<dyn HubTransport>) -> RunningExtension {
        let Extension {
            config,
            parameters,
            functions,
            callbacks,
            metadata,
            state_provider,
            env_lookup,
        } = self;

        if let Err(e) = config.runtime.validate() {
            tracing::warn!("Runtime configuration: {}", e);
        }

        let parameters = Arc::new(match env_lookup {
            Some(lookup) => ParameterRegistry::with_env_lookup(parameters, lookup),
            None => ParameterRegistry::new(parameters),
        });
        let state = state_provider.unwrap_or_else(|| default_state(metadata, Arc::clone(&parameters)));

        let liveness = Arc::new(LivenessTracker::new());
        let publisher = Arc::new(Publisher::new(
            Arc::clone(&transport),
            state,
            liveness,
            &config.runtime,
        ));
        let state_loop = publisher.start().await;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&parameters),
            Arc::new(functions),
            Arc::new(callbacks),
            Arc::clone(&publisher),
        ));
        let subscription = Subscriber::new(transport, Arc::clone(&dispatcher), &config.runtime).spawn();

        tracing::info!(
            "Extension started (hub={}, parameters={})",
            config.hub.url,
            parameters.len()
        );

        RunningExtension {
            parameters,
            publisher,
            dispatcher,
            loops: vec![state_loop, subscription],
        }
    }
}

/// Metadata, parameter views and SDK identity.
fn default_state(metadata: Map<String, Value>, parameters: Arc<ParameterRegistry>) -> StateProvider {
    Arc::new(move || {
        let mut state = metadata.clone();
        state.insert("parameters".to_string(), parameters.snapshot());
        state.insert(
            "sdk".to_string(),
            json!({"name": SDK_NAME, "version": SDK_VERSION}),
        );
        Value::Object(state)
    })
}

/// Handle to a started extension.
#[derive(Debug)]
pub struct RunningExtension {
    parameters: Arc<ParameterRegistry>,
    publisher: Arc<Publisher>,
    dispatcher: Arc<Dispatcher>,
    loops: Vec<JoinHandle<()>>,
}

impl RunningExtension {
    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub async fn publish_state(&self) -> bool {
        self.publisher.publish_state().await
    }

    pub async fn send_message(&self, text: impl Into<String>) -> bool {
        self.publisher.publish_event(&Event::message(text)).await
    }

    pub async fn send_notification(&self, text: impl Into<String>) -> bool {
        self.publisher.publish_event(&Event::notification(text)).await
    }

    pub async fn enable_alarm(&self) -> bool {
        self.publisher.publish_event(&Event::alarm()).await
    }

    pub async fn send_medias(&self, medias: &[Media]) -> Result<bool> {
        let event = Event::medias(medias)?;
        Ok(self.publisher.publish_event(&event).await)
    }

    /// Wait for in-flight function and callback tasks.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    /// Wait on the background loops; they run for the life of the process.
    pub async fn join(self) {
        for handle in self.loops {
            if let Err(e) = handle.await {
                tracing::error!("extension_loop_failed: {}", e);
            }
        }
    }
}
