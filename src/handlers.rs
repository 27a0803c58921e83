//! Function and callback tables.
//!
//! Both tables map a string key to a [`Handler`] with the single canonical
//! signature `(args) -> Option<Value>`. They are filled while the extension is
//! being assembled and only read once it is running.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::events::{Args, EventTypeCatalog};
use crate::types::{Error, Result};

type AsyncFn = dyn Fn(Args) -> BoxFuture<'static, Option<Value>> + Send + Sync;
type BlockingFn = dyn Fn(Args) -> Option<Value> + Send + Sync;

/// An invocable remote function or event callback.
#[derive(Clone)]
pub enum Handler {
    /// Runs on the async executor.
    Async(Arc<AsyncFn>),
    /// Runs on the blocking thread pool.
    Blocking(Arc<BlockingFn>),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Async(_) => f.write_str("Handler::Async"),
            Handler::Blocking(_) => f.write_str("Handler::Blocking"),
        }
    }
}

impl Handler {
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Value>> + Send + 'static,
    {
        let wrapped: Arc<AsyncFn> = Arc::new(move |args| f(args).boxed());
        Handler::Async(wrapped)
    }

    pub fn from_blocking<F>(f: F) -> Self
    where
        F: Fn(Args) -> Option<Value> + Send + Sync + 'static,
    {
        Handler::Blocking(Arc::new(f))
    }

    /// Invoke the handler. A panicking blocking handler yields `None`.
    pub async fn call(&self, args: Args) -> Option<Value> {
        match self {
            Handler::Async(f) => f(args).await,
            Handler::Blocking(f) => {
                let f = Arc::clone(f);
                match tokio::task::spawn_blocking(move || f(args)).await {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::error!("Blocking handler failed: {}", e);
                        None
                    }
                }
            }
        }
    }
}

/// Overlay `args` on a copy of `default_args`: explicit args win, defaults
/// fill the gaps.
pub fn merge_args(default_args: Args, args: Args) -> Args {
    let mut merged = default_args;
    merged.extend(args);
    merged
}

// =============================================================================
// Function table
// =============================================================================

/// Remote functions invocable through `function_call` events.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, Handler>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its exact call name.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::validation("function name must be a non-empty string"));
        }
        if self.functions.contains_key(&name) {
            return Err(Error::validation(format!(
                "Function already registered: {}",
                name
            )));
        }
        tracing::debug!("Registered function: {}", name);
        self.functions.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// =============================================================================
// Callback table
// =============================================================================

/// One callback per catalogued event type.
#[derive(Debug, Clone)]
pub struct CallbackTable {
    catalog: Arc<EventTypeCatalog>,
    callbacks: HashMap<String, Handler>,
}

impl CallbackTable {
    pub fn new(catalog: Arc<EventTypeCatalog>) -> Self {
        Self {
            catalog,
            callbacks: HashMap::new(),
        }
    }

    /// Register the callback for `event_type`, replacing any previous one.
    pub fn on(&mut self, event_type: impl Into<String>, handler: Handler) -> Result<()> {
        let event_type = event_type.into();
        if !self.catalog.contains(&event_type) {
            let allowed: Vec<&str> = self.catalog.iter().collect();
            return Err(Error::validation(format!(
                "eventType must be one of: {}",
                allowed.join(", ")
            )));
        }
        if self.callbacks.insert(event_type.clone(), handler).is_some() {
            tracing::debug!("Replaced callback for {}", event_type);
        }
        Ok(())
    }

    /// Callback for a catalogued event type, if one is registered.
    pub fn get(&self, event_type: &str) -> Option<&Handler> {
        if !self.catalog.contains(event_type) {
            return None;
        }
        self.callbacks.get(event_type)
    }

    pub fn catalog(&self) -> &EventTypeCatalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
