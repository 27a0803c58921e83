//! # TalkOps - Extension runtime
//!
//! Keeps a remote extension process synchronized with a TalkOps hub over a
//! publish/subscribe channel:
//! - State snapshots diffed and pushed on change
//! - Boot handshake delivering configuration parameters
//! - Remote function calls with argument defaults
//! - Event-type callbacks
//! - Ping/pong liveness gate on outbound events
//!
//! ## Architecture
//!
//! ```text
//!              ┌──────────────────────────────────────────┐
//!   hub SSE →  │ Subscriber ─▶ Dispatcher                 │
//!              │                 ├─▶ ParameterRegistry    │
//!              │                 ├─▶ FunctionTable        │
//!              │                 └─▶ CallbackTable        │
//!              │                        │                 │
//!   hub POST ← │ Publisher ◀────────────┘ LivenessTracker │
//!              └──────────────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod events;
pub mod extension;
pub mod handlers;
pub mod hub;
pub mod liveness;
pub mod parameters;
pub mod publisher;
pub mod subscriber;
pub mod types;

// Internal utilities
pub mod observability;

pub use events::{Args, Event, EventKind, EventTypeCatalog, Media};
pub use extension::{Extension, RunningExtension};
pub use handlers::Handler;
pub use parameters::{Parameter, ParameterType};
pub use types::{Config, Error, HubConfig, Result, RuntimeConfig};
