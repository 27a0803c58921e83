//! Event infrastructure: wire events exchanged with the hub.
//!
//! Events are JSON objects discriminated by a string `type` field. They are
//! built, serialized to a single line, and thrown away; nothing stores them.

pub mod catalog;
pub mod event;
pub mod media;

pub use catalog::EventTypeCatalog;
pub use event::{Args, Event, EventKind};
pub use media::{Media, MediaKind};
