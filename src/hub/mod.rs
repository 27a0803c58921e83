//! Hub transport layer.
//!
//! The hub is an HTTP pub/sub broker: publishing is a form-encoded POST,
//! subscribing is a long-lived GET whose body is a Server-Sent Events stream.
//! [`HubTransport`] is the seam between the protocol logic and the wire.

pub mod memory;
pub mod sse;
pub mod transport;

pub use memory::MemoryTransport;
pub use sse::SseDecoder;
pub use transport::{ByteStream, HttpTransport, HubTransport};
