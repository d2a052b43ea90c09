//! Engine-facing negotiation steps.
//!
//! Each operation follows the same shape: ask the room actor to validate,
//! run the (possibly slow) engine call on the caller's task, then ask the
//! actor to record the result. If recording fails the new engine object is
//! closed again so nothing leaks.
//!
//! - [`transport`] - transport creation and DTLS connect
//! - [`graph`] - produce, consume, resume and mute

pub mod graph;
pub mod transport;

pub use graph::{consume, mute_toggle, produce, resume_consumer, ConsumerParams};
pub use transport::{connect_transport, create_transport, TransportParams};
