//! Client signaling: wire protocol, per-connection session and the
//! WebSocket endpoint.

pub mod protocol;
pub mod session;
pub mod ws;

pub use protocol::{AckFrame, AckShape, ClientEvent, ClientFrame, ErrorBody};
pub use session::SignalingSession;
pub use ws::signaling_router;
