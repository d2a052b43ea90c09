//! Actor model for room orchestration.
//!
//! ```text
//! RoomRegistry (singleton, DashMap of live rooms)
//! └── RoomActor (one per active room, owns the router)
//!     └── PeerSession (one per connection in the room)
//!         ├── transports (producer / consumer role)
//!         ├── producers
//!         └── consumers
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer per room**: every mutation of a room's peer map goes
//!   through its actor mailbox, so operations on one room are linearizable
//! - **No engine calls inside the actor**: slow engine work runs on the
//!   caller's task between a prepare and an attach message
//! - **CancellationToken propagation**: the registry hands each room a child
//!   token so shutdown reaches every room
//! - **Mailbox monitoring**: depth thresholds with metrics (Room: 100/500)
//!
//! # Modules
//!
//! - [`registry`] - `RoomRegistry`, creates and removes rooms
//! - [`room`] - `RoomActor` per active room
//! - [`peer`] - `PeerSession` bookkeeping and the per-connection notifier
//! - [`messages`] - Message, result and notification types
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod messages;
pub mod metrics;
pub mod peer;
pub mod registry;
pub mod room;

// Re-export primary types
pub use messages::*;
pub use metrics::{ActorMetrics, MailboxMonitor};
pub use peer::PeerNotifier;
pub use registry::{RegistryStatus, RoomRegistry, RoomSettings};
pub use room::{RoomActor, RoomActorHandle};
