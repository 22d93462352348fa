//! Cross-tab edit exclusivity
//!
//! A client-local mutual exclusion protocol: each tab runs an
//! `EditCoordinator` on a shared `BroadcastBus` and claims a file before
//! editing it. There is no lock server; holders heartbeat, and a holder that
//! goes silent for the stale threshold is treated as gone.

pub mod bus;
pub mod coordinator;
pub mod message;

pub use bus::{BroadcastBus, BusPort, Frame};
pub use coordinator::{
    ConflictCallback, CoordinatorConfig, CoordinatorEvent, EditCoordinator, LockStatus,
};
pub use message::{LockMessage, MessageKind, TabId};
