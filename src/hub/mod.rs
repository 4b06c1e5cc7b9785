//! Live listener tracking and change fan-out

pub mod registry;

pub use registry::{ConnectionId, Listener, ListenerQueue, SubscriptionRegistry};
