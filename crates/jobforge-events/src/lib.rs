//! # jobforge-events
//!
//! The event bus job queue instances publish lifecycle notifications on,
//! and that hosts subscribe to for dashboards, logging, or bridging to an
//! external system.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventHandler, ExternalBridge, ExternalPublisher, LocalEventBus, Subscription,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use error::{EventsError, EventsErrorKind};
pub use types::{EventMeta, JobEvent};
