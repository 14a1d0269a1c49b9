//! # jobforge-service
//!
//! The facade most applications embed: `QueueService` ties together
//! storage, the event bus, and handler registration into a single
//! multi-queue object, with an optional process-wide singleton accessor
//! for callers who don't want to thread it through their whole call
//! stack.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod dashboard;
mod error;
mod global;
mod service;

pub use dashboard::{DashboardSnapshot, QueueSnapshot};
pub use error::{ServiceError, ServiceErrorKind, ServiceResult};
pub use global::{current, initialize, terminate};
pub use service::QueueService;
