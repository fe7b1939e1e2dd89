//! Check engine module - schedules and executes service checks
//!
//! This module is responsible for:
//! - Validating and registering check definitions
//! - Executing HTTP/TCP/process checks on a bounded worker pool
//! - Re-running due checks between report cycles
//! - Aggregating results and shipping them upstream

pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod validation;

pub use executor::Executor;
pub use scheduler::{Scheduler, SchedulerOptions};
pub use store::{Registry, ResultStore};
pub use types::{Check, CheckKind, CheckResult, CheckState, EventType, Results, ServiceConfig};
pub use validation::ValidationError;
