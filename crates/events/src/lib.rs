//! Task lifecycle event bus.
//!
//! The orchestrator reports progress and terminal outcomes by
//! publishing [`TaskEvent`]s on an in-process [`EventBus`]; the
//! presentation layer subscribes to drive progress bars and controls.
//! This is the orchestrator's only outward-facing interface.

pub mod bus;

pub use bus::{EventBus, TaskEvent};
