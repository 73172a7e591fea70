//! Tool system.
//!
//! Tools are the only way a run touches the outside world. Each one takes a
//! single typed value and produces one, declares which resources it touches,
//! and keeps no state between invocations.

pub mod builtin;

mod registry;
mod tool;
mod value;

pub use registry::ToolRegistry;
pub use tool::{RunContext, SideEffect, Tool, ToolOutput};
pub use value::{StructuredQuery, ToolValue, ValueKind};
