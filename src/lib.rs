//! talk2sql
//!
//! Answers natural-language questions about patient records. An LLM
//! planner turns the request into a read-only query, the result is
//! written to a CSV artifact, and the artifact is rendered as an HTML
//! table and opened in the system viewer.
//!
//! # Architecture
//!
//! ```text
//!   request
//!      │
//!      ▼
//! ┌──────────────┐   PlanStep    ┌──────────────────────────────────────────┐
//! │   Planner    │──────────────▶│               Orchestrator               │
//! │ (LLM + tools │◀──────────────│  state machine · trace · artifact locks  │
//! │  contract)   │  tool results └───────┬──────────────────────┬───────────┘
//! └──────────────┘                       │                      │
//!                                        ▼                      ▼
//!                             ┌────────────────────┐  ┌────────────────────┐
//!                             │ execute_sql_query  │  │ display_in_browser │
//!                             │  RecordStore ──▶   │  │  CSV ──▶ HTML ──▶  │
//!                             │  CSV artifact      │  │  DisplaySurface    │
//!                             └────────────────────┘  └────────────────────┘
//! ```
//!
//! Every tool declares the kind of value it consumes and produces, so a
//! plan is checked before anything runs. Faults are classified as
//! plan, store, artifact, or display faults; only display faults leave
//! the run successful.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod records;
mod retry;
pub mod schema;
pub mod seed;
pub mod testing;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::artifact::{ArtifactRef, ArtifactStore};
    pub use crate::config::Config;
    pub use crate::db::RecordStore;
    pub use crate::display::DisplaySurface;
    pub use crate::error::{Error, Failure, FailureKind, Result};
    pub use crate::llm::LlmProvider;
    pub use crate::orchestrator::{Orchestrator, RunFailure, RunOutcome};
    pub use crate::planner::{PlanStep, Planner};
    pub use crate::records::{FieldValue, ResultSet};
    pub use crate::schema::SchemaContract;
    pub use crate::tools::{Tool, ToolOutput, ToolRegistry};
}
