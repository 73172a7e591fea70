//! CLI command handling.
//!
//! Provides subcommands for:
//! - Answering a natural-language request (`ask`)
//! - Dumping the schema contract as YAML (`schema`)
//! - Filling a development database with synthetic patients (`seed`)
//! - Printing every stored record (`list`)

#[cfg(feature = "postgres")]
mod ask;
#[cfg(feature = "postgres")]
mod records;
mod schema;

#[cfg(feature = "postgres")]
pub use ask::run_ask_command;
#[cfg(feature = "postgres")]
pub use records::{run_list_command, run_seed_command};
pub use schema::run_schema_command;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "talk2sql")]
#[command(about = "Ask questions about patient records in plain language")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Turn a request into a query, run it, and show the result table
    Ask {
        /// The request, e.g. "Show me all patient records with age greater than 10"
        request: String,

        /// Artifact name to write (defaults to ARTIFACT_NAME)
        #[arg(long)]
        artifact: Option<String>,

        /// Render the table but do not open a viewer
        #[arg(long)]
        no_open: bool,
    },

    /// Write the schema contract as YAML
    Schema {
        /// Output file
        #[arg(short, long, default_value = "patient_record_schema.yaml")]
        output: PathBuf,
    },

    /// Create the patient_records table if needed and insert synthetic records
    Seed {
        /// Number of records to insert
        #[arg(short = 'n', long, default_value = "100")]
        count: usize,
    },

    /// Print every patient record
    List,
}
