pub mod backfiller;
pub mod classify;
pub mod config;
pub mod coverage;
pub mod document_store;
pub mod error;
pub mod observation;
pub mod placeholder;
pub mod planner;
pub mod postgres_store;
pub mod report;
pub mod sql;
pub mod target_store;
pub mod telemetry;

pub use backfiller::{Backfiller, RunSummary};
pub use config::{BackfillConfig, Environment, TableRef};
pub use error::*;
pub use telemetry::init_tracing;
