//! Core pipeline: ingest CSV tables into per-integration snapshots, detect
//! configuration corruption against JSON-declared business rules, generate
//! remediation actions, plan and execute them.

pub mod detector;
pub mod error;
pub mod executor;
pub mod ingestor;
pub mod model;
pub mod orchestrator;
pub mod planner;
pub mod remediation;
pub mod rules;

pub use error::{Error, Result};
