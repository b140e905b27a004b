//! finmail - personal finance email ingestion
//!
//! This crate fetches bank and credit-card emails from Gmail, extracts
//! structured transaction data with regex heuristics and an AI model, and
//! persists the normalized results as JSON files on local disk.

pub mod config;
pub mod domain;
pub mod extract;
pub mod ingest;
pub mod pipeline;
pub mod providers;
pub mod storage;

pub use ingest::{IngestError, IngestReport, IngestService};
