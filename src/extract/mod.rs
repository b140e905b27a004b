//! Field extraction and normalization.
//!
//! The local half of the pipeline: regex heuristics over snippets, prompt
//! assembly for the model call, normalization of the model's free-text
//! response, and balance reconciliation over the combined results.

pub mod balance;
pub mod heuristics;
pub mod normalize;
pub mod prompt;

pub use balance::{reconcile_balance, BalanceEstimate, BalanceSource};
pub use heuristics::{extract_email_fields, extract_fields, HeuristicFields};
pub use normalize::{extract_json_array, normalize_response};
pub use prompt::{build_prompt, EXTRACTION_SYSTEM_PROMPT, MAX_BATCH_SIZE};
