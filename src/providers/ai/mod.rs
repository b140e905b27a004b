//! AI/LLM provider implementations.
//!
//! This module provides the text-generation interface used by the extraction
//! pipeline. The external model is treated as an opaque text-in/text-out
//! function: prompts go in, free-form text comes back, and the normalizer
//! downstream deals with whatever shape the text takes.
//!
//! # Example
//!
//! ```rust,no_run
//! use finmail::providers::ai::{CompletionRequest, GeminiProvider, LlmProvider, Message};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gemini = GeminiProvider::flash("AIza...");
//!
//! let request = CompletionRequest::new(vec![Message::user("Extract the fields.")])
//!     .with_system_prompt("You are a precise transaction extractor.");
//!
//! let response = gemini.complete(&request).await?;
//! println!("Response: {}", response.text);
//! # Ok(())
//! # }
//! ```

mod gemini;
mod traits;

pub use gemini::GeminiProvider;
pub use traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, LlmResult,
    Message, Role, TokenUsage,
};
