//! `OpenAI` chat completions integration.
//!
//! Used by the content service to write product copy. The client is only
//! built when an API key is configured.

mod client;
mod error;
mod types;

pub use client::{OpenAiClient, TextStream};
pub use error::{ApiError, ApiErrorResponse, OpenAiError};
pub use types::{ChatMessage, CompletionParams};
