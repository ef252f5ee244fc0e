//! Calls to a hosted generative-language service.
//!
//! The service is reached through the [`LlmClient`] trait. [`ask_with_retry`]
//! wraps any client with the retry policy: overload failures are retried with
//! a growing pause, and once the attempts run out the caller gets a fixed
//! apology instead of an error. The HTTP client for Gemini is behind the
//! `gemini` feature.

mod retry;
mod types;

#[cfg(feature = "gemini")]
pub mod gemini;

pub use retry::{ask_with_retry, with_retry, Backoff, RetryError, RetryPolicy, APOLOGY};
pub use types::{
    Completion, CompletionRequest, LlmClient, LlmConfig, Message, MessageRole, UpstreamError,
};
