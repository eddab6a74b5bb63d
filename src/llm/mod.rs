//! LLM integration module.
//!
//! Provides an OpenAI-compatible client with bounded retry for LLM API calls
//! and the prompts used for answering, query rewriting and judging.

mod client;
mod prompts;

pub use client::{LlmClient, LlmResponse, Message, Role, TokenUsage, retry_transient};
pub use prompts::Prompts;
