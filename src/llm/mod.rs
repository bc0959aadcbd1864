// LLM module

pub mod client;
pub mod prompts;

pub use client::{Attachment, CompletionRequest, LlmClient, LlmError, LlmProvider};
