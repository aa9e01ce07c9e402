//! Reasoning layer for rule formalization.
//!
//! Provides the `ProviderAdapter` trait with OpenAI and Anthropic adapters,
//! request/response middleware, and the `ReasoningBackend` that the pipeline
//! consults when structural analysis of a rule is inconclusive.

mod anthropic;
mod backend;
mod middleware;
mod openai;
mod provider;
mod types;

pub use anthropic::AnthropicAdapter;
pub use backend::*;
pub use middleware::*;
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use types::*;
