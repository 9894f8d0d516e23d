//! # gateia-runtime
//!
//! Model-calling front end for Gateia.
//!
//! `gateia-core` decides whether a value may be released; this crate gets
//! the value in the first place. It routes a model name to an adapter,
//! drives the bounded contract-repair loop and hands the validated output to
//! the core policy engine.
//!
//! ## Adapters
//!
//! OpenAI, Gemini and Ollama ship with the crate. Real HTTP calls sit behind
//! the `openai`, `gemini` and `ollama` cargo features; with
//! `GATEIA_MOCK_ADAPTERS=true` every built-in adapter returns canned output
//! instead. Anything else implements [`ModelAdapter`] and is registered on
//! the [`ModelRegistry`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use gateia_runtime::{Gate, GateRequest, RepairMode};
//! use gateia_core::JsonSchemaContract;
//!
//! let gate = Gate::from_env()?;
//! let result = gate
//!     .gate(
//!         GateRequest::new("gpt-4o", "Summarise the ticket as JSON", contract)
//!             .policies(["pii-safe", "secrets-safe"])
//!             .repair(RepairMode::Auto),
//!     )
//!     .await?;
//!
//! println!("{} tokens over {} attempt(s)", result.usage.tokens.total_tokens, result.usage.attempts);
//! ```

pub mod config;
pub mod gate;
pub mod providers;

pub use config::{ConfigError, RuntimeConfig};
pub use gate::{
    ContractBehavior, Gate, GateBehavior, GateBuilder, GateRequest, GateResult, GateUsage,
    OnBlock, RepairMode,
};
pub use providers::{
    GenerateOptions, Generation, ModelAdapter, ModelRegistry, ModelRoute, ProviderError,
    TokenUsage,
};
