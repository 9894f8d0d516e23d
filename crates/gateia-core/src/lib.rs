//! # gateia-core
//!
//! Deterministic contract and policy enforcement for generative model output.
//!
//! This crate decides whether a candidate value may be released:
//! - Does it match the contract (a JSON Schema)?
//! - Do the content policies let it through, possibly rewritten?
//! - What exactly happened, for the audit trail?
//!
//! ## Key Guarantees
//!
//! 1. **No model calls**: everything here is rule-based
//! 2. **Fail-closed**: a policy result that does not match the result schema
//!    aborts the call
//! 3. **Complete**: a block does not stop evaluation, so every violation is
//!    reported in policy order
//! 4. **Redaction-safe**: built-in policies never echo the sensitive text
//!    they detect
//!
//! ## Example
//!
//! ```rust,ignore
//! use gateia_core::{JsonSchemaContract, Verifier, VerifyRequest};
//!
//! let contract = JsonSchemaContract::from_file("reply.yaml")?;
//! let verifier = Verifier::default();
//! let result = verifier
//!     .verify(VerifyRequest::new(model_text, contract).policies(["pii-safe"]))
//!     .await?;
//!
//! if result.allowed {
//!     send(result.safe_output);
//! } else {
//!     audit(&result.enforcement.violations);
//! }
//! ```

pub mod contract;
pub mod error;
pub mod evidence;
pub mod library;
pub mod policy;
pub mod synthesizer;
pub mod trace;
pub mod types;
pub mod verify;

// Re-export main types at crate root
pub use contract::{
    format_repair_instruction, Contract, ContractError, ContractOutcome, JsonSchemaContract,
    RootKind,
};
pub use error::{BoxError, ErrorKind, GateiaError};
pub use evidence::Evidence;
pub use library::PolicyLibrary;
pub use policy::{Policy, PolicyCheck, PolicyEngine, PolicyEvaluation, PolicyRef, PolicyResult};
pub use synthesizer::Synthesizer;
pub use trace::{TimestampTraceIds, TraceIdGenerator};
pub use types::{
    ActionType, AppliedPolicy, ContractReport, ContractStatus, EnforcementReport, FieldError,
    Outcome, PolicyAction, PolicyContext, PolicyMode, Prompt, Severity, Violation,
};
pub use verify::{ContractCheck, Enforcement, Verifier, VerifyRequest, VerifyResult};
