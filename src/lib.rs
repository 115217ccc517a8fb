//! ToS Guardian API Library
//!
//! Turns a terms-of-service document (URL, uploaded file or pasted text) into
//! a structured risk assessment produced by a hosted LLM, and provides the
//! presentation-side pieces (scan session, cooldown, history) that drive it.
//!
//! # Modules
//!
//! - `analysis`: Normalize, invoke, validate pipeline with deadline and cancellation.
//! - `cache_validator`: Checksummed envelope for the persisted history.
//! - `config`: Configuration management.
//! - `errors`: Error taxonomy and its HTTP mapping.
//! - `gateway_client`: Client for a running analyze endpoint.
//! - `handlers`: HTTP request handlers and router.
//! - `history`: Bounded, deduplicated result history.
//! - `llm_client`: Model invoker trait and the OpenRouter backend.
//! - `models`: Request and result types.
//! - `normalizer`: Input to prompt conversion.
//! - `prompt`: System instruction, directives and result schema.
//! - `session`: Single-flight scan session with quota cooldown.
//! - `validator`: Model output parsing and upstream failure classification.

pub mod analysis;
pub mod cache_validator;
pub mod config;
pub mod errors;
pub mod gateway_client;
pub mod handlers;
pub mod history;
pub mod llm_client;
pub mod models;
pub mod normalizer;
pub mod prompt;
pub mod session;
pub mod validator;
