//! `jestloop`: the round-execution core of a continuous LLM comedy
//! tournament (§1-§2).
//!
//! The crate is organized around a single in-memory, lock-guarded store
//! ([`store::EngineStore`]) and a lease-owned driver loop
//! ([`driver::RoundDriver`]) that the process-level [`app::Engine`] wires
//! into background threads alongside the presence reaper and projection
//! bootstrap. [`http`] exposes the admin and chat-bridge surfaces over a
//! minimal hand-rolled HTTP/1.1 layer; nothing in this crate depends on an
//! async runtime (§9, F.0) — every suspension point is a blocking call on
//! a dedicated OS thread.

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod http;
pub mod lease;
pub mod llm_adapter;
pub mod observability;
pub mod reasoning;
pub mod recovery;
pub mod store;
pub mod types;
pub mod voting_window;

pub use app::Engine;
pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result};
pub use llm_adapter::{LlmAdapter, LlmCallOutcome, ProgressSink};
pub use store::EngineStore;
