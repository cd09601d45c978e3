//! # gemprobe
//!
//! Serial latency probe for the Gemini generative language HTTP API.
//!
//! gemprobe measures time-to-first-token (TTFT), total response time, and
//! token throughput for streaming (SSE) and blocking calls, across a
//! cross-product of models × prompts × rounds, and renders a markdown
//! report. Exactly one request is in flight at any time — uncontended,
//! reproducible latency numbers over throughput.
//!
//! ## Features
//!
//! - **Streaming TTFT**: incremental SSE decoding that timestamps the
//!   first decodable event and the first visible text fragment
//! - **Blocking comparison**: the same prompts over `generateContent`,
//!   with TTFT defined as total time
//! - **Multi-turn runs**: one conversation threaded across prompts, with
//!   failure-tolerant history
//! - **Deterministic reports**: per-model, per-prompt, and per-mode
//!   aggregation with markdown tables and optional raw JSON export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gemprobe::{Args, Config, Driver, ExperimentPlan, Mode, default_prompts};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = Args::parse_args();
//!     let config = Arc::new(Config::from_args(&args)?);
//!
//!     let driver = Driver::new(Arc::clone(&config))?;
//!     let plan = ExperimentPlan {
//!         models: vec!["gemini-2.5-flash".to_string()],
//!         modes: vec![Mode::Streaming],
//!         prompts: default_prompts(),
//!         rounds: 3,
//!     };
//!
//!     let results = driver.run(&plan, true).await;
//!     println!("collected {} samples", results.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! gemprobe reads `GEMINI_API_KEY` (or `--api-key`) plus the conventional
//! `HTTPS_PROXY`/`HTTP_PROXY` variables, once, at startup. See [`Args`]
//! for all flags.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod report;
pub mod request;
pub mod stream;

// Re-exports for convenience
pub use client::ApiClient;
pub use config::{ApiConfig, Args, CallSettings, Config, ModeArg, RunConfig};
pub use driver::{
    Driver, ExperimentPlan, MultiTurnRun, Prompt, default_dialogue, default_prompts,
};
pub use error::{ProbeError, Result};
pub use report::{GroupBy, GroupStats, RunMetadata};
pub use request::{CallConfig, Conversation, Mode, Role, SampleResult, Turn};
pub use stream::{SseReader, StreamOutcome};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
