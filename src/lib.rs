//! # Stream Mocker
//!
//! A chat-completion API test double. It answers OpenAI-style chat requests
//! with canned content, paced token by token at a per-model emission rate,
//! so clients can be exercised against realistic streaming timing without a
//! real model behind the endpoint.
//!
//! ## Features
//!
//! - Per-model rates, explicit or derived from a parameter count
//! - Response length by tag, rate band (`auto`), `random`, or target duration
//! - Optional hard time budget with truncation (`finish_reason = "length"`)
//! - Drift-free pacing against an injectable clock
//! - Registry updates and reloads published as atomic snapshots
//!
//! ## Usage
//!
//! ```bash
//! stream-mocker serve --port 8000 --config config.toml
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use stream_mocker::{
//!     openai::Message,
//!     plan_response, LengthPolicy, LengthTag, RegistrySnapshot, ResolvedRequest,
//! };
//!
//! let snapshot = RegistrySnapshot::builtin();
//! let request = ResolvedRequest::new("gpt-4", vec![Message::user("Hello!")])
//!     .with_length(LengthPolicy::Fixed(LengthTag::Short));
//! let plan = plan_response(&request, &snapshot).unwrap();
//! let completion = plan.complete();
//! println!("{} tokens at {} tok/s", completion.completion_tokens, plan.rate);
//! ```

// Core library modules
pub mod clock;
pub mod errors;
pub mod openai;
pub mod planner;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod speed;
pub mod stats;
pub mod stream;
pub mod tokens;

// HTTP server (for the `serve` command)
pub mod cli;

pub use clock::{Clock, ManualClock, SharedClock, TokioClock};
pub use errors::{ConfigError, PlanError};
pub use planner::{plan_response, plan_response_with, ResolvedRequest, ResponsePlan};
pub use registry::{ModelProfile, Registration, Registry, RegistrySnapshot, TimeLimits};
pub use scheduler::{
    run_complete, run_stream, Completion, Emission, FinishReason, StreamOutcome, StreamScheduler,
    StreamSummary, TimeBudget,
};
pub use selector::{AutoBand, AutoBands, CannedResponses, LengthPolicy, LengthTag, TokenPlan};
pub use stats::{new_shared_stats, SharedStats, Stats, StatsSnapshot};
pub use stream::{assemble_completion, ChatStream, ChatStreamBuilder};
pub use tokens::{estimate_prompt_tokens, estimate_tokens, split_tokens};
