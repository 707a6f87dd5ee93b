//! Stream scheduler: the pacing core.
//!
//! Walks a [`TokenPlan`] at a fixed emission rate against a [`Clock`],
//! enforces an optional [`TimeBudget`], and reports a single terminal
//! [`StreamSummary`] once the final emission count is known.
//!
//! Token `k` is due at `k / rate` seconds after the stream starts. The
//! scheduler sleeps until each absolute due time rather than for a fixed
//! interval, so a late wake-up shortens the next wait instead of pushing
//! every later token back.
//!
//! A token is emitted only if it fits entirely inside the budget, i.e.
//! `(k + 1) / rate <= limit`, which yields `floor(limit * rate)` tokens for
//! any over-long plan. The wall-clock deadline is also checked before each
//! emission so a stalled consumer cannot push tokens past it.

use crate::clock::SharedClock;
use crate::selector::TokenPlan;
use async_stream::stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

/// Appended to truncated responses unless configured otherwise
pub const DEFAULT_TRUNCATION_MESSAGE: &str = "\n\nI've reached the response time limit, but I hope this information helps. Let me know if you need more details.";

/// Absorbs float representation error in `limit * rate` (e.g. 2.9999999999)
const ALLOWANCE_EPSILON: f64 = 1e-9;

/// Why generation stopped, as reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamOutcome {
    /// Every planned token was emitted
    Completed,
    /// The time budget cut the plan short
    Truncated,
}

impl StreamOutcome {
    pub fn finish_reason(&self) -> FinishReason {
        match self {
            StreamOutcome::Completed => FinishReason::Stop,
            StreamOutcome::Truncated => FinishReason::Length,
        }
    }
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOutcome::Completed => f.write_str("completed"),
            StreamOutcome::Truncated => f.write_str("truncated"),
        }
    }
}

/// Hard ceiling on a response's streaming time
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBudget {
    limit: Option<Duration>,
    truncation_message: String,
}

impl TimeBudget {
    /// No ceiling
    pub fn unlimited() -> Self {
        Self {
            limit: None,
            truncation_message: DEFAULT_TRUNCATION_MESSAGE.to_string(),
        }
    }

    pub fn limited(limit: Duration, truncation_message: impl Into<String>) -> Self {
        Self {
            limit: Some(limit),
            truncation_message: truncation_message.into(),
        }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn is_enabled(&self) -> bool {
        self.limit.is_some()
    }

    pub fn truncation_message(&self) -> &str {
        &self.truncation_message
    }

    /// Number of tokens that fit in the budget at `rate`: `floor(limit * rate)`
    pub fn token_allowance(&self, rate: f64) -> Option<usize> {
        self.limit.map(|limit| {
            let tokens = (limit.as_secs_f64() * rate + ALLOWANCE_EPSILON).floor();
            if tokens.is_finite() && tokens > 0.0 {
                tokens as usize
            } else if tokens > 0.0 {
                usize::MAX
            } else {
                0
            }
        })
    }
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Due time of one planned token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionSlot {
    pub index: usize,
    /// Offset from stream start
    pub offset: Duration,
}

/// Offset of the `index`-th emission at `rate` tokens per second.
/// Saturates at `Duration::MAX`.
pub fn emission_offset(index: usize, rate: f64) -> Duration {
    let seconds = index as f64 / rate;
    if seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// One step of a running stream
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// A planned token, emitted at its due time
    Token {
        index: usize,
        offset: Duration,
        text: String,
    },
    /// The truncation message, emitted once when the budget runs out
    Truncation { offset: Duration, text: String },
    /// Always the last item
    Finished(StreamSummary),
}

/// Final accounting of a stream, computed after the last emission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSummary {
    pub outcome: StreamOutcome,
    /// Plan tokens actually emitted; the truncation message is not counted
    pub completion_tokens: usize,
    pub planned_tokens: usize,
    pub elapsed: Duration,
}

impl StreamSummary {
    pub fn finish_reason(&self) -> FinishReason {
        self.outcome.finish_reason()
    }
}

pub type EmissionStream = Pin<Box<dyn Stream<Item = Emission> + Send>>;

/// Single-use pacing driver for one response
pub struct StreamScheduler {
    tokens: Vec<String>,
    rate: f64,
    budget: TimeBudget,
    clock: SharedClock,
}

impl StreamScheduler {
    /// `rate` must be positive; the registry never resolves anything else.
    pub fn new(plan: TokenPlan, rate: f64, budget: TimeBudget, clock: SharedClock) -> Self {
        debug_assert!(rate.is_finite() && rate > 0.0, "invalid rate {rate}");
        Self {
            tokens: plan.into_tokens(),
            rate,
            budget,
            clock,
        }
    }

    /// Due time of every planned token, ignoring the budget
    pub fn emission_plan(&self) -> Vec<EmissionSlot> {
        (0..self.tokens.len())
            .map(|index| EmissionSlot {
                index,
                offset: emission_offset(index, self.rate),
            })
            .collect()
    }

    /// Run the schedule. Dropping the stream cancels it: no further
    /// waits or emissions happen after the consumer lets go.
    pub fn into_stream(self) -> EmissionStream {
        let StreamScheduler {
            mut tokens,
            rate,
            budget,
            clock,
        } = self;

        Box::pin(stream! {
            let planned = tokens.len();
            let allowance = budget.token_allowance(rate);
            let start = clock.now();
            // A deadline past the end of representable time never arrives
            let deadline = budget.limit().and_then(|limit| start.checked_add(limit));
            let mut emitted = 0usize;

            let outcome = loop {
                let offset = emission_offset(emitted, rate);
                clock.sleep_until(start.saturating_add(offset)).await;

                if emitted == planned {
                    break StreamOutcome::Completed;
                }

                let now = clock.now();
                let over_allowance = allowance.is_some_and(|allowed| emitted >= allowed);
                let past_deadline = deadline.is_some_and(|deadline| now >= deadline);
                if over_allowance || past_deadline {
                    tracing::debug!(
                        emitted,
                        planned,
                        rate,
                        past_deadline,
                        "Time budget exhausted, truncating stream"
                    );
                    let message = budget.truncation_message();
                    if !message.is_empty() {
                        yield Emission::Truncation {
                            offset: now.saturating_sub(start),
                            text: message.to_string(),
                        };
                    }
                    break StreamOutcome::Truncated;
                }

                let text = std::mem::take(&mut tokens[emitted]);
                yield Emission::Token {
                    index: emitted,
                    offset,
                    text,
                };
                emitted += 1;
            };

            let elapsed = clock.now().saturating_sub(start);
            yield Emission::Finished(StreamSummary {
                outcome,
                completion_tokens: emitted,
                planned_tokens: planned,
                elapsed,
            });
        })
    }
}

/// Start a paced stream for `plan`
pub fn run_stream(
    plan: TokenPlan,
    rate: f64,
    budget: TimeBudget,
    clock: SharedClock,
) -> EmissionStream {
    StreamScheduler::new(plan, rate, budget, clock).into_stream()
}

/// Result of a non-streaming response
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub outcome: StreamOutcome,
    pub completion_tokens: usize,
}

impl Completion {
    pub fn finish_reason(&self) -> FinishReason {
        self.outcome.finish_reason()
    }
}

/// Non-streaming equivalent of [`run_stream`].
///
/// No waiting: the truncation point is decided up front from the plan's
/// total emission time, giving the same content and accounting a stream
/// of the same plan would produce.
pub fn run_complete(plan: &TokenPlan, rate: f64, budget: &TimeBudget) -> Completion {
    let planned = plan.len();
    let (emitted, outcome) = match budget.token_allowance(rate) {
        Some(allowed) if allowed < planned => (allowed, StreamOutcome::Truncated),
        _ => (planned, StreamOutcome::Completed),
    };

    let mut content = plan.tokens()[..emitted].concat();
    if outcome == StreamOutcome::Truncated {
        tracing::debug!(emitted, planned, rate, "Time budget exceeded, truncating completion");
        content.push_str(budget.truncation_message());
    }

    Completion {
        content,
        outcome,
        completion_tokens: emitted,
    }
}
