// Response Planner Module
// Turns a request and a registry snapshot into everything the scheduler
// needs: the token plan, the emission rate and the effective time budget.

use crate::clock::SharedClock;
use crate::errors::PlanError;
use crate::openai::{ChatCompletionRequest, Message};
use crate::registry::RegistrySnapshot;
use crate::scheduler::{run_complete, run_stream, Completion, EmissionStream, TimeBudget};
use crate::selector::{LengthPolicy, ResponseSelector, TokenPlan};
use crate::tokens::estimate_prompt_tokens;
use rand::Rng;

/// A request reduced to the fields planning depends on
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub model: String,
    /// `None` falls back to the registry's default policy
    pub length: Option<LengthPolicy>,
    /// Per-request time budget in seconds
    pub time_budget_override: Option<f64>,
    pub messages: Vec<Message>,
}

impl ResolvedRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            length: None,
            time_budget_override: None,
            messages,
        }
    }

    pub fn with_length(mut self, policy: LengthPolicy) -> Self {
        self.length = Some(policy);
        self
    }

    pub fn with_time_budget(mut self, seconds: f64) -> Self {
        self.time_budget_override = Some(seconds);
        self
    }

    /// Validate and resolve a wire request. `duration_seconds` wins over
    /// `response_length` when both are given.
    pub fn from_chat_request(request: &ChatCompletionRequest) -> Result<Self, PlanError> {
        if request.messages.is_empty() {
            return Err(PlanError::invalid_param(
                "messages",
                "messages must contain at least one message",
            ));
        }

        let length = match (request.duration_seconds, request.response_length.as_deref()) {
            (Some(seconds), _) => Some(LengthPolicy::duration(seconds)?),
            (None, Some(tag)) => Some(tag.parse()?),
            (None, None) => None,
        };

        Ok(Self {
            model: request.model.clone(),
            length,
            time_budget_override: request.max_stream_time_seconds,
            messages: request.messages.clone(),
        })
    }
}

/// Everything fixed at planning time for one response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePlan {
    pub model: String,
    pub policy: LengthPolicy,
    pub tokens: TokenPlan,
    /// Tokens per second
    pub rate: f64,
    pub time_budget: TimeBudget,
    pub prompt_tokens: usize,
    /// Registry version the plan was resolved against
    pub registry_version: u64,
}

impl ResponsePlan {
    /// Whether the plan cannot finish inside its time budget
    pub fn will_truncate(&self) -> bool {
        self.time_budget
            .token_allowance(self.rate)
            .is_some_and(|allowed| allowed < self.tokens.len())
    }

    /// Non-streaming result
    pub fn complete(&self) -> Completion {
        run_complete(&self.tokens, self.rate, &self.time_budget)
    }

    /// Start the paced stream; consumes the plan.
    pub fn into_stream(self, clock: SharedClock) -> EmissionStream {
        run_stream(self.tokens, self.rate, self.time_budget, clock)
    }
}

/// Plan a response using the thread-local RNG for `random` lengths
pub fn plan_response(
    request: &ResolvedRequest,
    snapshot: &RegistrySnapshot,
) -> Result<ResponsePlan, PlanError> {
    plan_response_with(request, snapshot, &mut rand::rng())
}

/// Plan a response with an explicit RNG
pub fn plan_response_with<R: Rng + ?Sized>(
    request: &ResolvedRequest,
    snapshot: &RegistrySnapshot,
    rng: &mut R,
) -> Result<ResponsePlan, PlanError> {
    snapshot.ensure_accepted(&request.model)?;

    let rate = snapshot.resolve_rate(&request.model);
    let time_budget = snapshot.time_budget(&request.model, request.time_budget_override)?;
    let policy = request.length.unwrap_or_else(|| snapshot.default_length());
    let tokens = ResponseSelector::new(snapshot.responses(), snapshot.auto_bands())
        .select(policy, rate, rng)?;
    let prompt_tokens = estimate_prompt_tokens(&request.messages);

    let plan = ResponsePlan {
        model: request.model.clone(),
        policy,
        tokens,
        rate,
        time_budget,
        prompt_tokens,
        registry_version: snapshot.version(),
    };

    tracing::debug!(
        model = %plan.model,
        %policy,
        source = %plan.tokens.source(),
        tokens = plan.tokens.len(),
        rate,
        budget_secs = plan.time_budget.limit().map(|limit| limit.as_secs_f64()),
        will_truncate = plan.will_truncate(),
        "Response planned"
    );

    Ok(plan)
}
