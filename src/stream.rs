// Response Assembler Module
// Projects scheduler emissions onto the chat-completion wire shapes:
// a chunk stream (optionally SSE-framed) or a single completion record.

use crate::openai::{ChatCompletionChunk, ChatCompletionResponse, Usage};
use crate::scheduler::{Completion, Emission, EmissionStream, StreamSummary};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Final SSE event of every stream
pub const SSE_DONE: &str = "data: [DONE]\n\n";

type CompleteCallback = Box<dyn FnOnce(&StreamSummary) + Send>;
type CancelCallback = Box<dyn FnOnce(usize) + Send>;

/// Runs the cancel callback if the stream is dropped before it finishes
struct CancelGuard {
    callback: Option<CancelCallback>,
    emitted: usize,
}

impl CancelGuard {
    fn disarm(&mut self) {
        self.callback = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(self.emitted);
        }
    }
}

/// A paced chat-completion stream for one request
pub struct ChatStream {
    id: String,
    model: String,
    created: i64,
    prompt_tokens: usize,
    emissions: EmissionStream,
    on_complete: Option<CompleteCallback>,
    on_cancel: Option<CancelCallback>,
}

impl ChatStream {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wire chunks: one per emitted token (the first also carries the
    /// assistant role), the truncation message if any, then a terminal
    /// chunk with `finish_reason` and usage.
    pub fn into_chunk_stream(self) -> Pin<Box<dyn Stream<Item = ChatCompletionChunk> + Send>> {
        let ChatStream {
            id,
            model,
            created,
            prompt_tokens,
            mut emissions,
            mut on_complete,
            on_cancel,
        } = self;

        // Owned by the generator, so dropping the stream unpolled still reports
        let mut guard = CancelGuard {
            callback: on_cancel,
            emitted: 0,
        };

        Box::pin(stream! {
            let mut first = true;

            while let Some(emission) = emissions.next().await {
                match emission {
                    Emission::Token { text, .. } => {
                        guard.emitted += 1;
                        yield ChatCompletionChunk::new(id.clone(), model.clone(), created)
                            .with_content(text, first);
                        first = false;
                    }
                    Emission::Truncation { text, .. } => {
                        yield ChatCompletionChunk::new(id.clone(), model.clone(), created)
                            .with_content(text, first);
                        first = false;
                    }
                    Emission::Finished(summary) => {
                        guard.disarm();
                        if let Some(callback) = on_complete.take() {
                            callback(&summary);
                        }
                        let usage = Usage::new(prompt_tokens, summary.completion_tokens);
                        yield ChatCompletionChunk::new(id.clone(), model.clone(), created)
                            .with_finish(summary.finish_reason())
                            .with_usage(usage);
                    }
                }
            }
        })
    }

    /// Server-Sent Events framing of [`Self::into_chunk_stream`], ending
    /// with `data: [DONE]`.
    pub fn into_sse_stream(self) -> Pin<Box<dyn Stream<Item = String> + Send>> {
        let mut chunks = self.into_chunk_stream();
        Box::pin(stream! {
            while let Some(chunk) = chunks.next().await {
                yield format_sse(&chunk);
            }
            yield SSE_DONE.to_string();
        })
    }
}

/// Format a chunk as Server-Sent Event
pub fn format_sse(chunk: &ChatCompletionChunk) -> String {
    let json = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}

/// Builder for chat streams
pub struct ChatStreamBuilder {
    id: Option<String>,
    created: Option<i64>,
    model: String,
    prompt_tokens: usize,
    emissions: EmissionStream,
    on_complete: Option<CompleteCallback>,
    on_cancel: Option<CancelCallback>,
}

impl ChatStreamBuilder {
    pub fn new(model: impl Into<String>, emissions: EmissionStream) -> Self {
        Self {
            id: None,
            created: None,
            model: model.into(),
            prompt_tokens: 0,
            emissions,
            on_complete: None,
            on_cancel: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn created(mut self, created: i64) -> Self {
        self.created = Some(created);
        self
    }

    pub fn prompt_tokens(mut self, prompt_tokens: usize) -> Self {
        self.prompt_tokens = prompt_tokens;
        self
    }

    /// Called once with the final summary, before the terminal chunk
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&StreamSummary) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Called with the number of emitted tokens if the stream is dropped
    /// before its terminal chunk
    pub fn on_cancel<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(usize) + Send + 'static,
    {
        self.on_cancel = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> ChatStream {
        ChatStream {
            id: self.id.unwrap_or_else(new_completion_id),
            model: self.model,
            created: self
                .created
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            prompt_tokens: self.prompt_tokens,
            emissions: self.emissions,
            on_complete: self.on_complete,
            on_cancel: self.on_cancel,
        }
    }
}

pub fn new_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

/// Single-record response for a non-streaming request
pub fn assemble_completion(
    model: impl Into<String>,
    completion: Completion,
    prompt_tokens: usize,
) -> ChatCompletionResponse {
    let usage = Usage::new(prompt_tokens, completion.completion_tokens);
    let finish_reason = completion.finish_reason();
    ChatCompletionResponse::new(model.into(), completion.content, finish_reason, usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::openai::Role;
    use crate::scheduler::{run_complete, run_stream, FinishReason, StreamOutcome, TimeBudget};
    use crate::selector::{CannedResponses, LengthTag, TokenPlan};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn short_plan() -> TokenPlan {
        let body = CannedResponses::builtin();
        let short = body.get(LengthTag::Short).unwrap();
        TokenPlan::new(short.tokens().to_vec(), LengthTag::Short).unwrap()
    }

    fn chat_stream(plan: TokenPlan, rate: f64, budget: TimeBudget) -> ChatStreamBuilder {
        let emissions = run_stream(plan, rate, budget, ManualClock::new().shared());
        ChatStreamBuilder::new("gpt-4", emissions)
            .id("chatcmpl-test")
            .created(1_700_000_000)
            .prompt_tokens(9)
    }

    fn collect_chunks(stream: ChatStream) -> Vec<ChatCompletionChunk> {
        tokio_test::block_on(stream.into_chunk_stream().collect())
    }

    fn joined(chunks: &[ChatCompletionChunk]) -> String {
        chunks.iter().filter_map(|chunk| chunk.content()).collect()
    }

    #[test]
    fn test_gpt4_short_stream_shape() {
        let plan = short_plan();
        let content = plan.content();
        let chunks = collect_chunks(chat_stream(plan, 5.0, TimeBudget::unlimited()).build());

        assert_eq!(chunks.len(), 26);
        assert_eq!(chunks[0].choices[0].delta.role, Some(Role::Assistant));
        assert!(chunks[1..]
            .iter()
            .all(|chunk| chunk.choices[0].delta.role.is_none()));
        assert!(chunks[..25]
            .iter()
            .all(|chunk| chunk.finish_reason().is_none() && chunk.usage.is_none()));
        assert_eq!(joined(&chunks), content);

        let last = chunks.last().unwrap();
        assert_eq!(last.content(), None);
        assert_eq!(last.finish_reason(), Some(FinishReason::Stop));
        assert_eq!(last.usage, Some(Usage::new(9, 25)));
        assert!(chunks.iter().all(|chunk| chunk.id == "chatcmpl-test"));
    }

    #[test]
    fn test_truncated_stream_shape() {
        let budget = TimeBudget::limited(Duration::from_secs(2), " [time limit]");
        let chunks = collect_chunks(chat_stream(short_plan(), 5.0, budget).build());

        // 10 tokens, the truncation message, the terminal chunk
        assert_eq!(chunks.len(), 12);
        assert_eq!(chunks[10].content(), Some(" [time limit]"));
        let last = chunks.last().unwrap();
        assert_eq!(last.finish_reason(), Some(FinishReason::Length));
        assert_eq!(last.usage.map(|usage| usage.completion_tokens), Some(10));
    }

    #[test]
    fn test_stream_matches_non_streaming_response() {
        let budget = TimeBudget::limited(Duration::from_secs(3), "\n\n[cut]");
        let plan = short_plan();

        let response = assemble_completion("gpt-4", run_complete(&plan, 5.0, &budget), 9);
        let chunks = collect_chunks(chat_stream(plan, 5.0, budget).build());

        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some(joined(&chunks).as_str())
        );
        assert_eq!(response.usage, chunks.last().and_then(|chunk| chunk.usage));
        assert_eq!(
            response.choices[0].finish_reason,
            chunks.last().and_then(|chunk| chunk.finish_reason())
        );
    }

    #[test]
    fn test_sse_framing() {
        let frames: Vec<String> = tokio_test::block_on(
            chat_stream(short_plan(), 5.0, TimeBudget::unlimited())
                .build()
                .into_sse_stream()
                .collect(),
        );

        assert_eq!(frames.len(), 27);
        assert!(frames[..26]
            .iter()
            .all(|frame| frame.starts_with("data: {") && frame.ends_with("\n\n")));
        assert!(frames[0].contains("\"role\":\"assistant\""));
        assert!(frames[25].contains("\"finish_reason\":\"stop\""));
        assert!(frames[25].contains("\"total_tokens\":34"));
        assert_eq!(frames.last().map(String::as_str), Some(SSE_DONE));
    }

    #[test]
    fn test_format_sse() {
        let chunk = ChatCompletionChunk::new("id".to_string(), "gpt-4".to_string(), 1)
            .with_content("Hello".to_string(), false);
        let sse = format_sse(&chunk);
        assert!(sse.starts_with("data: "));
        assert!(sse.ends_with("\n\n"));
        assert!(sse.contains("\"content\":\"Hello\""));
    }

    #[test]
    fn test_complete_callback_receives_summary() {
        let seen = Arc::new(Mutex::new(None));
        let cancelled = Arc::new(AtomicUsize::new(0));
        let stream = {
            let seen = Arc::clone(&seen);
            let cancelled = Arc::clone(&cancelled);
            chat_stream(short_plan(), 5.0, TimeBudget::unlimited())
                .on_complete(move |summary| {
                    *seen.lock().unwrap() = Some(*summary);
                })
                .on_cancel(move |_| {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                })
                .build()
        };
        collect_chunks(stream);

        let summary = seen.lock().unwrap().expect("summary recorded");
        assert_eq!(summary.outcome, StreamOutcome::Completed);
        assert_eq!(summary.completion_tokens, 25);
        assert_eq!(summary.elapsed, Duration::from_secs(5));
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropped_stream_reports_cancellation() {
        let cancelled_at = Arc::new(Mutex::new(None));
        let completed = Arc::new(AtomicUsize::new(0));
        let stream = {
            let cancelled_at = Arc::clone(&cancelled_at);
            let completed = Arc::clone(&completed);
            chat_stream(short_plan(), 5.0, TimeBudget::unlimited())
                .on_complete(move |_| {
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .on_cancel(move |emitted| {
                    *cancelled_at.lock().unwrap() = Some(emitted);
                })
                .build()
        };

        let first: Vec<ChatCompletionChunk> =
            tokio_test::block_on(stream.into_chunk_stream().take(4).collect());
        assert_eq!(first.len(), 4);
        assert_eq!(*cancelled_at.lock().unwrap(), Some(4));
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unpolled_stream_reports_cancellation() {
        let cancelled_at = Arc::new(Mutex::new(None));
        let stream = {
            let cancelled_at = Arc::clone(&cancelled_at);
            chat_stream(short_plan(), 5.0, TimeBudget::unlimited())
                .on_cancel(move |emitted| {
                    *cancelled_at.lock().unwrap() = Some(emitted);
                })
                .build()
        };

        drop(stream.into_sse_stream());
        assert_eq!(*cancelled_at.lock().unwrap(), Some(0));
    }

    #[test]
    fn test_generated_ids() {
        let emissions = run_stream(
            short_plan(),
            5.0,
            TimeBudget::unlimited(),
            ManualClock::new().shared(),
        );
        let stream = ChatStreamBuilder::new("gpt-4", emissions).build();
        assert!(stream.id().starts_with("chatcmpl-"));
    }
}
