// OpenAI API Types
// These types are designed to be compatible with the OpenAI Chat Completions API,
// extended with the mocker's response-shaping request fields.

use crate::scheduler::FinishReason;
use serde::{Deserialize, Serialize};

/// Owner reported for every model in the model list
pub const OWNED_BY: &str = "stream-mocker";

/// Role of a message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            name: None,
        }
    }
}

/// Stop condition for generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopCondition {
    Single(String),
    Multiple(Vec<String>),
}

/// Chat completion request
///
/// Sampling parameters are accepted for compatibility and ignored. The
/// response shape is controlled by `response_length`, `duration_seconds`
/// and `max_stream_time_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// short, medium, long, very_long, random or auto
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<String>,
    /// Target streaming duration; takes precedence over `response_length`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Per-request time budget, enables truncation for this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stream_time_seconds: Option<f64>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            top_p: None,
            n: None,
            stream: false,
            stop: None,
            max_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
            user: None,
            response_length: None,
            duration_seconds: None,
            max_stream_time_seconds: None,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        let prompt_tokens = prompt_tokens as u32;
        let completion_tokens = completion_tokens as u32;
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A choice in the completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<FinishReason>,
}

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    pub fn new(model: String, content: String, finish_reason: FinishReason, usage: Usage) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: Some(finish_reason),
            }],
            usage: Some(usage),
        }
    }
}

/// Delta content in streaming response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A choice in streaming response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

/// Streaming chat completion chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    pub fn new(id: String, model: String, created: i64) -> Self {
        Self {
            id,
            object: "chat.completion.chunk".to_string(),
            created,
            model,
            choices: vec![],
            usage: None,
        }
    }

    /// Incremental content; the first chunk of a stream also announces the role.
    pub fn with_content(mut self, content: String, announce_role: bool) -> Self {
        self.choices = vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: announce_role.then_some(Role::Assistant),
                content: Some(content),
            },
            finish_reason: None,
        }];
        self
    }

    pub fn with_finish(mut self, reason: FinishReason) -> Self {
        self.choices = vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some(reason),
        }];
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Content carried by this chunk, if any
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }

    /// Finish reason carried by this chunk, if any
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.choices.first().and_then(|choice| choice.finish_reason)
    }
}

/// OpenAI-style error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.into(),
                param: None,
                code: None,
            },
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error.code = Some(code.into());
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.error.param = Some(param.into());
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(message, "invalid_request_error")
    }

    pub fn model_not_found(model: &str) -> Self {
        Self::invalid_request(format!("The model '{}' does not exist", model))
            .with_param("model")
            .with_code("model_not_found")
    }
}

/// Model object returned by /v1/models endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "model".to_string(),
            created: chrono::Utc::now().timestamp(),
            owned_by: OWNED_BY.to_string(),
            description: Some(description.into()),
        }
    }
}

/// Response for /v1/models endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<Model>,
}

impl ModelsResponse {
    pub fn new(models: Vec<Model>) -> Self {
        Self {
            object: "list".to_string(),
            data: models,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("Hello, world!");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"Hello, world!\""));
    }

    #[test]
    fn test_chat_request_deserialization() {
        let json = r#"{
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": "Hello!"}
            ],
            "temperature": 0.7,
            "stream": true,
            "response_length": "short",
            "max_stream_time_seconds": 2.5
        }"#;

        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, Some(0.7));
        assert!(request.stream);
        assert_eq!(request.response_length.as_deref(), Some("short"));
        assert_eq!(request.duration_seconds, None);
        assert_eq!(request.max_stream_time_seconds, Some(2.5));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let json = r#"{"model": "gpt-4", "messages": [{"role": "robot", "content": "hi"}]}"#;
        assert!(serde_json::from_str::<ChatCompletionRequest>(json).is_err());
    }

    #[test]
    fn test_chat_response_serialization() {
        let response = ChatCompletionResponse::new(
            "gpt-4".to_string(),
            "Hello! How can I help you?".to_string(),
            FinishReason::Length,
            Usage::new(10, 20),
        );

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"object\":\"chat.completion\""));
        assert!(json.contains("\"model\":\"gpt-4\""));
        assert!(json.contains("\"finish_reason\":\"length\""));
        assert!(json.contains(
            "\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":20,\"total_tokens\":30}"
        ));
    }

    #[test]
    fn test_content_chunk_serialization() {
        let chunk =
            ChatCompletionChunk::new("chatcmpl-test".to_string(), "gpt-4".to_string(), 1234567890)
                .with_content("Hello".to_string(), false);

        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"object\":\"chat.completion.chunk\""));
        assert!(json.contains("\"delta\":{\"content\":\"Hello\"}"));
        assert!(json.contains("\"finish_reason\":null"));
        assert!(!json.contains("usage"));
    }

    #[test]
    fn test_first_chunk_announces_role() {
        let chunk = ChatCompletionChunk::new("id".to_string(), "gpt-4".to_string(), 0)
            .with_content("Hi".to_string(), true);
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"delta\":{\"role\":\"assistant\",\"content\":\"Hi\"}"));
    }

    #[test]
    fn test_finish_chunk_has_empty_delta() {
        let chunk = ChatCompletionChunk::new("id".to_string(), "gpt-4".to_string(), 0)
            .with_finish(FinishReason::Stop)
            .with_usage(Usage::new(3, 4));
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"delta\":{}"));
        assert!(json.contains("\"finish_reason\":\"stop\""));
        assert!(json.contains("\"total_tokens\":7"));
        assert_eq!(chunk.content(), None);
        assert_eq!(chunk.finish_reason(), Some(FinishReason::Stop));
    }

    #[test]
    fn test_model_not_found_error() {
        let error = ErrorResponse::model_not_found("gpt-9");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"type\":\"invalid_request_error\""));
        assert!(json.contains("\"code\":\"model_not_found\""));
        assert!(json.contains("gpt-9"));
    }

    #[test]
    fn test_models_response() {
        let models = vec![
            Model::new("gpt-4", "Slow flagship"),
            Model::new("gpt-3.5-turbo", "Fast"),
        ];
        let response = ModelsResponse::new(models);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"object\":\"list\""));
        assert!(json.contains("\"id\":\"gpt-4\""));
        assert!(json.contains("\"owned_by\":\"stream-mocker\""));
    }
}
