// OpenAI-Compatible Wire Module
// Request, response, chunk and error shapes of the Chat Completions API.
// Reference: https://platform.openai.com/docs/api-reference/chat

mod types;

pub use types::*;
