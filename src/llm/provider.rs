use async_trait::async_trait;

use crate::errors::ScreenPilotResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Chat-completion backend. New backends only need to implement this trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (the `[llm.providers.<id>]` key).
    fn name(&self) -> &str;

    /// Run one chat completion and return the full reply, streamed or not.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> ScreenPilotResult<LlmResponse>;
}
