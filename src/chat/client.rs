//! Conversational backend seam.
//!
//! The real client lives outside this crate and carries its own retry
//! policy; here it is consumed as an opaque ask call. The one condition the
//! dispatcher must special-case is the distinguished
//! [`BanterError::ChatSessionRefresh`] rate-limit signal.

use crate::error::{BanterError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One answer from the conversational backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub message: String,
    pub conversation_id: String,
}

/// Trait for the conversational backend.
///
/// This trait allows swapping implementations (real backend vs mock).
/// Implementations hold mutable per-conversation state and are not safe
/// under concurrent use; callers serialize access.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Ask a question; `conversation_id` of `None` starts a new conversation.
    async fn ask(&self, prompt: &str, conversation_id: Option<&str>) -> Result<Answer>;
}

/// Scripted response for the mock client.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Answer(Answer),
    RateLimited,
    Failure(String),
}

/// Mock chat client for testing.
#[derive(Default)]
pub struct MockChatClient {
    responses: Mutex<VecDeque<MockResponse>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted response; responses are consumed in order.
    pub fn with_response(self, response: MockResponse) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
        self
    }

    /// Shorthand for a successful answer.
    pub fn with_answer(self, message: &str, conversation_id: &str) -> Self {
        self.with_response(MockResponse::Answer(Answer {
            message: message.to_string(),
            conversation_id: conversation_id.to_string(),
        }))
    }

    /// Prompts and conversation ids seen so far, in order.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn ask(&self, prompt: &str, conversation_id: Option<&str>) -> Result<Answer> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((prompt.to_string(), conversation_id.map(str::to_string)));
        }
        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        match response {
            Some(MockResponse::Answer(answer)) => Ok(answer),
            Some(MockResponse::RateLimited) => Err(BanterError::ChatSessionRefresh),
            Some(MockResponse::Failure(message)) => Err(BanterError::Chat { message }),
            None => Err(BanterError::Chat {
                message: "mock client has no scripted response".to_string(),
            }),
        }
    }
}
