//! Language model contract used by the appliers.
//!
//! The crate does not speak any provider protocol. Embedding applications
//! implement [`LlmService`] for their client; the crate ships [`OfflineLlm`],
//! which always fails so every applier takes its deterministic fallback, and
//! [`ScriptedLlm`], which replays queued replies.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextCompletion {
    pub text: String,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonCompletion {
    pub value: JsonValue,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM unavailable: {0}")]
    Unavailable(String),
    #[error("LLM provider error: {0}")]
    Provider(String),
    #[error("LLM returned an unusable response: {0}")]
    InvalidResponse(String),
}

pub trait LlmService {
    fn provider(&self) -> &str;

    fn complete_text(
        &self,
        messages: &[Message],
        model: &str,
        temperature: Option<f32>,
    ) -> Result<TextCompletion, LlmError>;

    fn complete_json(
        &self,
        messages: &[Message],
        model: &str,
        schema: Option<&JsonValue>,
    ) -> Result<JsonCompletion, LlmError>;
}

/// Always unavailable.
#[derive(Debug, Clone)]
pub struct OfflineLlm {
    provider: String,
}

impl OfflineLlm {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl LlmService for OfflineLlm {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn complete_text(
        &self,
        _messages: &[Message],
        model: &str,
        _temperature: Option<f32>,
    ) -> Result<TextCompletion, LlmError> {
        Err(LlmError::Unavailable(format!(
            "no client configured for {}/{}",
            self.provider, model
        )))
    }

    fn complete_json(
        &self,
        _messages: &[Message],
        model: &str,
        _schema: Option<&JsonValue>,
    ) -> Result<JsonCompletion, LlmError> {
        Err(LlmError::Unavailable(format!(
            "no client configured for {}/{}",
            self.provider, model
        )))
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Json(JsonValue),
    Fail(LlmError),
}

/// Replays queued replies in order, one per call. An empty queue behaves
/// like [`OfflineLlm`]. A `Text` reply served to `complete_json` is parsed as
/// JSON; a `Json` reply served to `complete_text` is returned serialized.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    provider: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: ScriptedReply) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(reply);
        self
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push(ScriptedReply::Text(text.into()))
    }

    pub fn push_json(&self, value: JsonValue) -> &Self {
        self.push(ScriptedReply::Json(value))
    }

    pub fn push_failure(&self, error: LlmError) -> &Self {
        self.push(ScriptedReply::Fail(error))
    }

    /// Message lists received so far, in call order.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn next(&self, messages: &[Message]) -> Option<ScriptedReply> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(messages.to_vec());
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

fn estimate(messages: &[Message]) -> i64 {
    messages
        .iter()
        .map(|m| crate::core::trace::estimate_tokens(&m.content))
        .sum()
}

impl LlmService for ScriptedLlm {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn complete_text(
        &self,
        messages: &[Message],
        _model: &str,
        _temperature: Option<f32>,
    ) -> Result<TextCompletion, LlmError> {
        let text = match self.next(messages) {
            Some(ScriptedReply::Text(text)) => text,
            Some(ScriptedReply::Json(value)) => value.to_string(),
            Some(ScriptedReply::Fail(err)) => return Err(err),
            None => return Err(LlmError::Unavailable("script exhausted".to_string())),
        };
        Ok(TextCompletion {
            input_tokens: Some(estimate(messages)),
            output_tokens: Some(crate::core::trace::estimate_tokens(&text)),
            text,
        })
    }

    fn complete_json(
        &self,
        messages: &[Message],
        _model: &str,
        _schema: Option<&JsonValue>,
    ) -> Result<JsonCompletion, LlmError> {
        let value = match self.next(messages) {
            Some(ScriptedReply::Json(value)) => value,
            Some(ScriptedReply::Text(text)) => serde_json::from_str(&text)
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?,
            Some(ScriptedReply::Fail(err)) => return Err(err),
            None => return Err(LlmError::Unavailable("script exhausted".to_string())),
        };
        Ok(JsonCompletion {
            input_tokens: Some(estimate(messages)),
            output_tokens: Some(crate::core::trace::estimate_tokens(&value.to_string())),
            value,
        })
    }
}
