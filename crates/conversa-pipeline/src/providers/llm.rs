//! LLM adapter contract
//!
//! The LLM adapter streams a response as a sequence of deltas, optionally
//! interleaved with tool calls the caller must resolve and feed back before
//! the stream can continue. The reference provider never calls out to a
//! real model: it deterministically echoes the latest user turn, word by
//! word, and triggers a tool call when the transcript contains a recognised
//! trigger phrase, which is enough to exercise the full tool-call round
//! trip in tests.

use crate::context::Context;
use crate::error::ProviderError;
use crate::frame::{ToolCall, ToolResult};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

#[derive(Debug, Clone)]
pub enum LlmEvent {
    TextDelta(String),
    ToolCall(ToolCall),
    Done,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin a streaming completion over the given context. The returned
    /// stream yields deltas until a `ToolCall` (at which point the caller
    /// must resolve it and call `resume` with the result) or `Done`.
    async fn stream(&self, context: &Context) -> Result<BoxStream<'static, LlmEvent>, ProviderError>;

    /// Continue a stream after a tool call has been resolved.
    async fn resume(&self, context: &Context, result: ToolResult) -> Result<BoxStream<'static, LlmEvent>, ProviderError>;
}

/// Deterministic reference provider. If the latest user entry contains the
/// word "time", it issues a `get_time` tool call; if it contains "wave", it
/// issues an `execute_movement` tool call; otherwise it echoes the user's
/// text back word by word, prefixed to make the echo obviously synthetic
/// rather than confusable with a real model response.
pub struct ReferenceLlmProvider;

const TIME_CALL_ID: &str = "ref-call-1";
const MOVEMENT_CALL_ID: &str = "ref-call-2";

fn last_user_text(context: &Context) -> String {
    context
        .entries()
        .iter()
        .rev()
        .find(|e| e.role == crate::context::Role::User)
        .map(|e| e.text.clone())
        .unwrap_or_default()
}

fn word_stream(words: Vec<String>) -> BoxStream<'static, LlmEvent> {
    Box::pin(async_stream::stream! {
        for word in words {
            yield LlmEvent::TextDelta(format!("{word} "));
        }
        yield LlmEvent::Done;
    })
}

#[async_trait]
impl LlmProvider for ReferenceLlmProvider {
    fn name(&self) -> &'static str {
        "reference"
    }

    async fn stream(&self, context: &Context) -> Result<BoxStream<'static, LlmEvent>, ProviderError> {
        let user_text = last_user_text(context);
        let lower = user_text.to_lowercase();
        if lower.contains("time") {
            let call = ToolCall { call_id: TIME_CALL_ID.into(), name: "get_time".into(), args: serde_json::json!({}) };
            return Ok(Box::pin(async_stream::stream! {
                yield LlmEvent::ToolCall(call);
            }));
        }
        if lower.contains("wave") {
            let call = ToolCall {
                call_id: MOVEMENT_CALL_ID.into(),
                name: "execute_movement".into(),
                args: serde_json::json!({ "gestures": ["wave_right"] }),
            };
            return Ok(Box::pin(async_stream::stream! {
                yield LlmEvent::ToolCall(call);
            }));
        }
        let words: Vec<String> = format!("you said: {user_text}").split_whitespace().map(String::from).collect();
        Ok(word_stream(words))
    }

    async fn resume(&self, _context: &Context, result: ToolResult) -> Result<BoxStream<'static, LlmEvent>, ProviderError> {
        let text = match (result.call_id.as_str(), result.outcome) {
            (_, crate::frame::ToolOutcome::Error(e)) => format!("i couldn't do that: {e}"),
            (MOVEMENT_CALL_ID, crate::frame::ToolOutcome::Value(_)) => "done, I waved at you".to_string(),
            (_, crate::frame::ToolOutcome::Value(v)) => format!("the time is {v}"),
        };
        let words: Vec<String> = text.split_whitespace().map(String::from).collect();
        Ok(word_stream(words))
    }
}
