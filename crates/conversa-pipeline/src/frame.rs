//! Frame types
//!
//! A `Frame` is the unit of inter-stage communication. Every variant carries
//! the `session_id` it belongs to; frames tied to a specific exchange also
//! carry a `turn_id`. Bulk-payload variants (audio) own their bytes outright
//! so they move rather than copy across queue boundaries; control and metric
//! variants are cheap to clone because observers need to see them without
//! taking them out of the main flow.

use crate::handle::{SessionId, TurnId};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

pub type Timestamp = SystemTime;

/// PCM16 audio captured from the peer microphone, already resampled to the
/// canonical 16 kHz mono rate STT adapters expect.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub session_id: SessionId,
    pub pcm16: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u8,
    pub t_capture: Timestamp,
}

/// PCM16 audio produced by TTS, resampled to the negotiated transport rate.
#[derive(Debug, Clone)]
pub struct AudioOutput {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub pcm16: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u8,
    pub t_emit: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptReason {
    BargeIn,
    ClientRequest,
    SessionClosing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    SttTtfb,
    LlmTtfb,
    TtsTtfb,
    MemoryRecallMs,
    TotalMs,
    GateSuppress,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransientNetwork,
    ProviderUnavailable,
    BadInput,
    PolicyViolation,
    DeadlineExceeded,
    InternalInvariant,
}

/// A tool-call request emitted by the LLM adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// The resolved outcome of a `ToolCall`, fed back into the LLM context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolOutcome {
    Value(serde_json::Value),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub outcome: ToolOutcome,
}

/// The full frame taxonomy. Stages select on tag; an unrecognised tag
/// arriving over a boundary that deserializes frames must be logged and
/// dropped, never treated as a crash.
#[derive(Debug, Clone)]
pub enum Frame {
    AudioInput(AudioInput),
    AudioOutput(AudioOutput),
    UserSpeechStarted { session_id: SessionId, t: Timestamp },
    UserSpeechStopped { session_id: SessionId, t: Timestamp },
    SttInterim { session_id: SessionId, text: String, speaker_id: Option<String>, t: Timestamp },
    SttFinal { session_id: SessionId, turn_id: TurnId, text: String, speaker_id: Option<String>, t: Timestamp },
    AssistantTextDelta { session_id: SessionId, turn_id: TurnId, text: String, t: Timestamp },
    AssistantTextFinal { session_id: SessionId, turn_id: TurnId, text: String, t: Timestamp },
    TtsStarted { session_id: SessionId, turn_id: TurnId },
    TtsStopped { session_id: SessionId, turn_id: TurnId },
    ToolCall { session_id: SessionId, turn_id: TurnId, call: ToolCall },
    ToolResult { session_id: SessionId, turn_id: TurnId, result: ToolResult },
    Interrupt { session_id: SessionId, turn_id: Option<TurnId>, reason: InterruptReason },
    Metric { session_id: SessionId, turn_id: Option<TurnId>, stage: &'static str, kind: MetricKind, value: f64, t: Timestamp },
    Error { session_id: SessionId, turn_id: Option<TurnId>, stage: &'static str, kind: ErrorKind, detail: String },
    /// A human-readable note about pipeline behavior that isn't an error but
    /// the peer still needs to see — e.g. a gate suppression, so silence is
    /// never unexplained.
    SystemNote { session_id: SessionId, turn_id: Option<TurnId>, detail: String },
    End { session_id: SessionId },
}

impl Frame {
    pub fn session_id(&self) -> SessionId {
        match self {
            Frame::AudioInput(f) => f.session_id,
            Frame::AudioOutput(f) => f.session_id,
            Frame::UserSpeechStarted { session_id, .. }
            | Frame::UserSpeechStopped { session_id, .. }
            | Frame::SttInterim { session_id, .. }
            | Frame::SttFinal { session_id, .. }
            | Frame::AssistantTextDelta { session_id, .. }
            | Frame::AssistantTextFinal { session_id, .. }
            | Frame::TtsStarted { session_id, .. }
            | Frame::TtsStopped { session_id, .. }
            | Frame::ToolCall { session_id, .. }
            | Frame::ToolResult { session_id, .. }
            | Frame::Interrupt { session_id, .. }
            | Frame::Metric { session_id, .. }
            | Frame::Error { session_id, .. }
            | Frame::SystemNote { session_id, .. }
            | Frame::End { session_id } => *session_id,
        }
    }

    pub fn turn_id(&self) -> Option<TurnId> {
        match self {
            Frame::AudioOutput(f) => Some(f.turn_id),
            Frame::SttFinal { turn_id, .. }
            | Frame::AssistantTextDelta { turn_id, .. }
            | Frame::AssistantTextFinal { turn_id, .. }
            | Frame::TtsStarted { turn_id, .. }
            | Frame::TtsStopped { turn_id, .. }
            | Frame::ToolCall { turn_id, .. }
            | Frame::ToolResult { turn_id, .. } => Some(*turn_id),
            Frame::Interrupt { turn_id, .. }
            | Frame::Metric { turn_id, .. }
            | Frame::Error { turn_id, .. }
            | Frame::SystemNote { turn_id, .. } => *turn_id,
            _ => None,
        }
    }

    /// Short tag for logging, metrics grouping, and the `kind()`-style
    /// dispatch a stage uses before pattern matching on the full variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::AudioInput(_) => "audio_input",
            Frame::AudioOutput(_) => "audio_output",
            Frame::UserSpeechStarted { .. } => "user_speech_started",
            Frame::UserSpeechStopped { .. } => "user_speech_stopped",
            Frame::SttInterim { .. } => "stt_interim",
            Frame::SttFinal { .. } => "stt_final",
            Frame::AssistantTextDelta { .. } => "assistant_text_delta",
            Frame::AssistantTextFinal { .. } => "assistant_text_final",
            Frame::TtsStarted { .. } => "tts_started",
            Frame::TtsStopped { .. } => "tts_stopped",
            Frame::ToolCall { .. } => "tool_call",
            Frame::ToolResult { .. } => "tool_result",
            Frame::Interrupt { .. } => "interrupt",
            Frame::Metric { .. } => "metric",
            Frame::Error { .. } => "error",
            Frame::SystemNote { .. } => "system_note",
            Frame::End { .. } => "end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_extraction_covers_audio_frames() {
        let sid = SessionId::new();
        let f = Frame::AudioInput(AudioInput {
            session_id: sid,
            pcm16: vec![0, 0],
            sample_rate: 16_000,
            channels: 1,
            t_capture: Timestamp::now(),
        });
        assert_eq!(f.session_id(), sid);
        assert_eq!(f.kind(), "audio_input");
    }

    #[test]
    fn turn_id_absent_on_session_scoped_frames() {
        let f = Frame::End { session_id: SessionId::new() };
        assert!(f.turn_id().is_none());
    }
}
