//! Frame model, stage runtime, turn control, and conversation pipeline
//! assembly for a realtime voice conversation session.
//!
//! This crate has no transport or hardware dependency of its own — it
//! consumes canonical-rate PCM16 audio and produces frames; `conversa-transport`
//! bridges those frames to a WebRTC peer and `conversa-hardware` resolves the
//! tool calls the LLM adapter issues.

pub mod assembler;
pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod gate;
pub mod handle;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod observer;
pub mod providers;
pub mod queue;
pub mod resampler;
pub mod session;
pub mod splitter;
pub mod stage;
pub mod turn;
pub mod vad;

pub use assembler::{Assembler, AssemblerConfig, NoToolsExecutor, ToolExecutor};
pub use config::Config;
pub use error::{ErrorKind, ProviderError, StageError};
pub use frame::Frame;
pub use handle::{SessionId, TurnId};
pub use session::{Session, SessionConfig};
