//! Speech-to-text adapter contract
//!
//! STT is modelled as a streaming session: audio chunks go in, interim and
//! final transcripts come out. The reference implementation never touches
//! a real model — it treats silence-bounded runs of non-silent chunks as
//! one utterance and echoes a fixed placeholder transcript, which is enough
//! to drive the turn controller and downstream stages deterministically in
//! tests.

use crate::error::ProviderError;
use crate::vad::{EnergyVad, VoiceActivity, VoiceActivityDetector};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub enum SttEvent {
    Interim { text: String },
    Final { text: String },
}

#[async_trait]
pub trait SttSession: Send {
    /// Feed one chunk of 16 kHz mono PCM16; returns any events produced.
    async fn push_audio(&mut self, pcm16: &[u8]) -> Result<Vec<SttEvent>, ProviderError>;

    /// Force-finalize whatever utterance is in progress.
    async fn flush(&mut self) -> Result<Vec<SttEvent>, ProviderError>;
}

#[async_trait]
pub trait SttProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn new_session(&self) -> Box<dyn SttSession>;
}

/// Deterministic reference provider: classifies speech/silence with the
/// shared energy VAD and emits one interim event per speech chunk, then a
/// final event — built from a running word counter rather than real
/// recognition — once silence resumes.
pub struct ReferenceSttProvider;

#[async_trait]
impl SttProvider for ReferenceSttProvider {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn new_session(&self) -> Box<dyn SttSession> {
        Box::new(ReferenceSttSession { vad: EnergyVad::default(), chunks_seen: 0, in_utterance: false })
    }
}

struct ReferenceSttSession {
    vad: EnergyVad,
    chunks_seen: u32,
    in_utterance: bool,
}

impl ReferenceSttSession {
    fn placeholder_transcript(&self) -> String {
        format!("utterance with {} chunks", self.chunks_seen)
    }
}

#[async_trait]
impl SttSession for ReferenceSttSession {
    async fn push_audio(&mut self, pcm16: &[u8]) -> Result<Vec<SttEvent>, ProviderError> {
        match self.vad.process(pcm16) {
            VoiceActivity::Speech => {
                self.in_utterance = true;
                self.chunks_seen += 1;
                Ok(vec![SttEvent::Interim { text: self.placeholder_transcript() }])
            }
            VoiceActivity::Silence if self.in_utterance => {
                let text = self.placeholder_transcript();
                self.in_utterance = false;
                self.chunks_seen = 0;
                self.vad.reset();
                Ok(vec![SttEvent::Final { text }])
            }
            VoiceActivity::Silence => Ok(vec![]),
        }
    }

    async fn flush(&mut self) -> Result<Vec<SttEvent>, ProviderError> {
        if !self.in_utterance {
            return Ok(vec![]);
        }
        let text = self.placeholder_transcript();
        self.in_utterance = false;
        self.chunks_seen = 0;
        Ok(vec![SttEvent::Final { text }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len_samples: usize, amplitude: i16) -> Vec<u8> {
        let mut out = Vec::with_capacity(len_samples * 2);
        for s in 0..len_samples {
            let v = if s % 2 == 0 { amplitude } else { -amplitude };
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn silence(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    #[tokio::test]
    async fn speech_then_silence_yields_interim_then_final() {
        let provider = ReferenceSttProvider;
        let mut session = provider.new_session();
        let interim = session.push_audio(&tone(320, 20_000)).await.unwrap();
        assert!(matches!(interim[0], SttEvent::Interim { .. }));
        let finals = session.push_audio(&silence(320)).await.unwrap();
        assert!(matches!(finals[0], SttEvent::Final { .. }));
    }

    #[tokio::test]
    async fn flush_with_nothing_in_progress_is_empty() {
        let provider = ReferenceSttProvider;
        let mut session = provider.new_session();
        let out = session.flush().await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn flush_finalizes_in_progress_utterance() {
        let provider = ReferenceSttProvider;
        let mut session = provider.new_session();
        session.push_audio(&tone(320, 20_000)).await.unwrap();
        let out = session.flush().await.unwrap();
        assert!(matches!(out[0], SttEvent::Final { .. }));
    }
}
