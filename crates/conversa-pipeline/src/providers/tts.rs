//! Text-to-speech adapter contract
//!
//! TTS consumes text chunks (as produced by the sentence splitter) and
//! streams back PCM16 audio. The reference provider never synthesizes real
//! speech — it generates a short silent clip proportional to the input
//! text's length, which is enough to drive `AudioOutput` framing, TTFB
//! metrics, and barge-in cancellation in tests without an audio codec
//! dependency.

use crate::error::ProviderError;
use async_trait::async_trait;

pub const REFERENCE_SAMPLE_RATE: u32 = 24_000;

#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn sample_rate(&self) -> u32;

    /// Synthesize one chunk of text into PCM16 mono audio at `sample_rate()`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError>;
}

pub struct ReferenceTtsProvider {
    ms_per_char: f32,
}

impl Default for ReferenceTtsProvider {
    fn default() -> Self {
        Self { ms_per_char: 40.0 }
    }
}

#[async_trait]
impl TtsProvider for ReferenceTtsProvider {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn sample_rate(&self) -> u32 {
        REFERENCE_SAMPLE_RATE
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::BadInput("empty synthesis input".into()));
        }
        let duration_ms = text.chars().count() as f32 * self.ms_per_char;
        let sample_count = ((duration_ms / 1000.0) * self.sample_rate() as f32) as usize;
        Ok(vec![0u8; sample_count * 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthesis_length_scales_with_text_length() {
        let provider = ReferenceTtsProvider::default();
        let short = provider.synthesize("hi").await.unwrap();
        let long = provider.synthesize("hello there, how can I help you today").await.unwrap();
        assert!(long.len() > short.len());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let provider = ReferenceTtsProvider::default();
        let err = provider.synthesize("   ").await.unwrap_err();
        assert!(matches!(err, ProviderError::BadInput(_)));
    }

    #[tokio::test]
    async fn output_is_16_bit_aligned() {
        let provider = ReferenceTtsProvider::default();
        let out = provider.synthesize("a test sentence").await.unwrap();
        assert_eq!(out.len() % 2, 0);
    }
}
