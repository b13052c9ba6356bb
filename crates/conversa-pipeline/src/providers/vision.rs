//! Vision adapter contract
//!
//! An optional collaborator: sessions without a camera feed never construct
//! one. The contract takes a single still frame and returns a short textual
//! description, which the assembler folds into context as a system-style
//! entry rather than a user turn. The reference provider reports only
//! coarse frame statistics — it has no object or scene understanding.

use crate::error::ProviderError;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct VisionFrame {
    pub rgb8: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn describe(&self, frame: &VisionFrame) -> Result<String, ProviderError>;
}

/// Reports mean brightness and frame dimensions. Not a substitute for real
/// scene understanding — a placeholder that exercises the vision stage's
/// wiring and budget handling without a model dependency.
pub struct ReferenceVisionProvider;

#[async_trait]
impl VisionProvider for ReferenceVisionProvider {
    fn name(&self) -> &'static str {
        "reference"
    }

    async fn describe(&self, frame: &VisionFrame) -> Result<String, ProviderError> {
        if frame.rgb8.is_empty() {
            return Err(ProviderError::BadInput("empty frame".into()));
        }
        let sum: u64 = frame.rgb8.iter().map(|&b| b as u64).sum();
        let mean = sum as f64 / frame.rgb8.len() as f64;
        Ok(format!("{}x{} frame, mean brightness {:.1}", frame.width, frame.height, mean))
    }
}
