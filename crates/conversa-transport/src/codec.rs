//! Codec policy
//!
//! Audio is negotiated as Opus only; video, when present, is negotiated as
//! H.264 constrained baseline only. Str0m's SDP answer only advertises the
//! codecs this list names, so an offer containing nothing we support
//! produces a session with no usable media line — the caller treats that
//! as a fail-closed rejection rather than silently degrading to a codec we
//! don't actually decode correctly.

use crate::error::TransportError;
use str0m::format::{Codec, CodecSpec};
use str0m::media::MediaKind;

pub fn preferred_audio_codec() -> CodecConfig {
    CodecConfig { kind: MediaKind::Audio, codec: Codec::Opus }
}

pub fn preferred_video_codec() -> CodecConfig {
    CodecConfig { kind: MediaKind::Video, codec: Codec::H264 }
}

pub struct CodecConfig {
    pub kind: MediaKind,
    pub codec: Codec,
}

/// Confirms the negotiated `CodecSpec` matches our required codec for a
/// media line; returns an error that callers should treat as fail-closed
/// (reject the session) rather than attempt playback with an unsupported
/// codec.
pub fn ensure_supported(kind: MediaKind, spec: &CodecSpec) -> Result<(), TransportError> {
    let expected = match kind {
        MediaKind::Audio => Codec::Opus,
        MediaKind::Video => Codec::H264,
    };
    if spec.codec == expected {
        Ok(())
    } else {
        Err(TransportError::UnsupportedCodec(format!("{:?} line negotiated {:?}, expected {:?}", kind, spec.codec, expected)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_codecs_match_policy() {
        assert_eq!(preferred_audio_codec().codec, Codec::Opus);
        assert_eq!(preferred_video_codec().codec, Codec::H264);
    }
}
