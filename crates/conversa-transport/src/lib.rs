//! WebRTC transport: SDP signalling, str0m session driving, codec policy,
//! and the data-channel bridge that forwards pipeline frames to the
//! browser peer as JSON lines.

pub mod audio_codec;
pub mod codec;
pub mod data_channel;
pub mod error;
pub mod rtc_session;
pub mod signalling;

pub use audio_codec::{AudioCodec, PassthroughCodec};
pub use error::TransportError;
pub use rtc_session::RtcSession;
