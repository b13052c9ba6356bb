//! Data-channel bridge
//!
//! Frames that belong on the side channel (transcripts, TTS lifecycle,
//! metrics snapshots, errors) are serialized as newline-delimited JSON
//! messages and written to the negotiated str0m data channel. Each message
//! carries an explicit `type` tag so a browser client can dispatch without
//! needing the full `Frame` taxonomy.

use conversa_pipeline::metrics::MetricsStore;
use conversa_pipeline::Frame;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MetricEntry {
    pub turn_id: u64,
    pub values: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Transcription { turn_id: u64, text: String },
    Partial { text: String },
    TtsState { turn_id: u64, playing: bool },
    System { detail: String },
    Error { kind: String, detail: String },
    MetricsSnapshot { turns: Vec<MetricEntry> },
}

/// Translates a pipeline `Frame` into the subset of client-visible
/// messages the data channel forwards. Audio frames, internal-only frames
/// (e.g. `AudioInput`), and `Metric` frames have no per-frame client
/// representation and map to `None` — audio travels over the media track,
/// and metrics are instead pushed as a debounced [`metrics_snapshot`]
/// rather than one message per stage per turn.
pub fn frame_to_client_message(frame: &Frame) -> Option<ClientMessage> {
    match frame {
        Frame::SttInterim { text, .. } => Some(ClientMessage::Partial { text: text.clone() }),
        Frame::SttFinal { turn_id, text, .. } => Some(ClientMessage::Transcription { turn_id: turn_id.value(), text: text.clone() }),
        Frame::TtsStarted { turn_id, .. } => Some(ClientMessage::TtsState { turn_id: turn_id.value(), playing: true }),
        Frame::TtsStopped { turn_id, .. } => Some(ClientMessage::TtsState { turn_id: turn_id.value(), playing: false }),
        Frame::SystemNote { detail, .. } => Some(ClientMessage::System { detail: detail.clone() }),
        Frame::Error { kind, detail, .. } => Some(ClientMessage::Error {
            kind: format!("{:?}", kind).to_lowercase(),
            detail: detail.clone(),
        }),
        _ => None,
    }
}

/// Builds a snapshot message from the metrics store's per-turn table,
/// respecting the "never fabricate a zero" rule — a turn with no recorded
/// value for a given kind simply has no entry for it.
pub fn metrics_snapshot(store: &MetricsStore) -> ClientMessage {
    let turns = store
        .recent_table()
        .into_iter()
        .map(|(turn_id, metrics)| MetricEntry {
            turn_id: turn_id.value(),
            values: metrics.values.into_iter().map(|(kind, value)| (format!("{kind:?}").to_lowercase(), value)).collect(),
        })
        .collect();
    ClientMessage::MetricsSnapshot { turns }
}

/// Serializes a message as a single newline-terminated JSON line, the
/// framing the browser-side reader expects when buffering partial reads
/// off the data channel.
pub fn encode_line(message: &ClientMessage) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}
