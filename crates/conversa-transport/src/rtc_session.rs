//! str0m-backed RTC session
//!
//! Wraps a single `str0m::Rtc` sans-I/O instance and drives it over a
//! dedicated UDP socket. str0m hands back `Output` values describing what
//! to transmit and when to next poll; the drive loop turns that into a
//! `tokio::select!` over socket reads, a timeout, and the outbound frame
//! queue from the pipeline assembler.

use crate::error::TransportError;
use std::net::SocketAddr;
use std::time::Instant;
use str0m::change::SdpOffer;
use str0m::channel::ChannelId;
use str0m::media::{Mid, Pt};
use str0m::net::Receive;
use str0m::{Event, Input, Output, Rtc};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

pub struct RtcSession {
    pub rtc: Rtc,
    pub audio_mid: Option<Mid>,
    pub data_channel: Option<ChannelId>,
    audio_pt: Option<Pt>,
    audio_seq: u64,
}

impl RtcSession {
    /// ICE-lite host-only session: this server never initiates ICE checks,
    /// it only answers them, which keeps the candidate set small for a
    /// server sitting behind a known public address.
    pub fn new() -> Self {
        let rtc = Rtc::builder().set_ice_lite(true).build(Instant::now());
        Self { rtc, audio_mid: None, data_channel: None, audio_pt: None, audio_seq: 0 }
    }

    pub fn accept_offer(&mut self, offer_sdp: &str, local_addr: SocketAddr) -> Result<String, TransportError> {
        let offer = SdpOffer::from_sdp_string(offer_sdp).map_err(|e| TransportError::Sdp(e.to_string()))?;
        let answer = self.rtc.sdp_api().accept_offer(offer).map_err(|e| TransportError::Sdp(e.to_string()))?;
        let candidate = str0m::Candidate::host(local_addr, "udp").map_err(|e| TransportError::Ice(e.to_string()))?;
        self.rtc.add_local_candidate(candidate);
        Ok(answer.to_sdp_string())
    }

    pub fn add_remote_candidate(&mut self, candidate_sdp: &str) -> Result<(), TransportError> {
        let candidate = str0m::Candidate::from_sdp_string(candidate_sdp).map_err(|e| TransportError::Ice(e.to_string()))?;
        self.rtc.add_remote_candidate(candidate);
        Ok(())
    }

    /// Writes one chunk of Opus-encoded audio (already resampled to the
    /// negotiated clock rate) as an RTP packet.
    pub fn write_audio_rtp(&mut self, opus: &[u8], timestamp: u32) -> Result<(), TransportError> {
        let Some(mid) = self.audio_mid else { return Ok(()) };
        let pt = self.audio_pt.unwrap_or_else(|| Pt::new_with_value(111));
        let seq = str0m::rtp::SeqNo::from(self.audio_seq);
        self.audio_seq += 1;
        if let Some(stream_tx) = self.rtc.direct_api().stream_tx_by_mid(mid, None) {
            let _ = stream_tx.write_rtp(
                pt,
                seq,
                timestamp,
                Instant::now(),
                false,
                str0m::rtp::ExtensionValues::default(),
                false,
                opus.to_vec(),
            );
        }
        Ok(())
    }

    pub fn send_data_channel_text(&mut self, text: &str) -> Result<(), TransportError> {
        let id = self.data_channel.ok_or_else(|| TransportError::DataChannel("channel not open".into()))?;
        if let Some(mut channel) = self.rtc.channel(id) {
            channel.write(false, text.as_bytes()).map_err(|e| TransportError::DataChannel(e.to_string()))?;
        }
        Ok(())
    }
}

impl Default for RtcSession {
    fn default() -> Self {
        Self::new()
    }
}

/// What the drive loop surfaced from one pass over str0m's event queue.
pub enum SessionSignal {
    Connected,
    Disconnected,
    DataChannelOpen(ChannelId),
    DataChannelMessage(Vec<u8>),
    MediaAdded { mid: Mid },
    /// One RTP payload's worth of inbound audio, still codec-encoded.
    /// Callers decode it through an [`crate::audio_codec::AudioCodec`]
    /// before handing it to the pipeline.
    AudioFrame { mid: Mid, payload: Vec<u8> },
}

/// Drains str0m's output queue: transmits are sent over `socket`, events
/// are translated into [`SessionSignal`]s. Returns once str0m asks to be
/// polled again, along with the deadline for that next poll — the drive
/// loop's `tokio::select!` uses it alongside the socket read and the
/// outbound frame queue.
pub async fn drive_once(session: &mut RtcSession, socket: &UdpSocket) -> (Vec<SessionSignal>, Instant) {
    let mut signals = Vec::new();
    loop {
        match session.rtc.poll_output() {
            Ok(Output::Timeout(deadline)) => return (signals, deadline),
            Ok(Output::Transmit(transmit)) => {
                if let Err(err) = socket.send_to(&transmit.contents, transmit.destination).await {
                    warn!(%err, "udp send failed");
                }
            }
            Ok(Output::Event(event)) => handle_event(session, event, &mut signals),
            Err(err) => {
                warn!(%err, "str0m poll_output error");
                return (signals, Instant::now());
            }
        }
    }
}

fn handle_event(session: &mut RtcSession, event: Event, signals: &mut Vec<SessionSignal>) {
    match event {
        Event::IceConnectionStateChange(state) => {
            debug!(?state, "ice connection state changed");
            if format!("{state:?}").eq_ignore_ascii_case("connected") {
                signals.push(SessionSignal::Connected);
            } else if format!("{state:?}").eq_ignore_ascii_case("disconnected") {
                signals.push(SessionSignal::Disconnected);
            }
        }
        Event::MediaAdded(media) => {
            if media.kind == str0m::media::MediaKind::Audio {
                session.audio_mid = Some(media.mid);
            }
            signals.push(SessionSignal::MediaAdded { mid: media.mid });
        }
        Event::ChannelOpen(id, _label) => {
            session.data_channel = Some(id);
            signals.push(SessionSignal::DataChannelOpen(id));
        }
        Event::ChannelData(data) => {
            signals.push(SessionSignal::DataChannelMessage(data.data));
        }
        Event::MediaData(data) => {
            if Some(data.mid) == session.audio_mid {
                signals.push(SessionSignal::AudioFrame { mid: data.mid, payload: data.data });
            }
        }
        _ => {}
    }
}

/// Feeds one datagram received from the UDP socket into str0m.
pub fn handle_udp_input(session: &mut RtcSession, source: SocketAddr, local: SocketAddr, buf: &[u8]) {
    let Ok(contents) = Receive::try_from((source, local, buf)) else { return };
    let _ = session.rtc.handle_input(Input::Receive(Instant::now(), contents));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_session_has_no_negotiated_media() {
        let session = RtcSession::new();
        assert!(session.audio_mid.is_none());
        assert!(session.data_channel.is_none());
    }
}
