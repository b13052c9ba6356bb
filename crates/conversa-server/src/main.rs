//! Server entrypoint
//!
//! Boots the HTTP signalling surface, optionally connects to the hardware
//! gRPC daemon, and owns the per-session drive loop that ties a WebRTC
//! peer to its conversation pipeline. Session lifecycle (`/offer`, ICE
//! trickle, disconnect) lives in `SessionRegistry`; each accepted peer gets
//! its own task that owns its `RtcSession`, its `UdpSocket`, and its
//! `Assembler` end to end, so no shared mutable pipeline state crosses a
//! task boundary.

mod cli;

use axum::http::StatusCode;
use axum::Json;
use clap::Parser;
use conversa_hardware::{HardwareClient, HardwareToolExecutor};
use conversa_pipeline::assembler::{Assembler, AssemblerConfig, NoToolsExecutor, ToolExecutor};
use conversa_pipeline::gate::AllowAllClassifier;
use conversa_pipeline::memory::KeywordOverlapMemory;
use conversa_pipeline::providers::llm::ReferenceLlmProvider;
use conversa_pipeline::providers::stt::ReferenceSttProvider;
use conversa_pipeline::providers::tts::ReferenceTtsProvider;
use conversa_pipeline::providers::vision::ReferenceVisionProvider;
use conversa_pipeline::session::{Session, SessionConfig};
use conversa_pipeline::{Config, Frame, SessionId};
use conversa_transport::audio_codec::{AudioCodec, PassthroughCodec};
use conversa_transport::data_channel::{encode_line, frame_to_client_message, metrics_snapshot};
use conversa_transport::rtc_session::{drive_once, handle_udp_input, RtcSession, SessionSignal};
use conversa_transport::signalling::{self, IceCandidateRequest, SignallingState};
use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": detail.into() })))
}

/// One accepted peer's trickle-ICE mailbox and session-scope cancellation.
/// The drive task owns everything else; the registry only needs enough to
/// route a `PATCH /offer` to the right task and to tear the session down.
struct SessionEntry {
    ice_tx: mpsc::UnboundedSender<IceCandidateRequest>,
    cancellation: CancellationToken,
}

struct AppState {
    sessions: DashMap<String, SessionEntry>,
    hardware: Option<HardwareClient>,
    config: Config,
}

impl AppState {
    fn build_tools(&self) -> Arc<dyn ToolExecutor> {
        match &self.hardware {
            Some(client) => {
                Arc::new(HardwareToolExecutor::with_vision(client.clone(), Arc::new(ReferenceVisionProvider)))
            }
            None => Arc::new(NoToolsExecutor),
        }
    }

    fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            gate: conversa_pipeline::gate::GateConfig {
                budget: Duration::from_millis(self.config.gate.budget_ms),
                fail_mode: self.config.gate_fail_mode(),
            },
            memory_recall_budget: Duration::from_millis(self.config.memory.recall_budget_ms),
            memory_store_assistant_turns: self.config.memory.store_assistant_turns,
            ..AssemblerConfig::default()
        }
    }
}

#[async_trait::async_trait]
impl SignallingState for AppState {
    async fn create_session(&self, offer_sdp: &str) -> Result<(String, String), ApiError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("udp bind failed: {e}")))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        let mut rtc = RtcSession::new();
        let answer_sdp = rtc
            .accept_offer(offer_sdp, local_addr)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

        let session_id = SessionId::new();
        let (ice_tx, ice_rx) = mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();
        self.sessions.insert(
            session_id.to_string(),
            SessionEntry { ice_tx, cancellation: cancellation.clone() },
        );

        let pipeline_session = Session::new(SessionConfig::default());
        let assembler = Assembler::new(
            pipeline_session,
            Arc::new(ReferenceSttProvider),
            Arc::new(ReferenceLlmProvider),
            Arc::new(ReferenceTtsProvider::default()),
            Arc::new(KeywordOverlapMemory::new()),
            Arc::new(AllowAllClassifier),
            self.build_tools(),
            self.assembler_config(),
        );

        let forward_partial_during_tts = self.config.transport.forward_partial_during_tts;
        let snapshot_interval = Duration::from_millis(self.config.observer.snapshot_ms);
        tokio::spawn(drive_session(
            session_id,
            rtc,
            socket,
            ice_rx,
            assembler,
            cancellation,
            forward_partial_during_tts,
            snapshot_interval,
        ));
        Ok((session_id.to_string(), answer_sdp))
    }

    async fn add_ice_candidate(&self, session_id: &str, candidate: IceCandidateRequest) -> Result<(), ApiError> {
        match self.sessions.get(session_id) {
            Some(entry) => {
                let _ = entry.ice_tx.send(candidate);
                Ok(())
            }
            None => Err(api_error(StatusCode::NOT_FOUND, "unknown session")),
        }
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }
}

/// Drives one peer's str0m session to completion: reads UDP datagrams,
/// feeds decoded audio to the assembler, and writes whatever the assembler
/// produces back out as RTP audio or data-channel JSON lines. Lives entirely
/// on one task — the pipeline's single-writer-context assumption holds
/// trivially because nothing else ever touches this `Assembler`. Interim
/// transcripts are withheld from the data channel while TTS is playing
/// unless `forward_partial_during_tts` opts in (§4.N open question on
/// interim delivery).
async fn drive_session(
    session_id: SessionId,
    mut rtc: RtcSession,
    socket: UdpSocket,
    mut ice_rx: mpsc::UnboundedReceiver<IceCandidateRequest>,
    mut assembler: Assembler,
    cancellation: CancellationToken,
    forward_partial_during_tts: bool,
    snapshot_interval: Duration,
) {
    let codec: Box<dyn AudioCodec> = Box::new(PassthroughCodec::default());
    let mut recv_buf = vec![0u8; 2048];
    let mut rtp_timestamp: u32 = 0;
    let mut next_deadline = tokio::time::Instant::now();
    let mut tts_active = false;

    info!(session = %session_id, "session started");

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                info!(session = %session_id, "session cancelled");
                break;
            }
            candidate = ice_rx.recv() => {
                if let Some(candidate) = candidate {
                    if let Err(err) = rtc.add_remote_candidate(&candidate.candidate) {
                        warn!(session = %session_id, %err, "failed to add trickled ice candidate");
                    }
                }
            }
            received = socket.recv_from(&mut recv_buf) => {
                match received {
                    Ok((len, peer)) => handle_udp_input(&mut rtc, peer, socket.local_addr().unwrap_or(peer), &recv_buf[..len]),
                    Err(err) => warn!(session = %session_id, %err, "udp recv failed"),
                }
            }
            _ = tokio::time::sleep_until(next_deadline) => {}
        }

        let (signals, deadline) = drive_once(&mut rtc, &socket).await;
        next_deadline = tokio::time::Instant::from_std(deadline);

        for signal in signals {
            match signal {
                SessionSignal::Connected => info!(session = %session_id, "ice connected"),
                SessionSignal::Disconnected => {
                    info!(session = %session_id, "ice disconnected, ending session");
                    cancellation.cancel();
                }
                SessionSignal::DataChannelOpen(_) => info!(session = %session_id, "data channel open"),
                SessionSignal::DataChannelMessage(_) => {
                    // The data channel is server-to-client only per the
                    // signalling contract; inbound messages have no
                    // defined meaning yet and are logged, not acted on.
                }
                SessionSignal::MediaAdded { .. } => {}
                SessionSignal::AudioFrame { payload, .. } => {
                    let pcm16 = codec.decode(&payload);
                    let frames = assembler.ingest_audio(&pcm16).await;
                    forward_frames(&mut rtc, codec.as_ref(), &frames, &mut rtp_timestamp, &mut tts_active, forward_partial_during_tts);
                }
            }
        }

        // The LLM/TTS tail of a turn runs as a detached task so a barge-in
        // can cancel it mid-stream; its audio/metric/transcript output
        // arrives on a channel this drain picks up even on ticks with no
        // new audio from the peer (e.g. while they listen in silence).
        let tail_frames = assembler.poll();
        forward_frames(&mut rtc, codec.as_ref(), &tail_frames, &mut rtp_timestamp, &mut tts_active, forward_partial_during_tts);

        if assembler.session.metrics.should_publish_snapshot(snapshot_interval) {
            let message = metrics_snapshot(&assembler.session.metrics);
            match encode_line(&message) {
                Ok(line) => {
                    if let Err(err) = rtc.send_data_channel_text(&String::from_utf8_lossy(&line)) {
                        warn!(session = %session_id, %err, "failed to write metrics snapshot");
                    }
                }
                Err(err) => warn!(session = %session_id, %err, "failed to encode metrics snapshot"),
            }
        }

        if cancellation.is_cancelled() {
            break;
        }
    }

    info!(session = %session_id, "session ended");
}

/// Forwards a batch of frames, updating the `tts_active` flag and applying
/// the interim-during-TTS withholding policy before handing each one to
/// [`forward_frame`]. Shared by the immediate `ingest_audio` path and the
/// detached turn-tail drain so both apply the same forwarding rules.
fn forward_frames(
    rtc: &mut RtcSession,
    codec: &dyn AudioCodec,
    frames: &[Frame],
    rtp_timestamp: &mut u32,
    tts_active: &mut bool,
    forward_partial_during_tts: bool,
) {
    for frame in frames {
        match frame {
            Frame::TtsStarted { .. } => *tts_active = true,
            Frame::TtsStopped { .. } => *tts_active = false,
            _ => {}
        }
        if matches!(frame, Frame::SttInterim { .. }) && *tts_active && !forward_partial_during_tts {
            continue;
        }
        forward_frame(rtc, codec, frame, rtp_timestamp);
    }
}

/// Routes one produced frame to its client-visible destination: audio goes
/// out over RTP, everything the data channel understands goes out as a
/// JSON line, and frames with no client representation are dropped here
/// (they already did their job updating the metrics store).
fn forward_frame(rtc: &mut RtcSession, codec: &dyn AudioCodec, frame: &Frame, rtp_timestamp: &mut u32) {
    if let Frame::AudioOutput(out) = frame {
        let encoded = codec.encode(&out.pcm16);
        if let Err(err) = rtc.write_audio_rtp(&encoded, *rtp_timestamp) {
            warn!(%err, "failed to write outbound audio rtp");
        }
        *rtp_timestamp = rtp_timestamp.wrapping_add((out.pcm16.len() / 2) as u32);
        return;
    }
    if let Frame::Error { detail, .. } = frame {
        error!(%detail, "pipeline error");
    }
    if let Some(message) = frame_to_client_message(frame) {
        match encode_line(&message) {
            Ok(line) => {
                if let Err(err) = rtc.send_data_channel_text(&String::from_utf8_lossy(&line)) {
                    warn!(%err, "failed to write data channel line");
                }
            }
            Err(err) => warn!(%err, "failed to encode data channel line"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    conversa_pipeline::logging::init(&config.log)?;

    let hardware_endpoint = cli.hardware_endpoint.clone().or_else(|| {
        if config.robot.enabled {
            config.robot.address.clone()
        } else {
            None
        }
    });

    let hardware = match &hardware_endpoint {
        Some(endpoint) => match HardwareClient::connect(endpoint.clone()).await {
            Ok(client) => {
                info!(%endpoint, "connected to hardware control service");
                Some(client)
            }
            Err(err) => {
                error!(%err, "failed to connect to hardware control service, continuing browser-only");
                None
            }
        },
        None => None,
    };

    let state = Arc::new(AppState { sessions: DashMap::new(), hardware, config });
    let app = signalling::router(state.clone());

    let bind_addr = std::net::SocketAddr::from_str(&cli.bind)?;
    info!(%bind_addr, "conversa-server listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    let shutdown_grace = Duration::from_secs(cli.shutdown_grace_secs);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone(), shutdown_grace))
        .await?;

    Ok(())
}

/// Waits for Ctrl-C, then cancels every in-flight session's scope and gives
/// the drive loops `grace` to notice and exit before axum's own shutdown
/// finishes tearing down the listener.
async fn shutdown_signal(state: Arc<AppState>, grace: Duration) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, closing sessions");
    for entry in state.sessions.iter() {
        entry.cancellation.cancel();
    }
    tokio::time::sleep(grace).await;
}
