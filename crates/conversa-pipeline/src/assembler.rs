//! Pipeline assembler
//!
//! Wires one session's stages into a turn-taking loop: audio in, through
//! STT and the turn controller, through the gate and memory recall, into
//! the LLM (resolving any tool calls along the way), through the sentence
//! splitter, into TTS, out as `AudioOutput` frames. Every stage transition
//! publishes `Metric` frames so the §4.M budgets are observable without the
//! caller threading timers through the whole chain by hand.
//!
//! This generalizes a linear stage-to-stage pipeline into a turn-scoped
//! request/response shape: a turn fans out to the LLM/tool loop and fans
//! back in at the splitter before TTS, rather than every stage being a
//! fixed 1:1 link in a chain.
//!
//! A turn only exists once it has cleared the gate: `turn_prelude` decides
//! gate + recall synchronously, and only allocates a turn id and opens the
//! turn's cancellation scope after the gate allows. The open-ended part —
//! LLM streaming, tool resolution, splitting, TTS — runs in `run_turn_tail`,
//! which the live STT-driven path spawns as a detached task so a barge-in
//! on the next utterance can cancel it while it's still running, rather
//! than being stuck behind one `ingest_audio` call that never yields.
//! `run_turn` keeps calling the same tail inline and synchronously, so the
//! direct-call unit tests stay deterministic without touching the spawn
//! machinery.

use crate::context::{Context, Entry};
use crate::error::{ProviderError, StageError};
use crate::frame::{Frame, MetricKind, ToolCall, ToolOutcome, ToolResult};
use crate::gate::{evaluate as gate_evaluate, GateClassifier, GateConfig, GateDecision};
use crate::handle::{SessionId, TurnId};
use crate::memory::{recall_with_budget, Memory, MemoryRecord};
use crate::metrics::MetricsStore;
use crate::observer::LifecycleEvent;
use crate::providers::llm::{LlmEvent, LlmProvider};
use crate::providers::stt::{SttEvent, SttProvider, SttSession};
use crate::providers::tts::TtsProvider;
use crate::queue::{self, BackpressurePolicy, FrameReceiver, FrameSender};
use crate::session::Session;
use crate::splitter::SentenceSplitter;
use crate::stage::{process_with_retry, RetryPolicy, Stage, StageContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Resolves a tool call the LLM issues. The hardware adapter crate supplies
/// the real implementation; sessions without a hardware channel can use
/// `NoToolsExecutor`, which rejects every call as unsupported.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> ToolOutcome;
}

pub struct NoToolsExecutor;

#[async_trait]
impl ToolExecutor for NoToolsExecutor {
    async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        ToolOutcome::Error(format!("no tool executor configured for '{}'", call.name))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AssemblerConfig {
    pub gate: GateConfig,
    pub memory_recall_budget: Duration,
    pub memory_recall_limit: usize,
    pub splitter_min_len: usize,
    /// Whether finalized assistant replies are also fire-and-forget stored
    /// to memory, alongside user utterances which are always stored. Kept
    /// behind the same `Memory` interface regardless of setting, per the
    /// open question in the design notes on store granularity.
    pub memory_store_assistant_turns: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            memory_recall_budget: Duration::from_millis(50),
            memory_recall_limit: 3,
            splitter_min_len: 20,
            memory_store_assistant_turns: true,
        }
    }
}

/// An update the spawned tail reports back to the owning `Assembler` once
/// it can't mutate `self` directly anymore.
enum TurnUpdate {
    /// The finalized assistant entry to append to the session's context.
    Context(Entry),
    /// The tail has finished (normally, on error, or on interrupt).
    Done,
}

/// Everything `run_turn_tail` needs that would otherwise come from `&self`.
/// Cloned out of the `Assembler` at `turn_prelude` time so the tail can be
/// `'static` and spawned.
struct TurnTailDeps {
    session_id: SessionId,
    turn_id: TurnId,
    scope: CancellationToken,
    llm: Arc<dyn LlmProvider>,
    tts: Arc<dyn TtsProvider>,
    tools: Arc<dyn ToolExecutor>,
    memory: Arc<dyn Memory>,
    metrics: Arc<MetricsStore>,
    observers: crate::observer::ObserverBus,
    config: AssemblerConfig,
}

pub struct Assembler {
    pub session: Session,
    stt_session: Box<dyn SttSession>,
    llm: Arc<dyn LlmProvider>,
    tts: Arc<dyn TtsProvider>,
    memory: Arc<dyn Memory>,
    gate_classifier: Arc<dyn GateClassifier>,
    tools: Arc<dyn ToolExecutor>,
    config: AssemblerConfig,
    /// Interim transcripts pass through a bounded `DropOldest` edge rather
    /// than straight into the output vec: the latest partial transcript
    /// supersedes a stale one, so a burst that outruns the caller evicts
    /// instead of queuing forever, and the eviction itself is visible as a
    /// `Metric { kind: Drop }` frame.
    interim_tx: FrameSender,
    interim_rx: FrameReceiver,
    turn_frames_tx: mpsc::UnboundedSender<Frame>,
    turn_frames_rx: mpsc::UnboundedReceiver<Frame>,
    turn_updates_tx: mpsc::UnboundedSender<TurnUpdate>,
    turn_updates_rx: mpsc::UnboundedReceiver<TurnUpdate>,
    turn_in_flight: bool,
}

const INTERIM_QUEUE_CAPACITY: usize = 4;

impl Assembler {
    pub fn new(
        session: Session,
        stt: Arc<dyn SttProvider>,
        llm: Arc<dyn LlmProvider>,
        tts: Arc<dyn TtsProvider>,
        memory: Arc<dyn Memory>,
        gate_classifier: Arc<dyn GateClassifier>,
        tools: Arc<dyn ToolExecutor>,
        config: AssemblerConfig,
    ) -> Self {
        let (interim_tx, interim_rx) = queue::channel(INTERIM_QUEUE_CAPACITY, BackpressurePolicy::DropOldest, session.id);
        let (turn_frames_tx, turn_frames_rx) = mpsc::unbounded_channel();
        let (turn_updates_tx, turn_updates_rx) = mpsc::unbounded_channel();
        Self {
            session,
            stt_session: stt.new_session(),
            llm,
            tts,
            memory,
            gate_classifier,
            tools,
            config,
            interim_tx,
            interim_rx,
            turn_frames_tx,
            turn_frames_rx,
            turn_updates_tx,
            turn_updates_rx,
            turn_in_flight: false,
        }
    }

    /// Feed one chunk of canonical-rate mono PCM16 audio. Returns whatever
    /// frames this call produced — interim transcripts immediately, and the
    /// full turn's output once an utterance boundary is detected. Also
    /// drains any output a previously spawned turn tail has produced since
    /// the last call.
    pub async fn ingest_audio(&mut self, pcm16: &[u8]) -> Vec<Frame> {
        let mut out = Vec::new();
        self.drain_turn_channels(&mut out);
        let events = match self.stt_session.push_audio(pcm16).await {
            Ok(events) => events,
            Err(err) => {
                out.push(self.error_frame(None, err));
                return out;
            }
        };
        out.extend(self.handle_stt_events(events).await);
        out
    }

    /// Drains whatever a spawned turn tail has produced without feeding any
    /// new audio in. Callers that drive a session on a fixed tick (rather
    /// than purely in response to inbound audio) must call this on every
    /// tick, since TTS output keeps flowing from a spawned tail even while
    /// the peer is silent and nothing else would ever drain it.
    pub fn poll(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        self.drain_turn_channels(&mut out);
        out
    }

    /// Whether a turn's tail (LLM streaming through TTS) is still running in
    /// the background.
    pub fn turn_in_flight(&self) -> bool {
        self.turn_in_flight
    }

    fn drain_turn_channels(&mut self, out: &mut Vec<Frame>) {
        while let Ok(frame) = self.turn_frames_rx.try_recv() {
            out.push(frame);
        }
        while let Ok(update) = self.turn_updates_rx.try_recv() {
            match update {
                TurnUpdate::Context(entry) => self.session.context.push(entry),
                TurnUpdate::Done => self.turn_in_flight = false,
            }
        }
    }

    /// Barge-in: cancel whatever turn is in flight. The caller is expected
    /// to have already decided this is a genuine interrupt (e.g. new speech
    /// detected while `TtsStarted` is outstanding).
    pub fn interrupt(&mut self) -> Frame {
        self.session.interrupt_active_turn();
        Frame::Interrupt { session_id: self.session.id, turn_id: None, reason: crate::frame::InterruptReason::BargeIn }
    }

    async fn handle_stt_events(&mut self, events: Vec<SttEvent>) -> Vec<Frame> {
        let mut out = Vec::new();
        let now = Instant::now();
        for event in events {
            match event {
                SttEvent::Interim { text } => {
                    let frame = Frame::SttInterim { session_id: self.session.id, text: text.clone(), speaker_id: None, t: SystemTime::now() };
                    if let Ok(Some(dropped)) = self.interim_tx.send(frame).await {
                        out.push(dropped);
                    }
                    if !self.session.turns.is_in_progress() {
                        if self.turn_in_flight {
                            // New speech started while the previous turn's
                            // tail is still streaming/synthesizing: this is
                            // a barge-in, not the continuation of that turn.
                            out.push(self.interrupt());
                        }
                        self.session.turns.on_speech_started(now);
                    }
                    if let crate::turn::TurnDecision::Commit(final_text) = self.session.turns.on_interim(&text, now) {
                        out.extend(self.run_turn_live(final_text).await);
                    }
                }
                SttEvent::Final { text } => {
                    if self.session.turns.is_in_progress() {
                        self.session.turns.on_interrupt();
                        out.extend(self.run_turn_live(text).await);
                    }
                }
            }
        }
        // Drain once per batch, after every event in it has had a chance to
        // queue, rather than per event — so a burst of interims that
        // outruns the capacity actually evicts instead of always being
        // drained before the next one lands.
        while let Some(frame) = self.interim_rx.try_recv() {
            out.push(frame);
        }
        out
    }

    fn error_frame(&self, turn_id: Option<crate::handle::TurnId>, err: ProviderError) -> Frame {
        Frame::Error { session_id: self.session.id, turn_id, stage: "stt", kind: err.to_error_kind(), detail: err.to_string() }
    }

    fn metric(&self, turn_id: crate::handle::TurnId, stage: &'static str, kind: MetricKind, value: f64) -> Frame {
        self.session.metrics.record(turn_id, kind, value);
        Frame::Metric { session_id: self.session.id, turn_id: Some(turn_id), stage, kind, value, t: SystemTime::now() }
    }

    /// Gate + recall, fully synchronous. Returns the frames produced so far
    /// and, if the turn passed the gate, everything `run_turn_tail` needs to
    /// finish it — a fresh turn id and cancellation scope are allocated only
    /// in the `Some` case, so a suppressed utterance never becomes a turn at
    /// all.
    async fn turn_prelude(&mut self, transcript: String) -> (Vec<Frame>, Option<(TurnTailDeps, Context, Instant)>) {
        let turn_start = Instant::now();
        let decision = gate_evaluate(self.gate_classifier.as_ref(), &transcript, &self.config.gate).await;
        if let GateDecision::Suppress { reason } = decision {
            tracing::debug!(%reason, "turn suppressed by gate");
            let out = vec![
                Frame::Metric {
                    session_id: self.session.id,
                    turn_id: None,
                    stage: "gate",
                    kind: MetricKind::GateSuppress,
                    value: 1.0,
                    t: SystemTime::now(),
                },
                Frame::SystemNote {
                    session_id: self.session.id,
                    turn_id: None,
                    detail: format!("turn suppressed: {reason}"),
                },
            ];
            return (out, None);
        }

        let (turn_id, scope) = self.session.begin_turn();
        let mut out = vec![Frame::SttFinal {
            session_id: self.session.id,
            turn_id,
            text: transcript.clone(),
            speaker_id: None,
            t: SystemTime::now(),
        }];

        self.session.context.push(Entry::user(transcript.clone()));
        spawn_store(self.memory.clone(), MemoryRecord { text: transcript.clone(), speaker: "user".into() });

        let recall_start = Instant::now();
        let recalled = recall_with_budget(
            self.memory.as_ref(),
            &transcript,
            self.config.memory_recall_limit,
            self.config.memory_recall_budget,
        )
        .await;
        out.push(self.metric(turn_id, "memory", MetricKind::MemoryRecallMs, recall_start.elapsed().as_secs_f64() * 1000.0));
        if !recalled.is_empty() {
            self.session.context.push(Entry { role: crate::context::Role::System, text: summarize_recall(&recalled), tool_call_id: None });
        }

        let deps = TurnTailDeps {
            session_id: self.session.id,
            turn_id,
            scope,
            llm: self.llm.clone(),
            tts: self.tts.clone(),
            tools: self.tools.clone(),
            memory: self.memory.clone(),
            metrics: self.session.metrics.clone(),
            observers: self.session.observers.clone(),
            config: self.config,
        };
        (out, Some((deps, self.session.context.clone(), turn_start)))
    }

    /// Runs one committed turn end to end, fully awaited on the caller's
    /// task. Used by the direct-call tests that need a deterministic result
    /// in hand rather than a background task to poll for.
    async fn run_turn(&mut self, transcript: String) -> Vec<Frame> {
        let (mut out, tail) = self.turn_prelude(transcript).await;
        if let Some((deps, context, turn_start)) = tail {
            let (frames, assistant_entry) = run_turn_tail(deps, context, turn_start).await;
            out.extend(frames);
            if let Some(entry) = assistant_entry {
                self.session.context.push(entry);
            }
        }
        out
    }

    /// Runs one committed turn the way the live STT-driven path does: the
    /// tail is spawned rather than awaited, so a barge-in on the next
    /// utterance can cancel it while it's still streaming instead of being
    /// stuck behind it.
    async fn run_turn_live(&mut self, transcript: String) -> Vec<Frame> {
        let (out, tail) = self.turn_prelude(transcript).await;
        if let Some((deps, context, turn_start)) = tail {
            self.turn_in_flight = true;
            let frames_tx = self.turn_frames_tx.clone();
            let updates_tx = self.turn_updates_tx.clone();
            tokio::spawn(async move {
                let (frames, assistant_entry) = run_turn_tail(deps, context, turn_start).await;
                for frame in frames {
                    let _ = frames_tx.send(frame);
                }
                if let Some(entry) = assistant_entry {
                    let _ = updates_tx.send(TurnUpdate::Context(entry));
                }
                let _ = updates_tx.send(TurnUpdate::Done);
            });
        }
        out
    }
}

/// The open-ended part of a turn: LLM streaming (with tool resolution),
/// sentence splitting, and TTS. A free function rather than a method so it
/// can be spawned without borrowing the `Assembler` — it owns a cloned
/// context snapshot and communicates back only through its return value.
/// Checks `deps.scope` between every LLM event so a barge-in stops the turn
/// promptly instead of running the stream to completion first.
async fn run_turn_tail(deps: TurnTailDeps, context: Context, turn_start: Instant) -> (Vec<Frame>, Option<Entry>) {
    let TurnTailDeps { session_id, turn_id, scope, llm, tts, tools, memory, metrics, observers, config } = deps;
    let mut out = Vec::new();
    let stage_ctx = StageContext { cancellation: scope.clone(), observers: observers.clone() };

    if scope.is_cancelled() {
        out.push(Frame::Interrupt { session_id, turn_id: Some(turn_id), reason: crate::frame::InterruptReason::BargeIn });
        return (out, None);
    }

    let llm_start = Instant::now();
    let mut splitter = SentenceSplitter::new(config.splitter_min_len);
    let mut assistant_text = String::new();
    let mut first_delta_recorded = false;
    let mut tts_started = false;

    observers.publish(LifecycleEvent::Started { stage: "llm" });
    let mut stream = match llm.stream(&context).await {
        Ok(s) => s,
        Err(err) => {
            out.push(Frame::Error { session_id, turn_id: Some(turn_id), stage: "llm", kind: err.to_error_kind(), detail: err.to_string() });
            return (out, None);
        }
    };

    loop {
        tokio::select! {
            _ = scope.cancelled() => {
                out.push(Frame::Interrupt { session_id, turn_id: Some(turn_id), reason: crate::frame::InterruptReason::BargeIn });
                break;
            }
            event = stream.next() => {
                let Some(event) = event else { break };
                match event {
                    LlmEvent::TextDelta(delta) => {
                        if !first_delta_recorded {
                            observers.publish(LifecycleEvent::FirstByte { stage: "llm" });
                            out.push(metric_frame(&metrics, session_id, turn_id, "llm", MetricKind::LlmTtfb, llm_start.elapsed().as_secs_f64() * 1000.0));
                            first_delta_recorded = true;
                        }
                        assistant_text.push_str(&delta);
                        out.push(Frame::AssistantTextDelta { session_id, turn_id, text: delta.clone(), t: SystemTime::now() });
                        for chunk in splitter.push(&delta) {
                            if !tts_started {
                                out.push(Frame::TtsStarted { session_id, turn_id });
                                tts_started = true;
                                observers.publish(LifecycleEvent::Started { stage: "tts" });
                            }
                            out.extend(synthesize_chunk(&tts, &stage_ctx, &metrics, session_id, turn_id, &chunk).await);
                        }
                    }
                    LlmEvent::ToolCall(call) => {
                        out.push(Frame::ToolCall { session_id, turn_id, call: call.clone() });
                        let outcome = tools.execute(&call).await;
                        let result = ToolResult { call_id: call.call_id.clone(), outcome };
                        out.push(Frame::ToolResult { session_id, turn_id, result: result.clone() });
                        stream = match llm.resume(&context, result).await {
                            Ok(s) => s,
                            Err(err) => {
                                out.push(Frame::Error { session_id, turn_id: Some(turn_id), stage: "llm", kind: err.to_error_kind(), detail: err.to_string() });
                                break;
                            }
                        };
                    }
                    LlmEvent::Done => {
                        observers.publish(LifecycleEvent::Finished { stage: "llm" });
                        break;
                    }
                }
            }
        }
    }

    if let Some(chunk) = splitter.flush() {
        if !tts_started {
            out.push(Frame::TtsStarted { session_id, turn_id });
            tts_started = true;
            observers.publish(LifecycleEvent::Started { stage: "tts" });
        }
        out.extend(synthesize_chunk(&tts, &stage_ctx, &metrics, session_id, turn_id, &chunk).await);
    }

    let mut assistant_entry = None;
    if !assistant_text.trim().is_empty() {
        out.push(Frame::AssistantTextFinal { session_id, turn_id, text: assistant_text.clone(), t: SystemTime::now() });
        if config.memory_store_assistant_turns {
            spawn_store(memory, MemoryRecord { text: assistant_text.clone(), speaker: "assistant".into() });
        }
        assistant_entry = Some(Entry::assistant(assistant_text));
    }

    if tts_started {
        out.push(Frame::TtsStopped { session_id, turn_id });
        observers.publish(LifecycleEvent::Finished { stage: "tts" });
    }

    out.push(metric_frame(&metrics, session_id, turn_id, "turn", MetricKind::TotalMs, turn_start.elapsed().as_secs_f64() * 1000.0));
    (out, assistant_entry)
}

fn metric_frame(metrics: &MetricsStore, session_id: SessionId, turn_id: TurnId, stage: &'static str, kind: MetricKind, value: f64) -> Frame {
    metrics.record(turn_id, kind, value);
    Frame::Metric { session_id, turn_id: Some(turn_id), stage, kind, value, t: SystemTime::now() }
}

/// Wraps `TtsProvider::synthesize` as a `Stage` so chunk synthesis goes
/// through the shared retry/backoff policy and publishes lifecycle events
/// like every other stage, instead of calling the provider directly and
/// treating every failure as fatal.
struct TtsStage {
    tts: Arc<dyn TtsProvider>,
}

#[async_trait]
impl Stage for TtsStage {
    fn name(&self) -> &'static str {
        "tts"
    }

    async fn process(&mut self, _ctx: &StageContext, frame: Frame) -> Result<Vec<Frame>, StageError> {
        let Frame::AssistantTextDelta { session_id, turn_id, text, .. } = frame else {
            return Err(StageError::InvalidInput { expected: "assistant_text_delta", actual: "other" });
        };
        let pcm16 = self.tts.synthesize(&text).await.map_err(|err| provider_err_to_stage_err(&err))?;
        Ok(vec![Frame::AudioOutput(crate::frame::AudioOutput {
            session_id,
            turn_id,
            pcm16,
            sample_rate: self.tts.sample_rate(),
            channels: 1,
            t_emit: SystemTime::now(),
        })])
    }
}

/// Maps a provider-level error onto the stage retry taxonomy.
/// `Unavailable`/`Transport` are treated as transient (the provider or the
/// network hiccupped and a retry is worth trying); `Timeout` and `BadInput`
/// are not, since retrying a deadline or a rejected input without changing
/// anything would just fail the same way again.
fn provider_err_to_stage_err(err: &ProviderError) -> StageError {
    match err {
        ProviderError::Unavailable(msg) | ProviderError::Transport(msg) => StageError::ResourceExhausted(msg.clone()),
        ProviderError::Timeout(d) => StageError::DeadlineExceeded(*d),
        ProviderError::BadInput(msg) => StageError::ProcessingFailed(msg.clone()),
    }
}

async fn synthesize_chunk(
    tts: &Arc<dyn TtsProvider>,
    ctx: &StageContext,
    metrics: &MetricsStore,
    session_id: SessionId,
    turn_id: TurnId,
    text: &str,
) -> Vec<Frame> {
    let start = Instant::now();
    let mut stage = TtsStage { tts: tts.clone() };
    let input = Frame::AssistantTextDelta { session_id, turn_id, text: text.to_string(), t: SystemTime::now() };
    match process_with_retry(&mut stage, ctx, input, &RetryPolicy::default()).await {
        Ok(mut frames) => {
            let mut result = vec![metric_frame(metrics, session_id, turn_id, "tts", MetricKind::TtsTtfb, start.elapsed().as_secs_f64() * 1000.0)];
            result.append(&mut frames);
            result
        }
        Err(err) => vec![Frame::Error { session_id, turn_id: Some(turn_id), stage: "tts", kind: err.to_error_kind(), detail: err.to_string() }],
    }
}

/// Stores a record without making the turn wait on it — `Memory::store` is
/// specified as fire-and-forget, so a slow or unavailable backend must
/// never add latency to the conversation path.
fn spawn_store(memory: Arc<dyn Memory>, record: MemoryRecord) {
    tokio::spawn(async move {
        memory.store(record).await;
    });
}

fn summarize_recall(records: &[MemoryRecord]) -> String {
    let joined = records.iter().map(|r| format!("{}: {}", r.speaker, r.text)).collect::<Vec<_>>().join("; ");
    format!("relevant past context: {joined}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::AllowAllClassifier;
    use crate::memory::KeywordOverlapMemory;
    use crate::providers::llm::ReferenceLlmProvider;
    use crate::providers::stt::ReferenceSttProvider;
    use crate::providers::tts::ReferenceTtsProvider;
    use crate::session::{Session, SessionConfig};
    use futures_util::stream::BoxStream;

    fn test_assembler() -> Assembler {
        Assembler::new(
            Session::new(SessionConfig::default()),
            Arc::new(ReferenceSttProvider),
            Arc::new(ReferenceLlmProvider),
            Arc::new(ReferenceTtsProvider::default()),
            Arc::new(KeywordOverlapMemory::new()),
            Arc::new(AllowAllClassifier),
            Arc::new(NoToolsExecutor),
            AssemblerConfig::default(),
        )
    }

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

    /// Polls a spawned turn tail to completion. The reference providers
    /// never actually sleep, so in practice this settles within the first
    /// couple of iterations; the loop bound is just a safety net against a
    /// hang, not an expected iteration count.
    async fn drain_until_turn_settles(assembler: &mut Assembler) -> Vec<Frame> {
        let mut out = Vec::new();
        for _ in 0..200 {
            out.extend(assembler.poll());
            if !assembler.turn_in_flight() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        out
    }

    #[tokio::test]
    async fn a_full_turn_produces_transcript_and_audio_output() {
        let mut assembler = test_assembler();
        let mut frames = assembler.ingest_audio(&tone(320, 20_000)).await;
        frames.extend(assembler.ingest_audio(&silence(320)).await);
        frames.extend(drain_until_turn_settles(&mut assembler).await);

        assert!(frames.iter().any(|f| matches!(f, Frame::SttFinal { .. })));
        assert!(frames.iter().any(|f| matches!(f, Frame::AssistantTextFinal { .. })));
        assert!(frames.iter().any(|f| matches!(f, Frame::AudioOutput(_))));
        assert!(frames.iter().any(|f| matches!(f, Frame::TtsStarted { .. })));
        assert!(frames.iter().any(|f| matches!(f, Frame::TtsStopped { .. })));
    }

    struct AlwaysSuppressClassifier;

    #[async_trait]
    impl GateClassifier for AlwaysSuppressClassifier {
        async fn classify(&self, _transcript: &str) -> GateDecision {
            GateDecision::Suppress { reason: "test policy".into() }
        }
    }

    #[tokio::test]
    async fn gate_suppression_skips_llm_and_tts_and_never_allocates_a_turn() {
        let mut assembler = Assembler::new(
            Session::new(SessionConfig::default()),
            Arc::new(ReferenceSttProvider),
            Arc::new(ReferenceLlmProvider),
            Arc::new(ReferenceTtsProvider::default()),
            Arc::new(KeywordOverlapMemory::new()),
            Arc::new(AlwaysSuppressClassifier),
            Arc::new(NoToolsExecutor),
            AssemblerConfig::default(),
        );
        let mut frames = assembler.ingest_audio(&tone(320, 20_000)).await;
        frames.extend(assembler.ingest_audio(&silence(320)).await);

        assert!(frames.iter().any(|f| matches!(f, Frame::Metric { kind: MetricKind::GateSuppress, .. })));
        assert!(frames.iter().any(|f| matches!(f, Frame::SystemNote { .. })), "a suppressed turn must still tell the peer why it went quiet");
        assert!(
            !frames.iter().any(|f| matches!(f, Frame::SttFinal { .. })),
            "a suppressed utterance must never be delivered to the peer as a transcript"
        );
        assert!(!frames.iter().any(|f| matches!(f, Frame::AudioOutput(_))));
    }

    #[tokio::test]
    async fn tool_trigger_round_trips_through_tool_result() {
        let mut assembler = test_assembler();
        let mut frames = Vec::new();
        // ReferenceSttProvider's transcript is fixed placeholder text, so we
        // exercise the tool path directly through run_turn instead.
        frames.extend(assembler.run_turn("what time is it".into()).await);
        assert!(frames.iter().any(|f| matches!(f, Frame::ToolCall { .. })));
        assert!(frames.iter().any(|f| matches!(f, Frame::ToolResult { .. })));
        assert!(frames.iter().any(|f| matches!(f, Frame::AssistantTextFinal { .. })));
    }

    #[tokio::test]
    async fn interrupt_cancels_the_in_flight_turn_scope() {
        let mut assembler = test_assembler();
        assembler.ingest_audio(&tone(320, 20_000)).await;
        let interrupt_frame = assembler.interrupt();
        assert!(matches!(interrupt_frame, Frame::Interrupt { .. }));
        assert!(!assembler.session.turns.is_in_progress());
    }

    /// An LLM provider whose stream doesn't resolve immediately, so a test
    /// can reliably observe a turn tail still in flight a few awaits later
    /// without racing the background task.
    struct SlowLlmProvider;

    #[async_trait]
    impl LlmProvider for SlowLlmProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn stream(&self, _context: &Context) -> Result<BoxStream<'static, LlmEvent>, ProviderError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Box::pin(async_stream::stream! {
                yield LlmEvent::TextDelta("hi there".into());
                yield LlmEvent::Done;
            }))
        }

        async fn resume(&self, _context: &Context, _result: ToolResult) -> Result<BoxStream<'static, LlmEvent>, ProviderError> {
            Ok(Box::pin(async_stream::stream! {
                yield LlmEvent::Done;
            }))
        }
    }

    #[tokio::test]
    async fn barge_in_while_previous_turn_tail_is_in_flight_interrupts_it() {
        let mut assembler = Assembler::new(
            Session::new(SessionConfig::default()),
            Arc::new(ReferenceSttProvider),
            Arc::new(SlowLlmProvider),
            Arc::new(ReferenceTtsProvider::default()),
            Arc::new(KeywordOverlapMemory::new()),
            Arc::new(AllowAllClassifier),
            Arc::new(NoToolsExecutor),
            AssemblerConfig::default(),
        );

        // First utterance: commits a turn whose tail (SlowLlmProvider) is
        // still sleeping in `stream()` by the time this call returns.
        let mut frames = assembler.ingest_audio(&tone(320, 20_000)).await;
        frames.extend(assembler.ingest_audio(&silence(320)).await);
        assert!(assembler.turn_in_flight(), "tail must still be running for this test to be meaningful");

        // Second utterance starts before the first turn's tail has had a
        // chance to finish its 50ms sleep: this must read as a barge-in.
        frames.extend(assembler.ingest_audio(&tone(320, 20_000)).await);
        assert!(assembler.turn_in_flight(), "the slow tail should not have settled yet");
        assert!(frames.iter().any(|f| matches!(f, Frame::Interrupt { .. })), "new speech while a tail is in flight must interrupt it");
    }
}
