//! Session controller
//!
//! One session per media stream. A single task owns every piece of
//! ordering-critical state (turn counter, finalizer, sequencer, history) and
//! multiplexes four inputs with `tokio::select!`:
//!
//! - inbound media-stream frames
//! - transcription events
//! - results from completion and synthesis tasks
//! - the finalizer's inactivity deadline
//!
//! Completion and synthesis run in spawned tasks and report back through an
//! unbounded channel. Audio for transcription is offered with `try_send` and
//! dropped when the provider falls behind, so the loop never blocks on a
//! provider.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

use super::protocol::{self, InboundFrame, MarkName, OutboundFrame, OutboundMedia, StartMetadata};
use super::{
    CallRegistry, Conversation, KeypadDetector, PlaybackCommand, PlaybackItem, PlaybackSequencer,
    Segment, SegmentKey, SynthesisFanout, TranscriptFinalizer, TranscriptSignal, TurnOutcome,
    generate_turn,
};
use crate::config::SessionConfig;
use crate::providers::{Providers, StreamOptions};
use crate::{Error, Result};

/// Results reported back to the session loop by spawned tasks
#[derive(Debug)]
pub enum SessionEvent {
    /// A segment finished synthesizing (or was skipped)
    Synthesized { key: SegmentKey, item: PlaybackItem },
    /// A completion turn ended
    TurnFinished(TurnOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// One phone call's dialogue loop
pub struct Session {
    providers: Providers,
    registry: CallRegistry,
    greeting: Option<String>,
    outbound: mpsc::Sender<OutboundFrame>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    fanout: SynthesisFanout,
    finalizer: TranscriptFinalizer,
    sequencer: PlaybackSequencer,
    keypad: KeypadDetector,
    conversation: Conversation,
    call_sid: Option<String>,
    stream_sid: Option<String>,
    next_turn: u32,
}

impl Session {
    /// Create a session writing frames to `outbound`
    #[must_use]
    pub fn new(
        providers: Providers,
        registry: CallRegistry,
        config: &SessionConfig,
        system_prompt: &str,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let fanout = SynthesisFanout::new(Arc::clone(&providers.synthesizer), events_tx.clone());

        Self {
            providers,
            registry,
            greeting: config.greeting.clone(),
            outbound,
            events_tx,
            events_rx,
            fanout,
            finalizer: TranscriptFinalizer::new(config),
            sequencer: PlaybackSequencer::new(),
            keypad: KeypadDetector::new(config.keypad_digits.iter().cloned()),
            conversation: Conversation::new(system_prompt),
            call_sid: None,
            stream_sid: None,
            next_turn: 0,
        }
    }

    /// Drive the call until the stream stops or a collaborator fails
    ///
    /// `inbound` carries raw text frames from the media socket.
    ///
    /// # Errors
    ///
    /// Returns error if transcription cannot be opened or fails mid-call, or
    /// if the media socket goes away while frames are being written
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) -> Result<()> {
        let span = tracing::info_span!(
            "call",
            call_sid = tracing::field::Empty,
            stream_sid = tracing::field::Empty
        );

        async move {
            let result = self.drive(&mut inbound).await;
            self.teardown().await;
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, inbound: &mut mpsc::Receiver<String>) -> Result<()> {
        let transcription = self
            .providers
            .transcriber
            .open(&StreamOptions::default())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to open transcription"))?;

        let audio = transcription.audio;
        let mut recognitions = transcription.events;

        loop {
            let deadline = self.finalizer.deadline();

            tokio::select! {
                frame = inbound.recv() => {
                    let Some(text) = frame else {
                        tracing::info!("media socket closed");
                        return Ok(());
                    };
                    if self.handle_frame(&text, &audio).await? == Flow::Stop {
                        return Ok(());
                    }
                }
                recognition = recognitions.recv() => {
                    let result = match recognition {
                        Some(Ok(event)) => self.handle_recognition(&event).await,
                        Some(Err(e)) => Err(e),
                        None => Err(Error::Stt("transcription stream ended".to_string())),
                    };
                    if let Err(e) = result {
                        tracing::error!(error = %e, "ending session");
                        return Err(e);
                    }
                }
                Some(event) = self.events_rx.recv() => self.handle_event(event).await?,
                () = wait_for(deadline) => self.handle_timeout().await?,
            }
        }
    }

    async fn handle_frame(&mut self, text: &str, audio: &mpsc::Sender<Vec<u8>>) -> Result<Flow> {
        let frame = match protocol::parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring frame");
                return Ok(Flow::Continue);
            }
        };

        match frame {
            InboundFrame::Connected {} => tracing::debug!("media stream connected"),
            InboundFrame::Start { start } => self.handle_start(start).await?,
            InboundFrame::Media { media } => match BASE64.decode(media.payload.as_bytes()) {
                Ok(bytes) => match audio.try_send(bytes) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("transcription backlogged, dropping media chunk");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        return Err(Error::Stt("transcription input closed".to_string()));
                    }
                },
                Err(e) => tracing::warn!(error = %e, "undecodable media payload"),
            },
            InboundFrame::Mark {
                mark,
                sequence_number,
            } => {
                tracing::debug!(label = %mark.name, sequence_number = ?sequence_number, "mark acknowledged");
                self.sequencer.acknowledge(&mark.name);
            }
            InboundFrame::Dtmf { dtmf } => tracing::info!(digit = %dtmf.digit, "far end pressed a key"),
            InboundFrame::Stop {} => {
                tracing::info!("media stream stopped");
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }

    async fn handle_start(&mut self, start: StartMetadata) -> Result<()> {
        let span = tracing::Span::current();
        span.record("call_sid", start.call_sid.as_str());
        span.record("stream_sid", start.stream_sid.as_str());
        tracing::info!("media stream started");

        if let Some(brief) = self.registry.get(&start.call_sid).await {
            tracing::debug!(payor = %brief.payor_name, "loaded call brief");
            self.conversation.extend_system_prompt(&brief.prompt_context());
        }

        self.call_sid = Some(start.call_sid);
        self.stream_sid = Some(start.stream_sid);

        if let Some(greeting) = self.greeting.clone().filter(|g| !g.trim().is_empty()) {
            let turn = self.allocate_turn();
            let commands = self.sequencer.begin_turn(turn);
            self.play(commands).await?;

            self.conversation.push_assistant(greeting.clone());
            self.fanout.dispatch(Segment {
                key: SegmentKey::new(turn, 0),
                text: greeting,
            });

            let commands = self.sequencer.finish_turn(turn, 1);
            self.play(commands).await?;
        }

        Ok(())
    }

    async fn handle_recognition(&mut self, event: &super::RecognitionEvent) -> Result<()> {
        if !event.text.trim().is_empty() {
            if let Some(digits) = self.keypad.detect(&event.text) {
                self.send_signal_tone(digits);
            }
        }

        for signal in self.finalizer.ingest(event, Instant::now()) {
            self.apply_signal(signal).await?;
        }
        Ok(())
    }

    async fn handle_timeout(&mut self) -> Result<()> {
        if let Some(signal) = self.finalizer.on_timeout(Instant::now()) {
            self.apply_signal(signal).await?;
        }
        Ok(())
    }

    async fn apply_signal(&mut self, signal: TranscriptSignal) -> Result<()> {
        match signal {
            TranscriptSignal::InterimSpeech(text) => {
                let commands = self.sequencer.interrupt();
                if !commands.is_empty() {
                    tracing::info!(interim = %text, "caller interrupted playback");
                }
                self.play(commands).await
            }
            TranscriptSignal::Utterance { text, trigger } => {
                tracing::debug!(trigger = trigger.as_str(), "utterance ready");
                self.keypad.end_turn();
                self.start_completion(text).await
            }
        }
    }

    /// Begin a new reply turn for a finalized utterance
    async fn start_completion(&mut self, utterance: String) -> Result<()> {
        let turn = self.allocate_turn();
        tracing::info!(turn, utterance = %utterance, "starting completion");

        let commands = self.sequencer.begin_turn(turn);
        self.play(commands).await?;

        self.conversation.push_user(utterance);
        let messages = self.conversation.to_messages();

        let model = Arc::clone(&self.providers.completion);
        let fanout = self.fanout.clone();
        let events = self.events_tx.clone();

        tokio::spawn(
            async move {
                let outcome = generate_turn(model.as_ref(), messages, turn, |segment| {
                    fanout.dispatch(segment);
                })
                .await;
                let _ = events.send(SessionEvent::TurnFinished(outcome));
            }
            .instrument(tracing::Span::current()),
        );

        Ok(())
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Synthesized { key, item } => {
                let commands = self.sequencer.submit(key, item);
                self.play(commands).await
            }
            SessionEvent::TurnFinished(outcome) => {
                tracing::info!(
                    turn = outcome.turn,
                    segments = outcome.segments,
                    completed = outcome.completed,
                    "completion finished"
                );

                if outcome.turn + 1 == self.next_turn {
                    self.conversation.push_assistant(outcome.reply);
                } else {
                    tracing::debug!(turn = outcome.turn, "reply superseded, not kept in history");
                }

                let commands = self.sequencer.finish_turn(outcome.turn, outcome.segments);
                self.play(commands).await
            }
        }
    }

    fn allocate_turn(&mut self) -> u32 {
        let turn = self.next_turn;
        self.next_turn += 1;
        turn
    }

    /// Write sequencer output to the media socket
    async fn play(&mut self, commands: Vec<PlaybackCommand>) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }

        let stream_sid = self.stream_sid.clone().unwrap_or_default();
        for command in commands {
            let frame = match command {
                PlaybackCommand::Media { key, audio } => {
                    tracing::debug!(%key, bytes = audio.len(), "sending audio");
                    OutboundFrame::Media {
                        stream_sid: stream_sid.clone(),
                        media: OutboundMedia {
                            payload: BASE64.encode(&audio),
                        },
                    }
                }
                PlaybackCommand::Mark { label } => OutboundFrame::Mark {
                    stream_sid: stream_sid.clone(),
                    mark: MarkName { name: label },
                },
                PlaybackCommand::Clear => OutboundFrame::Clear {
                    stream_sid: stream_sid.clone(),
                },
            };

            self.outbound
                .send(frame)
                .await
                .map_err(|_| Error::ChannelClosed("media socket writer".to_string()))?;
        }

        Ok(())
    }

    fn send_signal_tone(&self, digits: String) {
        let Some(call_sid) = self.call_sid.clone() else {
            tracing::warn!(digits = %digits, "keypad prompt before stream start, no call to signal");
            return;
        };
        let telephony = Arc::clone(&self.providers.telephony);

        tokio::spawn(
            async move {
                match telephony.send_signal_tone(&call_sid, &digits).await {
                    Ok(()) => tracing::info!(digits = %digits, "sent keypad tone"),
                    Err(e) => tracing::error!(digits = %digits, error = %e, "failed to send keypad tone"),
                }
            }
            .instrument(tracing::Span::current()),
        );
    }

    async fn teardown(&mut self) {
        self.finalizer.reset();
        if let Some(call_sid) = &self.call_sid {
            self.registry.remove(call_sid).await;
        }
        tracing::info!(
            turns = self.next_turn,
            outstanding_marks = self.sequencer.marks().len(),
            "session ended"
        );
    }
}

/// Resolve at `deadline`, or never when unarmed
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
