//! Streaming chat turns
//!
//! [`ChatSession::send_turn`] submits one utterance and renders the reply as
//! it streams in. Each turn moves through
//! `Idle -> Sent -> {Failed | EmptyStream | Streaming -> Completed | Interrupted | Cancelled}`
//! and every transition is published as a [`TurnEvent`].
//!
//! `send_turn` borrows the session mutably, so a transcript never has more
//! than one turn in flight and the streaming loop is its only writer.

use crate::api::{read_error_message, ChatStreamRequest, ChatTransport};
use crate::session::SessionContext;
use crate::streaming::Utf8StreamDecoder;
use crate::transcript::{ChatTurn, Transcript};
use crate::{Result, TreeholeError};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of one submitted turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Nothing submitted yet
    Idle,
    /// Request sent, no response yet
    Sent,
    /// Reply body is being consumed
    Streaming,
    /// Reply fully received
    Completed,
    /// Request rejected or answered with an error
    Failed,
    /// Successful response without a body
    EmptyStream,
    /// Transport failed mid-reply
    Interrupted,
    /// Stopped by the caller
    Cancelled,
}

impl TurnState {
    /// Whether a "composing" indicator should be visible
    pub fn is_composing(&self) -> bool {
        matches!(self, TurnState::Sent | TurnState::Streaming)
    }

    /// Whether the turn is over
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Completed
                | TurnState::Failed
                | TurnState::EmptyStream
                | TurnState::Interrupted
                | TurnState::Cancelled
        )
    }
}

/// Something a renderer should show
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// The user's turn was added to the transcript
    UserTurnAppended(ChatTurn),
    /// The turn moved to a new state
    StateChanged(TurnState),
    /// The "waiting for reply" indicator switched on or off
    Waiting(bool),
    /// The assistant record now exists and starts with this text
    AssistantStarted(String),
    /// More assistant text, in arrival order
    Fragment(String),
    /// Transient user-facing message
    Notice(String),
}

/// How a turn ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The stream ran to completion
    Completed {
        /// Round identifier sent with the request
        round_id: String,
        /// Full assistant reply, empty if nothing visible arrived
        content: String,
    },
    /// The caller cancelled; the partial reply stays in the transcript
    Cancelled {
        /// Round identifier sent with the request
        round_id: String,
        /// Assistant text received before cancellation
        partial: String,
    },
}

/// Visible text produced by one decoded fragment
#[derive(Debug, Clone, PartialEq)]
enum ReplyDelta {
    /// First visible text: the assistant record should be created with it
    Start(String),
    /// Text to append to the existing record
    Append(String),
}

/// Holds back leading blank text until something visible arrives
#[derive(Debug, Default)]
struct ReplyAssembler {
    pending: String,
    content: String,
    started: bool,
}

impl ReplyAssembler {
    fn push(&mut self, text: &str) -> Option<ReplyDelta> {
        if text.is_empty() {
            return None;
        }
        if self.started {
            self.content.push_str(text);
            return Some(ReplyDelta::Append(text.to_string()));
        }
        self.pending.push_str(text);
        if text.trim().is_empty() {
            return None;
        }
        self.started = true;
        self.content = std::mem::take(&mut self.pending);
        Some(ReplyDelta::Start(self.content.clone()))
    }

    fn content(&self) -> &str {
        &self.content
    }
}

enum StreamEnd {
    Finished,
    Cancelled,
}

/// One conversation: transcript plus the transport that feeds it
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    transcript: Transcript,
    state: TurnState,
    waiting: bool,
    events: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl ChatSession {
    /// New session with an empty transcript
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            transcript: Transcript::new(),
            state: TurnState::Idle,
            waiting: false,
            events: None,
        }
    }

    /// Create an event channel and return its receiver
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TurnEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Conversation so far
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// State of the most recent turn
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether the waiting indicator is on
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Append previously stored turns, skipping empty ones
    pub fn restore_history(&mut self, turns: impl IntoIterator<Item = ChatTurn>) -> usize {
        let mut restored = 0;
        for turn in turns.into_iter().filter(|t| !t.content.is_empty()) {
            self.transcript.push(turn);
            restored += 1;
        }
        debug!(restored, "History restored");
        restored
    }

    /// Submit one utterance and stream the reply into the transcript
    ///
    /// An invalid identity or blank utterance is rejected before anything is
    /// sent. Otherwise the user turn is appended immediately and the call
    /// resolves once the turn reaches a terminal state.
    pub async fn send_turn(
        &mut self,
        ctx: &SessionContext,
        utterance: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let identity = match ctx.identity() {
            Ok(id) => id,
            Err(e) => {
                warn!(user_id = %ctx.user_id, "Rejected turn with invalid identity");
                self.emit(TurnEvent::Notice(e.user_notice()));
                return Err(e);
            }
        };
        let text = utterance.trim();
        if text.is_empty() {
            return Err(TreeholeError::validation("message is empty"));
        }

        let user_turn = ChatTurn::user(text);
        self.transcript.push(user_turn.clone());
        self.emit(TurnEvent::UserTurnAppended(user_turn));

        let round_id = uuid::Uuid::new_v4().to_string();
        let request = ChatStreamRequest {
            user_id: identity.as_str().to_string(),
            user_input: text.to_string(),
            round_id: Some(round_id.clone()),
            character_id: ctx.character_id.clone(),
        };

        self.set_state(TurnState::Sent);
        self.set_waiting(true);

        let result = self.run_turn(&request, round_id, cancel).await;

        self.set_waiting(false);
        self.transcript.seal();
        let terminal = match &result {
            Ok(TurnOutcome::Completed { .. }) => TurnState::Completed,
            Ok(TurnOutcome::Cancelled { .. }) => TurnState::Cancelled,
            Err(TreeholeError::EmptyStream) => TurnState::EmptyStream,
            Err(TreeholeError::StreamInterrupted(_)) => TurnState::Interrupted,
            Err(_) => TurnState::Failed,
        };
        if let Err(e) = &result {
            warn!(error = %e, "Chat turn failed");
            self.emit(TurnEvent::Notice(e.user_notice()));
        }
        self.set_state(terminal);
        result
    }

    async fn run_turn(
        &mut self,
        request: &ChatStreamRequest,
        round_id: String,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let transport = Arc::clone(&self.transport);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%round_id, "Turn cancelled before a response arrived");
                return Ok(TurnOutcome::Cancelled { round_id, partial: String::new() });
            }
            response = transport.open_chat_stream(request) => response?,
        };

        if !response.is_success() || response.is_error_shaped() {
            debug!(?response, "Error-shaped chat response");
            let msg = read_error_message(response).await;
            return Err(TreeholeError::RequestFailed(msg));
        }
        let mut body = match response.body {
            Some(body) => body,
            None => return Err(TreeholeError::EmptyStream),
        };

        self.set_state(TurnState::Streaming);
        let mut decoder = Utf8StreamDecoder::new();
        let mut assembler = ReplyAssembler::default();

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamEnd::Cancelled,
                next = body.next() => next,
            };
            match next {
                Some(Ok(bytes)) => {
                    let text = decoder.decode(&bytes);
                    self.absorb(&mut assembler, &text)?;
                }
                Some(Err(e)) => {
                    warn!(
                        %round_id,
                        received = assembler.content().len(),
                        "Stream interrupted: {}",
                        e
                    );
                    return Err(TreeholeError::stream_interrupted(e.to_string()));
                }
                None => break StreamEnd::Finished,
            }
        };

        match end {
            StreamEnd::Cancelled => {
                info!(%round_id, "Turn cancelled mid-stream");
                Ok(TurnOutcome::Cancelled {
                    round_id,
                    partial: assembler.content().to_string(),
                })
            }
            StreamEnd::Finished => {
                let tail = decoder.finish();
                self.absorb(&mut assembler, &tail)?;
                if assembler.content().is_empty() {
                    warn!(%round_id, "Stream completed without visible text");
                }
                debug!(%round_id, chars = assembler.content().chars().count(), "Turn completed");
                Ok(TurnOutcome::Completed {
                    round_id,
                    content: assembler.content().to_string(),
                })
            }
        }
    }

    fn absorb(&mut self, assembler: &mut ReplyAssembler, text: &str) -> Result<()> {
        match assembler.push(text) {
            Some(ReplyDelta::Start(initial)) => {
                self.set_waiting(false);
                self.transcript.open_assistant(initial.clone());
                self.emit(TurnEvent::AssistantStarted(initial));
            }
            Some(ReplyDelta::Append(more)) => {
                self.transcript.append_to_open(&more)?;
                self.emit(TurnEvent::Fragment(more));
            }
            None => {}
        }
        Ok(())
    }

    fn set_state(&mut self, state: TurnState) {
        if self.state != state {
            self.state = state;
            self.emit(TurnEvent::StateChanged(state));
        }
    }

    fn set_waiting(&mut self, waiting: bool) {
        if self.waiting != waiting {
            self.waiting = waiting;
            self.emit(TurnEvent::Waiting(waiting));
        }
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.events {
            // A dropped renderer must not break the conversation
            let _ = tx.send(event);
        }
    }
}
