//! Chat session: one streamed assistant turn at a time.
//!
//! A turn pushes the user message, opens a completion stream, and folds
//! the body through a `FrameParser` and a `DeltaAccumulator`. The
//! assistant message appears in the log with its first delta and grows in
//! place. A second turn while one is streaming is rejected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::prompts::PROPOSE_FIX_MESSAGE;
use crate::llm::{CompletionRequest, CompletionTransport, LlmError};
use crate::stream::{ChunkDelta, DeltaAccumulator, FrameParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
}

/// How a turn's stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// `data: [DONE]` received.
    Done,
    /// The body ended without the terminator.
    Closed,
    /// `cancel()` was called mid-stream.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub text: String,
    pub end: StreamEnd,
    pub deltas: usize,
    pub malformed_frames: usize,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("a reply is already streaming")]
    TurnInProgress,

    #[error("request failed: {0}")]
    Transport(#[from] LlmError),

    /// The stream failed after it started. The partial reply stays in the log.
    #[error("stream interrupted: {source}")]
    Interrupted {
        partial: String,
        #[source]
        source: LlmError,
    },
}

enum Step {
    Cancelled,
    Chunk(Result<bytes::Bytes, LlmError>),
    Eof,
}

pub struct ChatSession<T> {
    transport: T,
    messages: Mutex<Vec<ChatMessage>>,
    turn: tokio::sync::Mutex<()>,
    streaming: AtomicBool,
    cancel: watch::Sender<bool>,
}

/// Clears the in-flight flag however the turn ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: CompletionTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            transport,
            messages: Mutex::new(Vec::new()),
            turn: tokio::sync::Mutex::new(()),
            streaming: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `message` about `document` and stream the reply.
    ///
    /// `on_delta` runs after every accepted delta with the delta and the
    /// full reply so far.
    pub async fn send<F>(&self, message: &str, document: &str, mut on_delta: F) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&ChunkDelta, &str) + Send,
    {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let _turn = self.turn.try_lock().map_err(|_| ChatError::TurnInProgress)?;
        let _in_flight = InFlight::start(&self.streaming);

        self.cancel.send_replace(false);
        let mut cancelled = self.cancel.subscribe();

        self.push(Role::User, message);
        let request = CompletionRequest::chat(message, document);
        info!(chars = message.len(), "starting chat turn");

        let mut body = self.transport.open_stream(&request).await.inspect_err(|e| {
            warn!(error = %e, "failed to open completion stream");
        })?;

        let mut parser = FrameParser::new();
        let mut acc = DeltaAccumulator::new();
        let mut reply: Option<Uuid> = None;

        let end = loop {
            let step = tokio::select! {
                biased;
                _ = cancelled.wait_for(|c| *c) => Step::Cancelled,
                item = body.next() => match item {
                    Some(chunk) => Step::Chunk(chunk),
                    None => Step::Eof,
                },
            };

            match step {
                Step::Cancelled => {
                    parser.cancel();
                    break StreamEnd::Cancelled;
                }
                Step::Eof => {
                    parser.finish();
                    break StreamEnd::Closed;
                }
                Step::Chunk(Err(source)) => {
                    parser.cancel();
                    return Err(self.interrupted(acc, source));
                }
                Step::Chunk(Ok(bytes)) => {
                    let frames = match parser.feed_bytes(&bytes) {
                        Ok(frames) => frames,
                        Err(e) => return Err(self.interrupted(acc, e.into())),
                    };
                    for frame in &frames {
                        if let Some(delta) = acc.accept(frame) {
                            self.append_reply(&mut reply, &delta.text);
                            on_delta(&delta, acc.current_text());
                        }
                    }
                    if acc.saw_done() {
                        parser.cancel();
                        break StreamEnd::Done;
                    }
                }
            }
        };

        acc.close();
        debug!(?end, deltas = acc.delta_count(), malformed = acc.malformed_frames(), "chat turn finished");
        Ok(TurnOutcome {
            deltas: acc.delta_count(),
            malformed_frames: acc.malformed_frames(),
            text: acc.into_text(),
            end,
        })
    }

    /// Ask the assistant to review `document` for errors.
    pub async fn propose_fix<F>(&self, document: &str, on_delta: F) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&ChunkDelta, &str) + Send,
    {
        self.send(PROPOSE_FIX_MESSAGE, document, on_delta).await
    }

    /// Stop the turn in flight. Buffered partial lines are discarded; the
    /// reply so far is kept.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether a turn is in flight. Never touches the turn lock.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock_messages().clone()
    }

    pub fn clear(&self) {
        self.lock_messages().clear();
    }

    fn lock_messages(&self) -> std::sync::MutexGuard<'_, Vec<ChatMessage>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, role: Role, text: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock_messages().push(ChatMessage {
            id,
            role,
            text: text.to_string(),
        });
        id
    }

    /// Grow the reply for this turn, creating it on the first delta.
    fn append_reply(&self, reply: &mut Option<Uuid>, fragment: &str) {
        let Some(id) = *reply else {
            *reply = Some(self.push(Role::Assistant, fragment));
            return;
        };
        let mut messages = self.lock_messages();
        match messages.iter_mut().rev().find(|m| m.id == id) {
            Some(message) => message.text.push_str(fragment),
            // The log was cleared mid-turn: start a fresh reply.
            None => {
                drop(messages);
                *reply = Some(self.push(Role::Assistant, fragment));
            }
        }
    }

    fn interrupted(&self, mut acc: DeltaAccumulator, source: LlmError) -> ChatError {
        acc.close();
        warn!(error = %source, chars = acc.current_text().len(), "chat stream interrupted");
        ChatError::Interrupted {
            partial: acc.into_text(),
            source,
        }
    }
}
