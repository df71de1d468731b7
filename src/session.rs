use std::sync::Arc;

use chat_backend::{ByteStream, StreamRequest, StreamTransport};
use futures_util::StreamExt;
use gateway_api::{NdjsonDecoder, StreamEvent};
use time::OffsetDateTime;
use tokio::time::Instant;
use transcript_store::{StreamLease, TranscriptStore};

use crate::config::ChatConfig;

/// Lifecycle of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingFirstByte,
    Streaming,
    Retrying,
    Finalized,
    Stopped,
}

/// How a session ended, as reported to the facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Stream completed; carries the full accumulated text.
    Completed(String),
    /// Retry budget exhausted; carries the annotation written to the slot.
    Failed(String),
    /// Superseded by a newer send; carries whatever text was accumulated.
    Stopped(String),
    /// Credential rejected before any byte of the first attempt flowed.
    Unauthorized(String),
}

enum AttemptEnd {
    Completed,
    Failed(String),
    Superseded,
    Unauthorized(String),
}

enum ChunkRead {
    Chunk(Vec<u8>),
    Failed(String),
    Ended,
}

/// Drives exactly one generation to completion against the transcript store.
///
/// The session holds the lease for its (conversation, index) slot; every
/// store write is generation-checked, so a superseded session stops
/// affecting the transcript the moment its lease is revoked even while its
/// transport keeps delivering.
pub(crate) struct StreamingSession {
    store: TranscriptStore,
    transport: Arc<dyn StreamTransport>,
    config: ChatConfig,
    lease: StreamLease,
    request: StreamRequest,
    state: SessionState,
    attempt: u32,
    accumulated: String,
    supports_reasoning: bool,
}

impl StreamingSession {
    pub(crate) fn new(
        store: TranscriptStore,
        transport: Arc<dyn StreamTransport>,
        config: ChatConfig,
        lease: StreamLease,
        request: StreamRequest,
    ) -> Self {
        Self {
            store,
            transport,
            config,
            lease,
            request,
            state: SessionState::Idle,
            attempt: 0,
            accumulated: String::new(),
            supports_reasoning: true,
        }
    }

    pub(crate) async fn run(mut self) -> (SessionEnd, u32) {
        let end = self.drive().await;
        (end, self.attempt)
    }

    async fn drive(&mut self) -> SessionEnd {
        loop {
            match self.attempt_stream().await {
                AttemptEnd::Completed => {
                    self.state = SessionState::Finalized;
                    self.store.finalize_streamed_message(
                        &self.lease,
                        &self.accumulated,
                        OffsetDateTime::now_utc(),
                    );
                    tracing::info!(
                        conversation = %self.lease.conversation_id(),
                        index = self.lease.message_index(),
                        attempts = self.attempt,
                        "stream finalized"
                    );
                    return SessionEnd::Completed(self.accumulated.clone());
                }
                AttemptEnd::Superseded => {
                    self.state = SessionState::Stopped;
                    tracing::info!(
                        conversation = %self.lease.conversation_id(),
                        "session stopped: lease revoked by newer send"
                    );
                    return SessionEnd::Stopped(self.accumulated.clone());
                }
                AttemptEnd::Unauthorized(message)
                    if self.attempt == 0 && self.accumulated.is_empty() =>
                {
                    self.state = SessionState::Stopped;
                    return SessionEnd::Unauthorized(message);
                }
                AttemptEnd::Unauthorized(message) | AttemptEnd::Failed(message) => {
                    self.attempt += 1;
                    if self.attempt >= self.config.max_attempts {
                        let annotation = format!(
                            "Error after {} attempts: {message}",
                            self.config.max_attempts
                        );
                        self.store.finalize_streamed_message(
                            &self.lease,
                            &annotation,
                            OffsetDateTime::now_utc(),
                        );
                        self.state = SessionState::Finalized;
                        tracing::warn!(
                            conversation = %self.lease.conversation_id(),
                            attempts = self.attempt,
                            %message,
                            "retry budget exhausted"
                        );
                        return SessionEnd::Failed(annotation);
                    }

                    // Partial content from this attempt stays visible while
                    // we back off; the next attempt overwrites it only from
                    // its first successful delta.
                    if !self.accumulated.is_empty() {
                        self.store.patch_streamed_content(&self.lease, &self.accumulated);
                    }

                    self.state = SessionState::Retrying;
                    let backoff = self.config.backoff_base * self.attempt;
                    tracing::warn!(
                        conversation = %self.lease.conversation_id(),
                        attempt = self.attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        %message,
                        "stream attempt failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;

                    if !self.store.lease_is_current(&self.lease) {
                        self.state = SessionState::Stopped;
                        return SessionEnd::Stopped(self.accumulated.clone());
                    }
                }
            }
        }
    }

    async fn attempt_stream(&mut self) -> AttemptEnd {
        self.state = SessionState::AwaitingFirstByte;

        let mut stream = match self.transport.open(self.request.clone()).await {
            Ok(stream) => stream,
            Err(error) if error.is_unauthorized() => {
                return AttemptEnd::Unauthorized(error.to_string())
            }
            Err(error) => return AttemptEnd::Failed(error.to_string()),
        };

        let mut decoder = NdjsonDecoder::default();
        let mut flusher = DeltaFlusher::new(self.config.context.flush_interval());
        let mut overwrote_prior_attempt = false;

        loop {
            let chunk = match self.next_chunk(&mut stream).await {
                ChunkRead::Chunk(chunk) => chunk,
                ChunkRead::Failed(message) => return AttemptEnd::Failed(message),
                ChunkRead::Ended => {
                    return AttemptEnd::Failed("stream ended unexpectedly".to_string())
                }
            };

            for event in decoder.feed(&chunk) {
                if !self.store.lease_is_current(&self.lease) {
                    return AttemptEnd::Superseded;
                }

                match event {
                    StreamEvent::Start { supports_reasoning } => {
                        self.supports_reasoning = supports_reasoning;
                    }
                    StreamEvent::Delta { content } => {
                        self.state = SessionState::Streaming;
                        if !overwrote_prior_attempt {
                            self.accumulated.clear();
                            overwrote_prior_attempt = true;
                        }
                        self.accumulated.push_str(&content);
                        if flusher.should_flush() {
                            if !self
                                .store
                                .patch_streamed_content(&self.lease, &self.accumulated)
                            {
                                return AttemptEnd::Superseded;
                            }
                            flusher.mark_flushed();
                        }
                    }
                    StreamEvent::Reasoning { content } => {
                        if self.supports_reasoning
                            && !self.store.append_streamed_reasoning(&self.lease, &content)
                        {
                            return AttemptEnd::Superseded;
                        }
                    }
                    StreamEvent::Complete => return AttemptEnd::Completed,
                    StreamEvent::Error { message } => return AttemptEnd::Failed(message),
                }
            }
        }
    }

    async fn next_chunk(&self, stream: &mut ByteStream) -> ChunkRead {
        let next = stream.next();
        let item = match self.config.stall_timeout {
            Some(window) => match tokio::time::timeout(window, next).await {
                Ok(item) => item,
                Err(_) => return ChunkRead::Failed("stream stalled without events".to_string()),
            },
            None => next.await,
        };

        match item {
            Some(Ok(chunk)) => ChunkRead::Chunk(chunk),
            Some(Err(error)) => ChunkRead::Failed(error.to_string()),
            None => ChunkRead::Ended,
        }
    }
}

/// Coalesces delta flushes: the first delta flushes immediately so
/// time-to-first-token stays within one frame, later deltas flush at most
/// once per interval. Unflushed remainder is settled by finalization.
struct DeltaFlusher {
    interval: std::time::Duration,
    last_flush: Option<Instant>,
}

impl DeltaFlusher {
    fn new(interval: std::time::Duration) -> Self {
        Self {
            interval,
            last_flush: None,
        }
    }

    fn should_flush(&self) -> bool {
        match self.last_flush {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        }
    }

    fn mark_flushed(&mut self) {
        self.last_flush = Some(Instant::now());
    }
}
