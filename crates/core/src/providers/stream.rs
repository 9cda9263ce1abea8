//! Normalization of provider replies into [`ProviderEvent`] streams.

use crate::error::{AppError, Result};
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// Text surfaced in place of the answer when the transport fails.
pub const STREAM_ERROR_MESSAGE: &str = "An error occurred while streaming.";

/// What a provider surfaces for a text request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// One piece of the answer.
    Fragment(String),
    /// The provider's safety filter rejected the request. Terminal.
    Blocked(String),
    /// The answer is over (finished, failed, or cancelled).
    Complete,
}

/// Lazy, finite, non-restartable sequence of events.
pub type ResponseStream = BoxStream<'static, ProviderEvent>;

/// Raw text chunks as they arrive from the network.
pub(crate) type ChunkStream = BoxStream<'static, Result<String>>;

/// What a variant got back before normalization.
pub(crate) enum Reply {
    Text(String),
    Chunks(ChunkStream),
}

/// Cooperative cancellation flag shared between a provider and its requests.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<TokenState>);

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`Self::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Drives `request` to completion unless `token` is cancelled first, in which
/// case the request future is dropped, aborting its network call.
pub(crate) async fn until_cancelled<T>(
    token: &CancelToken,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        result = request => result,
        _ = token.cancelled() => {
            debug!("request cancelled");
            Err(AppError::Cancelled)
        }
    }
}

/// Tracks the in-flight request of one provider.
#[derive(Debug, Default)]
pub(crate) struct ActiveRequest(Mutex<Option<CancelToken>>);

impl ActiveRequest {
    /// Registers a new request, cancelling the one it supersedes.
    pub(crate) fn begin(&self) -> CancelToken {
        let token = CancelToken::default();
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    pub(crate) fn cancel(&self) {
        let slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }
}

/// Strips trailing newlines only; leading and inner whitespace is kept.
fn strip_trailing_newlines(text: &str) -> String {
    text.trim_end_matches(['\n', '\r']).to_string()
}

enum Pump {
    Streaming(ChunkStream, CancelToken),
    Finishing,
    Done,
}

/// Converts the outcome of a request into the event stream callers consume.
pub(crate) fn into_events(reply: Result<Reply>, token: CancelToken) -> ResponseStream {
    match reply {
        Ok(Reply::Text(text)) => stream::iter([
            ProviderEvent::Fragment(text.trim().to_string()),
            ProviderEvent::Complete,
        ])
        .boxed(),
        Ok(Reply::Chunks(chunks)) => pump(chunks, token),
        Err(AppError::Blocked(reason)) => {
            warn!("Response was blocked due to safety settings: {}", reason);
            stream::once(async move { ProviderEvent::Blocked(reason) }).boxed()
        }
        Err(e) => {
            error!("Request failed: {}", e);
            failed()
        }
    }
}

fn failed() -> ResponseStream {
    stream::iter([
        ProviderEvent::Fragment(STREAM_ERROR_MESSAGE.to_string()),
        ProviderEvent::Complete,
    ])
    .boxed()
}

fn pump(chunks: ChunkStream, token: CancelToken) -> ResponseStream {
    stream::unfold(Pump::Streaming(chunks, token), |state| async move {
        match state {
            Pump::Streaming(mut chunks, token) => {
                if token.is_cancelled() {
                    debug!("stream cancelled before next fragment");
                    return Some((ProviderEvent::Complete, Pump::Done));
                }
                match chunks.next().await {
                    _ if token.is_cancelled() => {
                        debug!("stream cancelled while waiting");
                        Some((ProviderEvent::Complete, Pump::Done))
                    }
                    Some(Ok(text)) => Some((
                        ProviderEvent::Fragment(strip_trailing_newlines(&text)),
                        Pump::Streaming(chunks, token),
                    )),
                    Some(Err(AppError::Blocked(reason))) => {
                        warn!("Response was blocked mid-stream: {}", reason);
                        Some((ProviderEvent::Blocked(reason), Pump::Done))
                    }
                    Some(Err(e)) => {
                        error!("Error while streaming: {}", e);
                        Some((
                            ProviderEvent::Fragment(STREAM_ERROR_MESSAGE.to_string()),
                            Pump::Finishing,
                        ))
                    }
                    None => Some((ProviderEvent::Complete, Pump::Done)),
                }
            }
            Pump::Finishing => Some((ProviderEvent::Complete, Pump::Done)),
            Pump::Done => None,
        }
    })
    .boxed()
}
