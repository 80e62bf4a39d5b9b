use crate::core::metrics::get_metrics;
use crate::core::StreamCancelHandle;
use axum::body::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream wrapper that triggers a cancellation handle when dropped.
///
/// Hyper drops the response body as soon as the client goes away, so a
/// drop before the relay marked the handle completed is a disconnect.
/// Dropping also drops the wrapped stream, which releases the upstream
/// connection.
pub struct DisconnectStream<S> {
    pub stream: S,
    pub cancel_handle: StreamCancelHandle,
}

impl<S> DisconnectStream<S> {
    pub fn new(stream: S, cancel_handle: StreamCancelHandle) -> Self {
        Self {
            stream,
            cancel_handle,
        }
    }
}

impl<S, E> Stream for DisconnectStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        if self.cancel_handle.cancel() {
            get_metrics().client_disconnects.inc();
            tracing::info!("Client disconnected before stream completed");
        }
    }
}
