use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;
use crate::core::ProgressReporter;

pin_project! {
    /// Wraps a body stream and reports how much of it has been read.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        reporter: ProgressReporter,
        bytes_sent: u64,
        total_bytes: u64,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, reporter: ProgressReporter, total_bytes: u64) -> Self {
        Self {
            inner,
            reporter,
            bytes_sent: 0,
            total_bytes,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_sent += chunk.len() as u64;
                    this.reporter.report_bytes(*this.bytes_sent, *this.total_bytes);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Splits a payload into fixed-size chunks for streaming.
pub fn chunked(data: Bytes, chunk_size: usize) -> impl Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static {
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
        .collect();

    futures_util::stream::iter(chunks)
}
