//! Streaming Pipeline: a live row source adapted into a hydrated row stream.

use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesOrdered, Stream, StreamExt};
use serde_json::Value;

use relq_core::error::Result;
use relq_core::{FieldMap, Row, RowStream};

type Hydrate = Box<dyn Fn(FieldMap) -> BoxFuture<'static, Result<Row>> + Send>;

/// Hydrated rows of a read, in source order.
///
/// Rows are pulled from the source as fast as they arrive and their
/// hydration starts immediately, so several rows' sub-fetches may be in
/// flight at once. The stream ends only after the source has ended and
/// every started hydration has completed. Source and hydration errors are
/// yielded as they happen and do not end the stream.
pub struct ReadStream {
    source: Option<RowStream>,
    hydrate: Hydrate,
    pending: FuturesOrdered<BoxFuture<'static, Result<Row>>>,
    paused: bool,
    waker: Option<Waker>,
}

impl ReadStream {
    pub(crate) fn new<F>(source: RowStream, hydrate: F) -> Self
    where
        F: Fn(FieldMap) -> BoxFuture<'static, Result<Row>> + Send + 'static,
    {
        Self {
            source: Some(source),
            hydrate: Box::new(hydrate),
            pending: FuturesOrdered::new(),
            paused: false,
            waker: None,
        }
    }

    /// Stops pulling new rows from the source. Rows already being hydrated
    /// still complete and are still yielded.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Rows whose hydration has started but not been yielded.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl Stream for ReadStream {
    type Item = Result<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            let mut pulled = false;
            if !this.paused
                && let Some(source) = this.source.as_mut()
            {
                match source.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(flat))) => {
                        this.pending.push_back((this.hydrate)(flat));
                        pulled = true;
                    }
                    Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err.into()))),
                    Poll::Ready(None) => this.source = None,
                    Poll::Pending => {}
                }
            }

            match this.pending.poll_next_unpin(cx) {
                Poll::Ready(Some(row)) => return Poll::Ready(Some(row)),
                Poll::Ready(None) if this.source.is_none() => return Poll::Ready(None),
                _ => {}
            }

            if !pulled {
                if this.paused {
                    this.waker = Some(cx.waker().clone());
                }
                return Poll::Pending;
            }
        }
    }
}

/// Primary-key values of a read, in source order.
pub struct KeyStream {
    rows: ReadStream,
    primary_key: String,
}

impl KeyStream {
    pub(crate) fn new(rows: ReadStream, primary_key: &str) -> Self {
        Self {
            rows,
            primary_key: primary_key.to_string(),
        }
    }

    pub fn pause(&mut self) {
        self.rows.pause();
    }

    pub fn resume(&mut self) {
        self.rows.resume();
    }
}

impl Stream for KeyStream {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let primary_key = &this.primary_key;
        this.rows.poll_next_unpin(cx).map(|item| {
            item.map(|row| {
                row.map(|row| row.get(primary_key).cloned().unwrap_or(Value::Null))
            })
        })
    }
}
