//! Bulk upsert sink.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, Stream, StreamExt};

use relq_core::error::{RelqError, Result};
use relq_core::{Backend, FieldMap, WriteStreamOptions};

use crate::table::{Table, WriteMeta};

/// What a [`WriteStream`] reports, in completion order.
#[derive(Debug)]
pub enum WriteEvent {
    /// a row was written (inserted or updated)
    Data(FieldMap),
    /// statement details of the write just reported by `Data`
    Meta(WriteMeta),
    /// a duplicate suppressed by `ignore_dupes`
    Dupe(FieldMap),
    /// a write failed and the stream accepts no more rows
    ///
    /// A failed write has no statement details, so the row that failed
    /// stands in for them.
    Error { error: RelqError, row: FieldMap },
    /// one in-flight write completed
    Drain,
    Finish,
    Close,
    End,
}

/// Totals of a finished write stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub dupes: usize,
}

type PendingWrite = BoxFuture<'static, (FieldMap, Result<WriteMeta>)>;

/// Upserts every row handed to [`write`](Self::write) through
/// [`Table::put`].
///
/// Writes start as soon as they are submitted and run concurrently; nothing
/// bounds how many are in flight. Events are observed by polling the stream
/// (or through [`finish`](Self::finish)). After [`end`](Self::end), the stream
/// yields `Finish`, `Close` and `End` once every in-flight write has
/// completed, then ends.
///
/// A failed write stops intake but not the writes already submitted: each
/// of them still completes and is reported, then the stream ends without
/// the `Finish`, `Close` and `End` tail.
pub struct WriteStream<B: Backend> {
    table: Table<B>,
    options: WriteStreamOptions,
    in_flight: FuturesUnordered<PendingWrite>,
    events: VecDeque<WriteEvent>,
    ended: bool,
    failed: bool,
    done: bool,
    summary: WriteSummary,
    waker: Option<Waker>,
}

impl<B: Backend> WriteStream<B> {
    pub(crate) fn new(table: Table<B>, options: WriteStreamOptions) -> Self {
        Self {
            table,
            options,
            in_flight: FuturesUnordered::new(),
            events: VecDeque::new(),
            ended: false,
            failed: false,
            done: false,
            summary: WriteSummary::default(),
            waker: None,
        }
    }

    /// Submits one row.
    pub fn write(&mut self, row: FieldMap) -> Result<()> {
        if self.ended {
            return Err(RelqError::validation("write after end"));
        }
        if self.failed {
            return Err(RelqError::validation("write after a failed write"));
        }

        let table = self.table.clone();
        let options = self.options.put_options();
        self.in_flight.push(
            async move {
                let result = table.put(row.clone(), &options).await;
                (row, result)
            }
            .boxed(),
        );
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
        Ok(())
    }

    /// Stops accepting rows.
    pub fn end(&mut self) {
        self.ended = true;
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    /// Submits a last row, then ends.
    pub fn end_with(&mut self, row: FieldMap) -> Result<()> {
        self.write(row)?;
        self.end();
        Ok(())
    }

    /// Number of writes submitted but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn summary(&self) -> WriteSummary {
        self.summary
    }

    /// Ends the stream and waits for every submitted write.
    ///
    /// Returns the first error the stream reports, once the writes still in
    /// flight have completed.
    pub async fn finish(mut self) -> Result<WriteSummary> {
        self.end();
        let mut first_error = None;
        while let Some(event) = self.next().await {
            if let WriteEvent::Error { error, .. } = event {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(self.summary),
        }
    }

    fn record(&mut self, row: FieldMap, result: Result<WriteMeta>) {
        match result {
            Ok(meta) => {
                self.summary.written += 1;
                self.events.push_back(WriteEvent::Data(row));
                self.events.push_back(WriteEvent::Meta(meta));
                self.events.push_back(WriteEvent::Drain);
            }
            Err(error) if self.options.ignore_dupes && error.is_duplicate() => {
                relq_core::relq_trace_write!("dupe", self.table.definition().table());
                self.summary.dupes += 1;
                self.events.push_back(WriteEvent::Dupe(row));
                self.events.push_back(WriteEvent::Drain);
            }
            Err(error) => {
                self.failed = true;
                self.events.push_back(WriteEvent::Error { error, row });
            }
        }
    }
}

impl<B: Backend> Stream for WriteStream<B> {
    type Item = WriteEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(event) = this.events.pop_front() {
                return Poll::Ready(Some(event));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match this.in_flight.poll_next_unpin(cx) {
                Poll::Ready(Some((row, result))) => this.record(row, result),
                Poll::Ready(None) if this.failed => this.done = true,
                Poll::Ready(None) if this.ended => {
                    this.events
                        .extend([WriteEvent::Finish, WriteEvent::Close, WriteEvent::End]);
                    this.done = true;
                }
                _ => {
                    this.waker = Some(cx.waker().clone());
                    return Poll::Pending;
                }
            }
        }
    }
}
