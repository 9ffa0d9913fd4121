// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Row transport between processors.
//!
//! A processor pulls [`StreamItem`]s from a [`RowSource`] and pushes rows
//! and metadata into a [`RowReceiver`]. The receiver answers every push
//! with a [`ConsumerStatus`] telling the producer whether it still wants
//! rows.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::error::FlowSortError;
use crate::row::Row;

/// Out-of-band information travelling with rows
#[derive(Debug)]
pub enum ProducerMetadata {
    /// An upstream processor failed. Consumers stop and forward the error.
    Error(FlowSortError),
    /// Tracing information collected upstream, forwarded untouched
    TraceData(Vec<String>),
}

impl ProducerMetadata {
    pub fn is_error(&self) -> bool {
        matches!(self, ProducerMetadata::Error(_))
    }
}

impl fmt::Display for ProducerMetadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProducerMetadata::Error(e) => write!(f, "error: {e}"),
            ProducerMetadata::TraceData(spans) => write!(f, "trace: {}", spans.join(", ")),
        }
    }
}

/// One item of a row stream
#[derive(Debug)]
pub enum StreamItem {
    Row(Row),
    Meta(ProducerMetadata),
}

/// The answer of a [`RowReceiver`] to a push
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsumerStatus {
    /// Keep sending rows and metadata
    #[default]
    NeedMoreRows,
    /// Stop sending rows, metadata is still accepted
    DrainRequested,
    /// Stop sending anything
    ConsumerClosed,
}

impl ConsumerStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConsumerStatus::NeedMoreRows,
            1 => ConsumerStatus::DrainRequested,
            _ => ConsumerStatus::ConsumerClosed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConsumerStatus::NeedMoreRows => 0,
            ConsumerStatus::DrainRequested => 1,
            ConsumerStatus::ConsumerClosed => 2,
        }
    }
}

/// Pull side of a row stream
#[async_trait]
pub trait RowSource: Send {
    /// Schema of the rows produced by this source
    fn schema(&self) -> SchemaRef;

    /// Returns the next item, or `None` once the producer is done
    async fn next(&mut self) -> Option<StreamItem>;

    /// Tells the producer that no more rows are needed. Metadata is still
    /// expected until the stream ends.
    fn consumer_done(&mut self) {}

    /// Tells the producer that nothing more will be read
    fn consumer_closed(&mut self) {}
}

/// Push side of a row stream
#[async_trait]
pub trait RowReceiver: Send {
    /// Sends one row downstream
    async fn push(&mut self, row: Row) -> ConsumerStatus;

    /// Sends one metadata item downstream
    async fn push_metadata(&mut self, meta: ProducerMetadata) -> ConsumerStatus;

    /// Signals that the producer is done, with the error that ended it, if
    /// any. No pushes may follow.
    async fn close(&mut self, err: Option<FlowSortError>);
}

/// Creates a bounded channel connecting two processors.
///
/// The [`RowChannelSender`] is the [`RowReceiver`] the producer pushes
/// into and the [`RowChannelReceiver`] is the [`RowSource`] the consumer
/// reads from. The consumer's status is shared through an atomic so that
/// pushes after [`RowSource::consumer_done`] report
/// [`ConsumerStatus::DrainRequested`] without blocking.
pub fn row_channel(
    schema: SchemaRef,
    capacity: usize,
) -> (RowChannelSender, RowChannelReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let status = Arc::new(AtomicU8::new(ConsumerStatus::NeedMoreRows.as_u8()));
    (
        RowChannelSender {
            tx: Some(tx),
            status: Arc::clone(&status),
        },
        RowChannelReceiver { schema, rx, status },
    )
}

/// Producer end of [`row_channel`]
#[derive(Debug)]
pub struct RowChannelSender {
    tx: Option<Sender<StreamItem>>,
    status: Arc<AtomicU8>,
}

impl RowChannelSender {
    fn status(&self) -> ConsumerStatus {
        ConsumerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    async fn send(&mut self, item: StreamItem) -> ConsumerStatus {
        let Some(tx) = &self.tx else {
            return ConsumerStatus::ConsumerClosed;
        };
        if tx.send(item).await.is_err() {
            // receiver hung up
            self.status
                .store(ConsumerStatus::ConsumerClosed.as_u8(), Ordering::Release);
        }
        self.status()
    }
}

#[async_trait]
impl RowReceiver for RowChannelSender {
    async fn push(&mut self, row: Row) -> ConsumerStatus {
        match self.status() {
            ConsumerStatus::NeedMoreRows => self.send(StreamItem::Row(row)).await,
            status => status,
        }
    }

    async fn push_metadata(&mut self, meta: ProducerMetadata) -> ConsumerStatus {
        match self.status() {
            ConsumerStatus::ConsumerClosed => ConsumerStatus::ConsumerClosed,
            _ => self.send(StreamItem::Meta(meta)).await,
        }
    }

    async fn close(&mut self, err: Option<FlowSortError>) {
        if let Some(err) = err {
            if self.status() != ConsumerStatus::ConsumerClosed {
                self.send(StreamItem::Meta(ProducerMetadata::Error(err)))
                    .await;
            }
        }
        // dropping the sender ends the stream
        self.tx = None;
    }
}

/// Consumer end of [`row_channel`]
#[derive(Debug)]
pub struct RowChannelReceiver {
    schema: SchemaRef,
    rx: Receiver<StreamItem>,
    status: Arc<AtomicU8>,
}

#[async_trait]
impl RowSource for RowChannelReceiver {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    fn consumer_done(&mut self) {
        let _ = self.status.compare_exchange(
            ConsumerStatus::NeedMoreRows.as_u8(),
            ConsumerStatus::DrainRequested.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn consumer_closed(&mut self) {
        self.status
            .store(ConsumerStatus::ConsumerClosed.as_u8(), Ordering::Release);
        self.rx.close();
    }
}

/// Finishes a processor: drains whatever is left in `input`, forwards the
/// non-error metadata found there and closes `output`.
///
/// `status` is the last answer the processor got from `output`. Once it is
/// [`ConsumerStatus::ConsumerClosed`] nothing but the close is pushed, and
/// the producer is told so. Metadata is not forwarded after a cancellation
/// either, since nobody may be reading anymore.
///
/// The sink is closed with `cause` if there is one. Otherwise the first
/// error found while draining is used, and later errors are only logged.
/// A cancellation is not reported to the sink.
pub async fn drain_and_close(
    input: &mut dyn RowSource,
    output: &mut dyn RowReceiver,
    status: ConsumerStatus,
    cause: Option<FlowSortError>,
) {
    let mut forward = status != ConsumerStatus::ConsumerClosed;
    if forward {
        input.consumer_done();
    } else {
        input.consumer_closed();
    }
    if cause.as_ref().is_some_and(|e| e.is_cancellation()) {
        forward = false;
    }

    let mut first_err = cause;
    let mut drained_rows = 0usize;
    while let Some(item) = input.next().await {
        match item {
            StreamItem::Row(_) => drained_rows += 1,
            StreamItem::Meta(ProducerMetadata::Error(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                } else {
                    warn!("error while draining input: {e}");
                }
            }
            StreamItem::Meta(meta) => {
                if forward
                    && output.push_metadata(meta).await == ConsumerStatus::ConsumerClosed
                {
                    forward = false;
                }
            }
        }
    }
    if drained_rows > 0 {
        trace!("drained {drained_rows} unread rows");
    }

    let err = first_err.filter(|e| {
        if e.is_cancellation() {
            debug!("closing output after cancellation");
            false
        } else {
            true
        }
    });
    output.close(err).await;
}
