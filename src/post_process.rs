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

//! Offset, limit and projection applied to the rows a processor emits

use arrow::datatypes::Schema;
use log::trace;
use tokio_util::sync::CancellationToken;

use crate::config_err;
use crate::error::{FlowSortError, Result};
use crate::row::Row;
use crate::stream::{ConsumerStatus, ProducerMetadata, RowReceiver, RowSource, StreamItem};

/// What a processor does to its rows before they leave it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostProcessSpec {
    /// Number of leading rows to discard
    pub offset: usize,
    /// Maximum number of rows to emit after the offset, 0 for no limit
    pub limit: usize,
    /// Columns to keep, in output order. `None` keeps every column.
    pub output_columns: Option<Vec<usize>>,
}

impl PostProcessSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_output_columns(mut self, output_columns: Vec<usize>) -> Self {
        self.output_columns = Some(output_columns);
        self
    }

    /// Number of rows a producer has to retain to satisfy this spec, or 0
    /// if every row is needed
    pub fn row_cap(&self) -> usize {
        if self.limit == 0 {
            0
        } else {
            self.limit.saturating_add(self.offset)
        }
    }

    /// Checks the projection against the schema of the rows being emitted
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if let Some(columns) = &self.output_columns {
            let num_fields = schema.fields().len();
            if let Some(idx) = columns.iter().find(|idx| **idx >= num_fields) {
                return config_err!(
                    "Output column {idx} is out of bounds for a schema with {num_fields} fields"
                );
            }
        }
        Ok(())
    }
}

/// Wraps the [`RowReceiver`] of a processor, applying a
/// [`PostProcessSpec`] to emitted rows and checking for cancellation at
/// every pull and push.
pub struct OutputHelper {
    spec: PostProcessSpec,
    output: Box<dyn RowReceiver>,
    cancel: CancellationToken,
    rows_skipped: usize,
    rows_emitted: usize,
    status: ConsumerStatus,
}

impl OutputHelper {
    pub fn new(
        spec: PostProcessSpec,
        output: Box<dyn RowReceiver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            spec,
            output,
            cancel,
            rows_skipped: 0,
            rows_emitted: 0,
            status: ConsumerStatus::NeedMoreRows,
        }
    }

    pub fn spec(&self) -> &PostProcessSpec {
        &self.spec
    }

    /// Last status seen from the receiver, or `DrainRequested` once the
    /// limit has been reached
    pub fn status(&self) -> ConsumerStatus {
        self.status
    }

    pub fn rows_emitted(&self) -> usize {
        self.rows_emitted
    }

    /// The wrapped receiver, used to close the output
    pub fn receiver_mut(&mut self) -> &mut dyn RowReceiver {
        self.output.as_mut()
    }

    /// Pulls the next row from `input`.
    ///
    /// Non-error metadata is forwarded downstream on the way. Rows are
    /// checked against the input schema with [`Row::try_conform`]. Returns
    /// `Ok(None)` at the end of the input or once the receiver is closed,
    /// the error carried by an upstream error item, or
    /// [`FlowSortError::Cancelled`].
    pub async fn next_row(&mut self, input: &mut dyn RowSource) -> Result<Option<Row>> {
        loop {
            if self.status == ConsumerStatus::ConsumerClosed {
                return Ok(None);
            }
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FlowSortError::Cancelled),
                item = input.next() => item,
            };
            match item {
                None => return Ok(None),
                Some(StreamItem::Row(row)) => {
                    return row.try_conform(&input.schema()).map(Some)
                }
                Some(StreamItem::Meta(ProducerMetadata::Error(e))) => return Err(e),
                Some(StreamItem::Meta(meta)) => {
                    self.push_metadata(meta).await;
                }
            }
        }
    }

    /// Emits one row, applying offset, limit and projection.
    ///
    /// Returns the status of the receiver. Anything other than
    /// [`ConsumerStatus::NeedMoreRows`] means the caller must stop
    /// emitting rows.
    pub async fn emit_row(&mut self, row: Row) -> Result<ConsumerStatus> {
        if self.cancel.is_cancelled() {
            return Err(FlowSortError::Cancelled);
        }
        if self.status != ConsumerStatus::NeedMoreRows {
            return Ok(self.status);
        }
        if self.rows_skipped < self.spec.offset {
            self.rows_skipped += 1;
            return Ok(self.status);
        }

        let row = match &self.spec.output_columns {
            Some(columns) => row.project(columns),
            None => row,
        };
        self.status = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FlowSortError::Cancelled),
            status = self.output.push(row) => status,
        };
        self.rows_emitted += 1;

        if self.spec.limit > 0
            && self.rows_emitted >= self.spec.limit
            && self.status == ConsumerStatus::NeedMoreRows
        {
            trace!("limit of {} rows reached", self.spec.limit);
            self.status = ConsumerStatus::DrainRequested;
        }
        Ok(self.status)
    }

    /// Forwards metadata downstream unless the receiver is closed.
    ///
    /// A push still blocked when the flow is cancelled is abandoned; the
    /// next pull reports the cancellation.
    pub async fn push_metadata(&mut self, meta: ProducerMetadata) -> ConsumerStatus {
        if self.status == ConsumerStatus::ConsumerClosed {
            return self.status;
        }
        let status = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.status,
            status = self.output.push_metadata(meta) => status,
        };
        if status == ConsumerStatus::ConsumerClosed {
            self.status = ConsumerStatus::ConsumerClosed;
        }
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::ScalarValue;
    use crate::stream::row_channel;
    use crate::test::{int64_row, int64_schema, TestRowReceiver, TestRowSource};

    #[test]
    fn row_cap() {
        assert_eq!(PostProcessSpec::new().row_cap(), 0);
        assert_eq!(PostProcessSpec::new().with_offset(3).row_cap(), 0);
        assert_eq!(
            PostProcessSpec::new().with_offset(3).with_limit(2).row_cap(),
            5
        );
    }

    #[test]
    fn validate_projection() {
        let schema = int64_schema(2);
        assert!(PostProcessSpec::new()
            .with_output_columns(vec![1, 0])
            .validate(&schema)
            .is_ok());
        let err = PostProcessSpec::new()
            .with_output_columns(vec![2])
            .validate(&schema)
            .unwrap_err();
        assert!(err.to_string().contains("Output column 2 is out of bounds"));
    }

    #[tokio::test]
    async fn offset_limit_projection() -> Result<()> {
        let receiver = TestRowReceiver::new();
        let spec = PostProcessSpec::new()
            .with_offset(1)
            .with_limit(2)
            .with_output_columns(vec![1]);
        let mut helper =
            OutputHelper::new(spec, Box::new(receiver.clone()), CancellationToken::new());

        let mut statuses = vec![];
        for i in 0..5 {
            statuses.push(helper.emit_row(int64_row(&[i, i * 10])).await?);
        }
        assert_eq!(
            statuses,
            vec![
                ConsumerStatus::NeedMoreRows,
                ConsumerStatus::NeedMoreRows,
                ConsumerStatus::DrainRequested,
                ConsumerStatus::DrainRequested,
                ConsumerStatus::DrainRequested,
            ]
        );
        assert_eq!(receiver.rows(), vec![int64_row(&[10]), int64_row(&[20])]);
        assert_eq!(helper.rows_emitted(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn next_row_forwards_metadata() -> Result<()> {
        let receiver = TestRowReceiver::new();
        let mut helper = OutputHelper::new(
            PostProcessSpec::new(),
            Box::new(receiver.clone()),
            CancellationToken::new(),
        );
        let mut input = TestRowSource::new(
            int64_schema(1),
            vec![
                StreamItem::Meta(ProducerMetadata::TraceData(vec!["t".into()])),
                StreamItem::Row(int64_row(&[1])),
            ],
        );
        assert_eq!(helper.next_row(&mut input).await?, Some(int64_row(&[1])));
        assert_eq!(helper.next_row(&mut input).await?, None);
        assert_eq!(receiver.trace_data(), vec![vec!["t".to_string()]]);
        Ok(())
    }

    #[tokio::test]
    async fn next_row_observes_cancellation() {
        let cancel = CancellationToken::new();
        let mut helper = OutputHelper::new(
            PostProcessSpec::new(),
            Box::new(TestRowReceiver::new()),
            cancel.clone(),
        );
        let mut input =
            TestRowSource::from_rows(int64_schema(1), vec![int64_row(&[1])]);
        cancel.cancel();
        let err = helper.next_row(&mut input).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(input.remaining(), 1);
        assert!(helper.emit_row(int64_row(&[1])).await.unwrap_err().is_cancellation());
    }

    #[tokio::test]
    async fn blocked_push_observes_cancellation() -> Result<()> {
        let cancel = CancellationToken::new();
        let (tx, _rx) = row_channel(int64_schema(1), 1);
        let mut helper =
            OutputHelper::new(PostProcessSpec::new(), Box::new(tx), cancel.clone());
        assert_eq!(
            helper.emit_row(int64_row(&[1])).await?,
            ConsumerStatus::NeedMoreRows
        );

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
        });
        // the channel is full and never read
        let err = helper.emit_row(int64_row(&[2])).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(helper.rows_emitted(), 1);
        canceller.await.unwrap();
        Ok(())
    }

    #[tokio::test]
    async fn next_row_rejects_narrow_rows() -> Result<()> {
        let mut helper = OutputHelper::new(
            PostProcessSpec::new(),
            Box::new(TestRowReceiver::new()),
            CancellationToken::new(),
        );
        let mut input = TestRowSource::from_rows(
            int64_schema(2),
            vec![
                Row::new(vec![ScalarValue::Null, ScalarValue::from(1i64)]),
                int64_row(&[1]),
            ],
        );
        assert_eq!(
            helper.next_row(&mut input).await?,
            Some(Row::new(vec![
                ScalarValue::Int64(None),
                ScalarValue::from(1i64)
            ]))
        );
        let err = helper.next_row(&mut input).await.unwrap_err();
        assert!(matches!(err, FlowSortError::Execution(_)));
        assert!(err.to_string().contains("Row has 1 columns"), "{err}");
        Ok(())
    }
}
