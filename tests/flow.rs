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

//! Sorters running as tasks of a [`Flow`], connected to their producer
//! through a row channel

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flowsort::stream::RowChannelSender;
use flowsort::test::{int64_row, int64_schema, TestRowReceiver};
use flowsort::{
    row_channel, ColumnOrdering, ConsumerStatus, Flow, FlowContext, FlowSortError,
    OrderingColumn, PostProcessSpec, Processor, ProducerMetadata, Result, Row,
    RowReceiver, Sorter, SorterSpec,
};

/// Pushes `rows` into a channel until the consumer stops asking for them
struct VecProducer {
    rows: Vec<Row>,
    trailing_error: Option<FlowSortError>,
    output: RowChannelSender,
    pushed: Arc<AtomicUsize>,
}

#[async_trait]
impl Processor for VecProducer {
    fn name(&self) -> &str {
        "VecProducer"
    }

    async fn run(self: Box<Self>) {
        let VecProducer {
            rows,
            trailing_error,
            mut output,
            pushed,
        } = *self;
        for row in rows {
            pushed.fetch_add(1, Ordering::SeqCst);
            if output.push(row).await != ConsumerStatus::NeedMoreRows {
                break;
            }
        }
        output
            .push_metadata(ProducerMetadata::TraceData(vec!["producer".into()]))
            .await;
        output.close(trailing_error).await;
    }
}

fn pipeline(
    ctx: &Arc<FlowContext>,
    values: &[i64],
    trailing_error: Option<FlowSortError>,
    post: PostProcessSpec,
) -> Result<(Flow, TestRowReceiver, Arc<AtomicUsize>)> {
    let schema = int64_schema(1);
    let (tx, rx) = row_channel(Arc::clone(&schema), ctx.options().channel_capacity);
    let pushed = Arc::new(AtomicUsize::new(0));
    let receiver = TestRowReceiver::new();

    let sorter = Sorter::try_new(
        Arc::clone(ctx),
        SorterSpec::new(ColumnOrdering::try_new(
            vec![OrderingColumn::asc(0)],
            &schema,
        )?),
        Box::new(rx),
        post,
        Box::new(receiver.clone()),
    )?;

    let mut flow = Flow::new(Arc::clone(ctx));
    flow.spawn(Box::new(VecProducer {
        rows: values.iter().map(|v| int64_row(&[*v])).collect(),
        trailing_error,
        output: tx,
        pushed: Arc::clone(&pushed),
    }));
    flow.spawn(Box::new(sorter));
    Ok((flow, receiver, pushed))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sort_through_channel() -> Result<()> {
    let ctx = FlowContext::try_new()?;
    let values = (0..5_000).rev().collect::<Vec<i64>>();
    let (flow, receiver, pushed) = pipeline(&ctx, &values, None, PostProcessSpec::new())?;
    flow.wait().await?;

    let expected = (0..5_000).map(|v| int64_row(&[v])).collect::<Vec<_>>();
    assert_eq!(receiver.rows(), expected);
    assert_eq!(receiver.trace_data(), vec![vec!["producer".to_string()]]);
    assert_eq!(receiver.close_error(), None);
    assert_eq!(pushed.load(Ordering::SeqCst), 5_000);
    assert_eq!(ctx.memory().reserved(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn top_k_through_channel() -> Result<()> {
    let ctx = FlowContext::try_new()?;
    let values = (0..1_000).map(|v| (v * 37) % 1_000).collect::<Vec<i64>>();
    let (flow, receiver, _) =
        pipeline(&ctx, &values, None, PostProcessSpec::new().with_limit(3))?;
    flow.wait().await?;

    assert_eq!(
        receiver.rows(),
        vec![int64_row(&[0]), int64_row(&[1]), int64_row(&[2])]
    );
    assert_eq!(ctx.memory().reserved(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn producer_error_reaches_output() -> Result<()> {
    let ctx = FlowContext::try_new()?;
    let (flow, receiver, _) = pipeline(
        &ctx,
        &[3, 2, 1],
        Some(FlowSortError::Execution("scan failed".into())),
        PostProcessSpec::new(),
    )?;
    flow.wait().await?;

    assert!(receiver.rows().is_empty());
    assert_eq!(
        receiver.close_error(),
        Some("Execution error: scan failed".to_string())
    );
    assert_eq!(ctx.memory().reserved(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_flow_closes_without_error() -> Result<()> {
    let ctx = FlowContext::try_new()?;
    ctx.cancel();
    let (flow, receiver, _) = pipeline(&ctx, &[3, 2, 1], None, PostProcessSpec::new())?;
    flow.wait().await?;

    assert!(receiver.rows().is_empty());
    assert!(receiver.is_closed());
    assert_eq!(receiver.close_error(), None);
    assert_eq!(ctx.memory().reserved(), 0);
    Ok(())
}
