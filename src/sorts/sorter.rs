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

//! The [`Sorter`] processor

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};

use super::{SortAllStrategy, SortChunksStrategy, SortStrategy, SortTopKStrategy};
use crate::config_err;
use crate::context::FlowContext;
use crate::error::Result;
use crate::flow::Processor;
use crate::memory_pool::MemoryConsumer;
use crate::ordering::ColumnOrdering;
use crate::post_process::{OutputHelper, PostProcessSpec};
use crate::row_container::RowContainer;
use crate::spill::SpillManager;
use crate::stream::{drain_and_close, RowReceiver, RowSource};

/// Static description of a sort
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SorterSpec {
    /// Ordering of the output
    pub ordering: ColumnOrdering,
    /// Number of leading ordering columns the input is already grouped
    /// and sorted by
    pub match_len: usize,
}

impl SorterSpec {
    pub fn new(ordering: ColumnOrdering) -> Self {
        Self {
            ordering,
            match_len: 0,
        }
    }

    pub fn with_match_len(mut self, match_len: usize) -> Self {
        self.match_len = match_len;
        self
    }
}

/// Sorts its input and emits it through a [`PostProcessSpec`].
///
/// The strategy is picked from the [`SorterSpec`] and the row cap before any
/// row is read:
///
/// | match_len | row cap | strategy |
/// |-----------|---------|----------|
/// | 0         | 0       | [`SortAllStrategy`] |
/// | 0         | > 0     | [`SortTopKStrategy`] |
/// | > 0       | any     | [`SortChunksStrategy`] |
///
/// The row cap is `limit + offset` when the [`PostProcessSpec`] has a
/// limit. Strategies that buffer unbounded input (all and chunks) get a
/// child memory budget limited to `work_mem` and a spilling row container
/// when temporary storage is enabled.
///
/// Whatever the outcome, the input is drained and the output closed when
/// the run ends, with the first error if there was one.
pub struct Sorter {
    ctx: Arc<FlowContext>,
    ordering: Arc<ColumnOrdering>,
    match_len: usize,
    count: usize,
    input: Box<dyn RowSource>,
    output: OutputHelper,
    /// Memory limit overriding `work_mem` that also forces spilling on
    testing_mem_limit: usize,
}

impl std::fmt::Debug for Sorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sorter")
            .field("ordering", &self.ordering)
            .field("match_len", &self.match_len)
            .field("count", &self.count)
            .field("testing_mem_limit", &self.testing_mem_limit)
            .finish()
    }
}

impl Sorter {
    pub fn try_new(
        ctx: Arc<FlowContext>,
        spec: SorterSpec,
        input: Box<dyn RowSource>,
        post: PostProcessSpec,
        output: Box<dyn RowReceiver>,
    ) -> Result<Self> {
        let schema = input.schema();
        let SorterSpec { ordering, match_len } = spec;
        // the ordering may have been built against another schema
        let ordering = ColumnOrdering::try_new(ordering.columns().to_vec(), &schema)?;
        if match_len > ordering.len() {
            return config_err!(
                "Match length {match_len} exceeds the {} ordering columns",
                ordering.len()
            );
        }
        post.validate(&schema)?;

        let count = post.row_cap();
        let cancel = ctx.cancellation_token().clone();
        Ok(Self {
            ctx,
            ordering: Arc::new(ordering),
            match_len,
            count,
            input,
            output: OutputHelper::new(post, output, cancel),
            testing_mem_limit: 0,
        })
    }

    /// Forces disk overflow with a budget of `limit` bytes, regardless of
    /// the execution options. 0 disables the override.
    pub fn with_testing_mem_limit(mut self, limit: usize) -> Self {
        self.testing_mem_limit = limit;
        self
    }

    /// Maximum number of rows the sort retains, 0 for no cap
    pub fn count(&self) -> usize {
        self.count
    }

    /// Runs the sort to completion: reads (or drains) the input and
    /// closes the output.
    pub async fn run(mut self) {
        debug!("starting sorter run");

        let result = match self.create_strategy() {
            Ok(strategy) => {
                debug!(
                    "sorting with {} (ordering {}, match_len {}, count {})",
                    strategy.name(),
                    self.ordering,
                    self.match_len,
                    self.count
                );
                strategy.execute(self.input.as_mut(), &mut self.output).await
            }
            Err(e) => Err(e),
        };

        let cause = match result {
            Ok(()) => None,
            Err(e) if e.is_cancellation() => {
                debug!("sorter run cancelled");
                Some(e)
            }
            Err(e) => {
                error!("error sorting rows: {e}");
                Some(e)
            }
        };

        let status = self.output.status();
        drain_and_close(
            self.input.as_mut(),
            self.output.receiver_mut(),
            status,
            cause,
        )
        .await;
        debug!("exiting sorter run");
    }

    fn create_strategy(&self) -> Result<SortStrategy> {
        let strategy = match (self.match_len, self.count) {
            (0, 0) => SortStrategy::All(SortAllStrategy::new(
                self.buffering_container("sortall-limited", "SortAll")?,
            )),
            (0, count) => {
                // the working set is `count` rows, no overflow
                let reservation =
                    MemoryConsumer::new("SortTopK").register(self.ctx.memory());
                SortStrategy::TopK(SortTopKStrategy::new(
                    RowContainer::new(Arc::clone(&self.ordering), reservation)
                        .with_cancellation_token(self.ctx.cancellation_token().clone()),
                    count,
                ))
            }
            (match_len, _) => SortStrategy::Chunks(SortChunksStrategy::new(
                self.buffering_container("sortchunks-limited", "SortChunks")?,
                match_len,
            )),
        };
        Ok(strategy)
    }

    /// Container for a strategy that buffers an unbounded number of rows.
    ///
    /// With disk overflow enabled the container accounts against a new
    /// child budget named `monitor_name` and spills when it is full. The
    /// child budget is released when the container is dropped.
    fn buffering_container(
        &self,
        monitor_name: &str,
        consumer_name: &str,
    ) -> Result<RowContainer> {
        let options = self.ctx.options();
        let use_disk = options.use_temp_storage || self.testing_mem_limit > 0;
        if !use_disk {
            let reservation =
                MemoryConsumer::new(consumer_name).register(self.ctx.memory());
            return Ok(RowContainer::new(Arc::clone(&self.ordering), reservation)
                .with_cancellation_token(self.ctx.cancellation_token().clone()));
        }

        let limit = if self.testing_mem_limit > 0 {
            self.testing_mem_limit
        } else {
            options.work_mem
        };
        let monitor = self.ctx.memory().make_child_with_limit(monitor_name, limit);
        let reservation = MemoryConsumer::new(consumer_name)
            .with_can_spill(true)
            .register(&monitor);
        let spill_manager = SpillManager::new(
            Arc::clone(self.ctx.disk_manager()),
            self.input.schema(),
            options.spill_batch_size,
        );
        Ok(RowContainer::new_spilling(
            Arc::clone(&self.ordering),
            reservation,
            spill_manager,
        )
        .with_cancellation_token(self.ctx.cancellation_token().clone()))
    }
}

#[async_trait]
impl Processor for Sorter {
    fn name(&self) -> &str {
        "Sorter"
    }

    async fn run(self: Box<Self>) {
        Sorter::run(*self).await
    }
}
