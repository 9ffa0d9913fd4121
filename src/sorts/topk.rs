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

use crate::error::Result;
use crate::post_process::OutputHelper;
use crate::row_container::RowContainer;
use crate::stream::{ConsumerStatus, RowSource};

/// Retains the first `count` rows of the ordering in a bounded max-heap.
///
/// The heap root is the worst row retained so far: a new row is kept only
/// if it sorts strictly before the root, in which case it replaces the
/// root. Memory is proportional to `count`, there is no spill path.
pub struct SortTopKStrategy {
    container: RowContainer,
    count: usize,
}

impl SortTopKStrategy {
    pub fn new(container: RowContainer, count: usize) -> Self {
        Self { container, count }
    }

    pub(super) async fn execute(
        mut self,
        input: &mut dyn RowSource,
        output: &mut OutputHelper,
    ) -> Result<()> {
        while let Some(row) = output.next_row(input).await? {
            if self.container.in_memory_len() < self.count {
                self.container.add_row(row)?;
                if self.container.in_memory_len() == self.count {
                    self.container.init_max_heap();
                }
            } else {
                self.container.maybe_replace_max(row)?;
            }
        }

        for row in self.container.drain_sorted()? {
            if output.emit_row(row?).await? != ConsumerStatus::NeedMoreRows {
                break;
            }
        }
        Ok(())
    }
}
