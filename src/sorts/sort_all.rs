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

use log::debug;

use crate::error::Result;
use crate::post_process::OutputHelper;
use crate::row_container::RowContainer;
use crate::stream::{ConsumerStatus, RowSource};

/// Reads every input row into a [`RowContainer`], then emits the
/// container's sorted contents.
///
/// When the container spills, the emitted rows are a merge of the
/// in-memory rows with every sorted run written to disk.
pub struct SortAllStrategy {
    container: RowContainer,
}

impl SortAllStrategy {
    pub fn new(container: RowContainer) -> Self {
        Self { container }
    }

    pub(super) async fn execute(
        mut self,
        input: &mut dyn RowSource,
        output: &mut OutputHelper,
    ) -> Result<()> {
        while let Some(row) = output.next_row(input).await? {
            self.container.add_row(row)?;
        }

        debug!(
            "sorting {} rows ({} spilled runs)",
            self.container.len(),
            self.container.spill_count()
        );
        for row in self.container.drain_sorted()? {
            if output.emit_row(row?).await? != ConsumerStatus::NeedMoreRows {
                break;
            }
        }
        Ok(())
    }
}
