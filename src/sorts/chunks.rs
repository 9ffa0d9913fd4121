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

use std::cmp::Ordering;

use log::trace;

use crate::error::Result;
use crate::post_process::OutputHelper;
use crate::row::Row;
use crate::row_container::RowContainer;
use crate::stream::{ConsumerStatus, RowSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChunkState {
    Accumulating,
    Flushing,
    Done,
}

/// Sorts input that is already ordered on the first `match_len` ordering
/// columns.
///
/// Consecutive rows that are equal on that prefix form a chunk. Each chunk
/// is buffered, sorted on the full ordering and emitted before the next
/// one starts, so memory is bounded by the largest chunk and rows of
/// different chunks are never reordered.
pub struct SortChunksStrategy {
    container: RowContainer,
    match_len: usize,
    state: ChunkState,
    /// First row of the chunk being accumulated
    chunk_first: Option<Row>,
    chunks_emitted: usize,
}

impl SortChunksStrategy {
    pub fn new(container: RowContainer, match_len: usize) -> Self {
        Self {
            container,
            match_len,
            state: ChunkState::Accumulating,
            chunk_first: None,
            chunks_emitted: 0,
        }
    }

    pub(super) async fn execute(
        mut self,
        input: &mut dyn RowSource,
        output: &mut OutputHelper,
    ) -> Result<()> {
        loop {
            match self.state {
                ChunkState::Accumulating => match output.next_row(input).await? {
                    Some(row) => {
                        let same_chunk = match &self.chunk_first {
                            None => None,
                            Some(first) => Some(
                                self.container.ordering().compare_prefix(
                                    first,
                                    &row,
                                    self.match_len,
                                ) == Ordering::Equal,
                            ),
                        };
                        match same_chunk {
                            Some(true) => self.container.add_row(row)?,
                            Some(false) => {
                                if !self.flush(output).await? {
                                    self.state = ChunkState::Done;
                                    continue;
                                }
                                self.start_chunk(row)?;
                            }
                            None => self.start_chunk(row)?,
                        }
                    }
                    None => self.state = ChunkState::Flushing,
                },
                ChunkState::Flushing => {
                    if self.chunk_first.is_some() {
                        self.flush(output).await?;
                    }
                    self.state = ChunkState::Done;
                }
                ChunkState::Done => {
                    trace!("emitted {} chunks", self.chunks_emitted);
                    return Ok(());
                }
            }
        }
    }

    fn start_chunk(&mut self, row: Row) -> Result<()> {
        self.chunk_first = Some(row.clone());
        self.container.add_row(row)
    }

    /// Sorts and emits the current chunk, then clears it. Returns whether
    /// the receiver still wants rows.
    async fn flush(&mut self, output: &mut OutputHelper) -> Result<bool> {
        self.chunk_first = None;
        self.chunks_emitted += 1;
        let rows = self.container.drain_sorted()?;
        let mut status = output.status();
        for row in rows {
            status = output.emit_row(row?).await?;
            if status != ConsumerStatus::NeedMoreRows {
                break;
            }
        }
        self.container.clear();
        Ok(status == ConsumerStatus::NeedMoreRows)
    }
}
