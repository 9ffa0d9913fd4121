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

//! Sort functionalities

mod chunks;
mod sort_all;
mod sorter;
mod topk;

pub use chunks::SortChunksStrategy;
pub use sort_all::SortAllStrategy;
pub use sorter::{Sorter, SorterSpec};
pub use topk::SortTopKStrategy;

use crate::error::Result;
use crate::post_process::OutputHelper;
use crate::stream::RowSource;

/// The algorithm a [`Sorter`] runs, chosen once from what is known about
/// its input before any row is read.
pub enum SortStrategy {
    /// Buffer everything, sort, emit
    All(SortAllStrategy),
    /// Keep only the first `count` rows of the ordering
    TopK(SortTopKStrategy),
    /// Sort each group of rows sharing the already ordered prefix
    Chunks(SortChunksStrategy),
}

impl SortStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SortStrategy::All(_) => "SortAll",
            SortStrategy::TopK(_) => "SortTopK",
            SortStrategy::Chunks(_) => "SortChunks",
        }
    }

    /// Consumes `input` and emits its rows through `output` in order.
    ///
    /// The strategy, its row container and the memory budget backing it
    /// are dropped when this returns, on success and on error alike.
    pub async fn execute(
        self,
        input: &mut dyn RowSource,
        output: &mut OutputHelper,
    ) -> Result<()> {
        match self {
            SortStrategy::All(s) => s.execute(input, output).await,
            SortStrategy::TopK(s) => s.execute(input, output).await,
            SortStrategy::Chunks(s) => s.execute(input, output).await,
        }
    }
}
