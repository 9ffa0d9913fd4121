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

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! flowsort: the sort processor of a streaming dataflow engine.
//!
//! A [`Sorter`] reads rows from a [`RowSource`], orders them by a
//! [`ColumnOrdering`] and pushes them into a [`RowReceiver`]. It picks one
//! of three strategies from what is known about its input:
//!
//! * [`SortAllStrategy`]: buffer every row, sort, emit. Spills sorted runs
//!   to disk when its memory budget is exhausted.
//! * [`SortTopKStrategy`]: keep only the first `limit + offset` rows in a
//!   bounded heap.
//! * [`SortChunksStrategy`]: the input is already ordered on a prefix of
//!   the ordering, sort each group of rows sharing that prefix.
//!
//! Memory is accounted against a tree of [`MemoryMonitor`]s rooted in the
//! [`FlowContext`]; spill files are managed by its [`DiskManager`].
//!
//! [`SortAllStrategy`]: sorts::SortAllStrategy
//! [`SortTopKStrategy`]: sorts::SortTopKStrategy
//! [`SortChunksStrategy`]: sorts::SortChunksStrategy
//! [`DiskManager`]: disk_manager::DiskManager

pub mod config;
pub mod context;
pub mod disk_manager;
pub mod error;
pub mod flow;
pub mod memory_pool;
pub mod ordering;
pub mod post_process;
pub mod row;
pub mod row_container;
pub mod scalar;
pub mod sorts;
pub mod spill;
pub mod stream;

pub use config::ExecutionOptions;
pub use context::{FlowContext, FlowContextBuilder};
pub use error::{FlowSortError, Result};
pub use flow::{Flow, Processor};
pub use memory_pool::{MemoryConsumer, MemoryMonitor, MemoryReservation};
pub use ordering::{ColumnOrdering, OrderingColumn, SortDirection};
pub use post_process::PostProcessSpec;
pub use row::Row;
pub use scalar::ScalarValue;
pub use sorts::{Sorter, SorterSpec};
pub use stream::{
    row_channel, ConsumerStatus, ProducerMetadata, RowReceiver, RowSource, StreamItem,
};
