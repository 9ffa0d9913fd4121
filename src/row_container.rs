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

//! [`RowContainer`]: a memory accounted buffer of rows that can overflow
//! to disk

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::disk_manager::RunFile;
use crate::error::{FlowSortError, Result};
use crate::internal_err;
use crate::memory_pool::{human_readable_size, MemoryReservation};
use crate::ordering::ColumnOrdering;
use crate::row::Row;
use crate::spill::{SpillManager, SpillReader};

/// Buffers rows under a [`MemoryReservation`].
///
/// Every inserted row is accounted against the reservation. If the
/// reservation refuses to grow and the container was created with a
/// [`SpillManager`], the buffered rows are sorted and written to disk as
/// one sorted run, the reservation is freed and the insertion is retried.
/// Without a spill manager the allocation error is returned to the caller.
///
/// [`RowContainer::drain_sorted`] merges the in-memory rows with every
/// spilled run, so callers see one sorted sequence either way.
///
/// The in-memory rows can alternatively be used as a bounded max-heap
/// (see [`RowContainer::init_max_heap`]), which is how the top-k sort
/// keeps its working set.
pub struct RowContainer {
    ordering: Arc<ColumnOrdering>,
    rows: Vec<Row>,
    reservation: MemoryReservation,
    spill_manager: Option<SpillManager>,
    /// Sorted runs written so far, in spill order
    spills: Vec<RunFile>,
    spilled_rows: usize,
    cancel: CancellationToken,
}

impl RowContainer {
    /// Creates a container that fails when `reservation` cannot grow
    pub fn new(ordering: Arc<ColumnOrdering>, reservation: MemoryReservation) -> Self {
        Self {
            ordering,
            rows: vec![],
            reservation,
            spill_manager: None,
            spills: vec![],
            spilled_rows: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a container that spills sorted runs through `spill_manager`
    /// when `reservation` cannot grow
    pub fn new_spilling(
        ordering: Arc<ColumnOrdering>,
        reservation: MemoryReservation,
        spill_manager: SpillManager,
    ) -> Self {
        Self {
            spill_manager: Some(spill_manager),
            ..Self::new(ordering, reservation)
        }
    }

    /// Makes allocations fail with [`FlowSortError::Cancelled`] once
    /// `cancel` fires
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn ordering(&self) -> &Arc<ColumnOrdering> {
        &self.ordering
    }

    pub fn spilling_enabled(&self) -> bool {
        self.spill_manager.is_some()
    }

    /// Total number of rows held, in memory and on disk
    pub fn len(&self) -> usize {
        self.rows.len() + self.spilled_rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rows currently buffered in memory
    pub fn in_memory_len(&self) -> usize {
        self.rows.len()
    }

    /// Number of sorted runs written to disk
    pub fn spill_count(&self) -> usize {
        self.spills.len()
    }

    /// Bytes currently reserved for the in-memory rows
    pub fn mem_used(&self) -> usize {
        self.reservation.size()
    }

    /// The in-memory rows, in their current order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Adds `row`, spilling the buffered rows first if the memory budget
    /// is exhausted and spilling is enabled.
    pub fn add_row(&mut self, row: Row) -> Result<()> {
        self.check_cancelled()?;
        let size = row.size();
        if let Err(e) = self.reservation.try_grow(size) {
            if !e.is_resources_exhausted()
                || self.spill_manager.is_none()
                || self.rows.is_empty()
            {
                return Err(e);
            }
            debug!(
                "{} exhausted its budget with {} rows buffered ({}), spilling",
                self.reservation.consumer().name(),
                self.rows.len(),
                human_readable_size(self.reservation.size())
            );
            self.spill()?;
            self.reservation.try_grow(size)?;
        }
        self.rows.push(row);
        Ok(())
    }

    /// Sorts the in-memory rows, writes them as one run and frees their
    /// memory.
    pub fn spill(&mut self) -> Result<()> {
        let Some(spill_manager) = &self.spill_manager else {
            return internal_err!("Spilling is not enabled for this row container");
        };
        self.ordering.sort_rows(&mut self.rows);
        let owner = self.reservation.consumer().name();
        if let Some(file) = spill_manager.spill_rows_and_finish(&self.rows, owner)? {
            self.spilled_rows += self.rows.len();
            self.spills.push(file);
        }
        self.rows = vec![];
        self.reservation.free();
        Ok(())
    }

    /// Sorts the in-memory rows by the full ordering. The sort is stable.
    pub fn sort(&mut self) {
        self.ordering.sort_rows(&mut self.rows);
    }

    /// Removes every row, in memory and on disk, and frees the memory
    pub fn clear(&mut self) {
        self.rows = vec![];
        self.spills.clear();
        self.spilled_rows = 0;
        self.reservation.free();
    }

    /// Reorders the in-memory rows into a max-heap under the ordering: the
    /// row that sorts last is at the root.
    pub fn init_max_heap(&mut self) {
        for idx in (0..self.rows.len() / 2).rev() {
            self.sift_down(idx);
        }
    }

    /// The row at the root of the heap, i.e. the worst row retained
    pub fn max_row(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Replaces the heap root with `row` if `row` sorts strictly before it
    /// and restores the heap. Returns whether the row was kept.
    ///
    /// Only valid after [`Self::init_max_heap`].
    pub fn maybe_replace_max(&mut self, row: Row) -> Result<bool> {
        self.check_cancelled()?;
        let Some(root) = self.rows.first() else {
            return Ok(false);
        };
        if self.ordering.compare(&row, root) != Ordering::Less {
            return Ok(false);
        }

        let new_size = row.size();
        let old_size = root.size();
        if new_size > old_size {
            self.reservation.try_grow(new_size - old_size)?;
        } else {
            self.reservation.shrink(old_size - new_size);
        }
        self.rows[0] = row;
        self.sift_down(0);
        Ok(true)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(FlowSortError::Cancelled);
        }
        Ok(())
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.rows.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut largest = idx;
            if left < len && self.greater(left, largest) {
                largest = left;
            }
            if right < len && self.greater(right, largest) {
                largest = right;
            }
            if largest == idx {
                return;
            }
            self.rows.swap(idx, largest);
            idx = largest;
        }
    }

    fn greater(&self, a: usize, b: usize) -> bool {
        self.ordering.compare(&self.rows[a], &self.rows[b]) == Ordering::Greater
    }

    /// Takes every row out of the container and returns them in sorted
    /// order, merging the in-memory rows with all spilled runs.
    ///
    /// Rows that compare equal come out in insertion order. The memory
    /// reservation is kept until the container is cleared or dropped.
    pub fn drain_sorted(&mut self) -> Result<SortedRows> {
        self.sort();
        let mut streams = Vec::with_capacity(self.spills.len() + 1);
        if let Some(spill_manager) = &self.spill_manager {
            for file in self.spills.drain(..) {
                streams.push(RunStream::Spill(spill_manager.read_spill(file)?));
            }
        } else if !self.spills.is_empty() {
            return internal_err!("Row container holds spill files without a spill manager");
        }
        streams.push(RunStream::Memory(std::mem::take(&mut self.rows).into_iter()));
        self.spilled_rows = 0;

        SortedRows::try_new(Arc::clone(&self.ordering), streams)
    }
}

/// One sorted input of a [`SortedRows`] merge
enum RunStream {
    Memory(std::vec::IntoIter<Row>),
    Spill(SpillReader),
}

impl RunStream {
    fn next_row(&mut self) -> Option<Result<Row>> {
        match self {
            RunStream::Memory(rows) => rows.next().map(Ok),
            RunStream::Spill(reader) => reader.next(),
        }
    }
}

/// Head of one run in the merge heap
struct MergeEntry {
    row: Row,
    stream_idx: usize,
    ordering: Arc<ColumnOrdering>,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    // `BinaryHeap` pops the greatest entry, so the comparison is reversed:
    // the entry that sorts first (and among equal rows the one from the
    // earliest run) is the greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering
            .compare(&other.row, &self.row)
            .then_with(|| other.stream_idx.cmp(&self.stream_idx))
    }
}

/// Sorted rows produced by [`RowContainer::drain_sorted`]: a k-way merge
/// over sorted runs.
pub struct SortedRows {
    ordering: Arc<ColumnOrdering>,
    streams: Vec<RunStream>,
    heap: BinaryHeap<MergeEntry>,
}

impl SortedRows {
    fn try_new(ordering: Arc<ColumnOrdering>, mut streams: Vec<RunStream>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(streams.len());
        for (stream_idx, stream) in streams.iter_mut().enumerate() {
            if let Some(row) = stream.next_row() {
                heap.push(MergeEntry {
                    row: row?,
                    stream_idx,
                    ordering: Arc::clone(&ordering),
                });
            }
        }
        Ok(Self {
            ordering,
            streams,
            heap,
        })
    }
}

impl Iterator for SortedRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let MergeEntry {
            row, stream_idx, ..
        } = self.heap.pop()?;
        match self.streams[stream_idx].next_row() {
            Some(Ok(next)) => self.heap.push(MergeEntry {
                row: next,
                stream_idx,
                ordering: Arc::clone(&self.ordering),
            }),
            Some(Err(e)) => {
                self.heap.clear();
                return Some(Err(e));
            }
            None => {}
        }
        Some(Ok(row))
    }
}
