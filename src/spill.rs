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

//! Writing sorted runs of rows to disk and reading them back.
//!
//! Runs are stored in the Arrow IPC stream format. Random access is never
//! needed: a run is written once, in order, and read back once, in order.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use log::debug;

use crate::disk_manager::{DiskManager, RunFile};
use crate::error::Result;
use crate::row::{batch_to_rows, rows_to_batch, Row};
use crate::storage_flowsort_err;

/// Counters describing the spilling done by one [`SpillManager`]
#[derive(Debug, Default)]
pub struct SpillMetrics {
    spill_file_count: AtomicUsize,
    spilled_rows: AtomicUsize,
    spilled_bytes: AtomicUsize,
}

impl SpillMetrics {
    /// Number of finished spill files
    pub fn spill_file_count(&self) -> usize {
        self.spill_file_count.load(Ordering::Relaxed)
    }

    pub fn spilled_rows(&self) -> usize {
        self.spilled_rows.load(Ordering::Relaxed)
    }

    /// Bytes on disk of all finished spill files
    pub fn spilled_bytes(&self) -> usize {
        self.spilled_bytes.load(Ordering::Relaxed)
    }
}

/// Creates spill files for rows of one schema and reads them back.
///
/// The caller is responsible for interpreting the files, e.g. the row
/// container only writes runs that are already sorted.
#[derive(Debug, Clone)]
pub struct SpillManager {
    disk_manager: Arc<DiskManager>,
    schema: SchemaRef,
    /// Rows per record batch written to a spill file
    batch_size: usize,
    metrics: Arc<SpillMetrics>,
}

impl SpillManager {
    pub fn new(disk_manager: Arc<DiskManager>, schema: SchemaRef, batch_size: usize) -> Self {
        Self {
            disk_manager,
            schema,
            batch_size: batch_size.max(1),
            metrics: Arc::new(SpillMetrics::default()),
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn metrics(&self) -> &Arc<SpillMetrics> {
        &self.metrics
    }

    /// Creates a temporary file that rows can be appended to incrementally.
    /// Fails if the disk manager cannot provide a file.
    pub fn create_in_progress_file(&self, owner: &str) -> Result<InProgressSpillFile> {
        let temp_file = self.disk_manager.create_run_file(owner)?;
        Ok(InProgressSpillFile {
            spill_manager: self.clone(),
            writer: None,
            in_progress_file: Some(temp_file),
            num_rows: 0,
        })
    }

    /// Writes `rows` into a new spill file in one go. Returns `None` when
    /// there are no rows to write.
    pub fn spill_rows_and_finish(
        &self,
        rows: &[Row],
        owner: &str,
    ) -> Result<Option<RunFile>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let mut in_progress_file = self.create_in_progress_file(owner)?;
        in_progress_file.append_rows(rows)?;
        in_progress_file.finish()
    }

    /// Opens a finished spill file for reading. Rows come back in the
    /// order they were appended. The file is deleted when the reader is
    /// dropped.
    pub fn read_spill(&self, file: RunFile) -> Result<SpillReader> {
        let reader = File::open(file.path())
            .map_err(|e| {
                storage_flowsort_err!("Failed to open spill file {:?}: {e}", file.path())
            })
            .and_then(|f| {
                StreamReader::try_new(BufReader::new(f), None).map_err(|e| {
                    storage_flowsort_err!(
                        "Failed to read spill file {:?}: {e}",
                        file.path()
                    )
                })
            })?;
        Ok(SpillReader {
            reader,
            buffered: VecDeque::new(),
            file,
            done: false,
        })
    }
}

/// A spill file that is still being written.
///
/// The IPC writer is created lazily on the first append so that a file
/// that never receives rows is never finished with a header only.
pub struct InProgressSpillFile {
    spill_manager: SpillManager,
    writer: Option<StreamWriter<BufWriter<File>>>,
    in_progress_file: Option<RunFile>,
    num_rows: usize,
}

impl InProgressSpillFile {
    /// Appends `rows`, split in batches of the manager's batch size
    pub fn append_rows(&mut self, rows: &[Row]) -> Result<()> {
        let Some(file) = self.in_progress_file.as_ref() else {
            return crate::internal_err!("Cannot append rows to a finished spill file");
        };
        if self.writer.is_none() {
            let path = file.path().to_path_buf();
            let f = File::create(&path).map_err(|e| {
                storage_flowsort_err!("Failed to create spill file at {path:?}: {e}")
            })?;
            let writer =
                StreamWriter::try_new(BufWriter::new(f), &self.spill_manager.schema)
                    .map_err(|e| {
                        storage_flowsort_err!("Failed to write spill file {path:?}: {e}")
                    })?;
            self.writer = Some(writer);
        }
        let Some(writer) = self.writer.as_mut() else {
            return crate::internal_err!("Spill file writer is missing");
        };

        for chunk in rows.chunks(self.spill_manager.batch_size) {
            let batch = rows_to_batch(&self.spill_manager.schema, chunk)?;
            writer
                .write(&batch)
                .map_err(|e| storage_flowsort_err!("Failed to write spilled rows: {e}"))?;
        }
        self.num_rows += rows.len();
        Ok(())
    }

    /// Finishes the IPC stream and returns the file, or `None` if no rows
    /// were ever appended.
    pub fn finish(&mut self) -> Result<Option<RunFile>> {
        let Some(mut writer) = self.writer.take() else {
            self.in_progress_file = None;
            return Ok(None);
        };
        writer
            .finish()
            .map_err(|e| storage_flowsort_err!("Failed to finish spill file: {e}"))?;
        writer
            .into_inner()
            .map_err(|e| storage_flowsort_err!("Failed to flush spill file: {e}"))?
            .into_inner()
            .map_err(|e| storage_flowsort_err!("Failed to flush spill file: {e}"))?;

        let Some(mut file) = self.in_progress_file.take() else {
            return crate::internal_err!("Spill file was finished twice");
        };
        file.refresh_size()?;

        let metrics = &self.spill_manager.metrics;
        metrics.spill_file_count.fetch_add(1, Ordering::Relaxed);
        metrics.spilled_rows.fetch_add(self.num_rows, Ordering::Relaxed);
        metrics
            .spilled_bytes
            .fetch_add(file.size() as usize, Ordering::Relaxed);
        debug!(
            "Spilled {} rows to {:?} ({} bytes)",
            self.num_rows,
            file.path(),
            file.size()
        );
        Ok(Some(file))
    }
}

/// Reads the rows of one spill file in the order they were written.
pub struct SpillReader {
    reader: StreamReader<BufReader<File>>,
    buffered: VecDeque<Row>,
    /// Keeps the file on disk while it is being read
    file: RunFile,
    done: bool,
}

impl SpillReader {
    fn fill(&mut self) -> Result<()> {
        while self.buffered.is_empty() {
            match self.reader.next() {
                Some(Ok(batch)) => self.buffered.extend(batch_to_rows(&batch)?),
                Some(Err(e)) => {
                    return Err(storage_flowsort_err!(
                        "Failed to read spill file {:?}: {e}",
                        self.file.path()
                    ))
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        Ok(())
    }
}

impl Iterator for SpillReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_manager::DiskManagerMode;
    use crate::scalar::ScalarValue;
    use arrow::datatypes::{DataType, Field, Schema};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int32, true),
            Field::new("b", DataType::Utf8, true),
        ]))
    }

    fn rows(n: i32) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(vec![ScalarValue::from(i), ScalarValue::from(format!("r{i}"))]))
            .collect()
    }

    fn spill_manager(batch_size: usize) -> Result<SpillManager> {
        let disk_manager = Arc::new(DiskManager::builder().build()?);
        Ok(SpillManager::new(disk_manager, schema(), batch_size))
    }

    #[test]
    fn spill_and_read_back_in_order() -> Result<()> {
        let manager = spill_manager(3)?;
        let input = rows(10);

        let mut file = manager.create_in_progress_file("Test")?;
        file.append_rows(&input[..4])?;
        file.append_rows(&input[4..])?;
        let file = file.finish()?.expect("rows were written");

        assert_eq!(manager.metrics().spill_file_count(), 1);
        assert_eq!(manager.metrics().spilled_rows(), 10);
        assert!(manager.metrics().spilled_bytes() > 0);

        let read = manager.read_spill(file)?.collect::<Result<Vec<_>>>()?;
        assert_eq!(read, input);
        Ok(())
    }

    #[test]
    fn empty_spill_produces_no_file() -> Result<()> {
        let manager = spill_manager(8)?;
        assert!(manager.spill_rows_and_finish(&[], "Test")?.is_none());

        let mut file = manager.create_in_progress_file("Test")?;
        assert!(file.finish()?.is_none());
        assert_eq!(manager.metrics().spill_file_count(), 0);
        Ok(())
    }

    #[test]
    fn spill_file_removed_after_read() -> Result<()> {
        let manager = spill_manager(8)?;
        let file = manager
            .spill_rows_and_finish(&rows(5), "Test")?
            .expect("rows were written");
        let path = file.path().to_path_buf();
        assert!(path.exists());

        let reader = manager.read_spill(file)?;
        assert_eq!(reader.count(), 5);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn spill_rejects_rows_not_matching_schema() -> Result<()> {
        let manager = spill_manager(8)?;
        let bad = vec![Row::new(vec![ScalarValue::from("x"), ScalarValue::from("y")])];
        let err = manager.spill_rows_and_finish(&bad, "Test").unwrap_err();
        assert!(err.to_string().contains("Expected Int32 value in column 0"));
        Ok(())
    }

    #[test]
    fn spill_with_disabled_disk_manager() -> Result<()> {
        let disk_manager = Arc::new(
            DiskManager::builder()
                .with_mode(DiskManagerMode::Disabled)
                .build()?,
        );
        let manager = SpillManager::new(disk_manager, schema(), 8);
        let err = manager.spill_rows_and_finish(&rows(1), "Test").unwrap_err();
        assert!(err.is_resources_exhausted());
        Ok(())
    }
}
