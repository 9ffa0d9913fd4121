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

//! [`DiskManager`]: where sorts put the sorted runs they write when their
//! memory budget is exhausted

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use rand::{rng, Rng};
use tempfile::{Builder, NamedTempFile, TempDir};

use crate::error::{FlowSortError, Result};
use crate::memory_pool::human_readable_size;
use crate::{config_err, resources_err};

/// Default cap on the bytes all live runs of one manager may use: 100 GiB
pub const DEFAULT_MAX_DISK_USAGE: u64 = 100 * 1024 * 1024 * 1024;

/// Where a [`DiskManager`] writes runs
#[derive(Clone, Debug, Default)]
pub enum DiskManagerMode {
    /// A directory under the OS temp dir, created with the first run
    #[default]
    OsTmpDirectory,

    /// A new directory inside each of these. Every run goes to one of
    /// them, picked at random.
    Directories(Vec<PathBuf>),

    /// No runs can be written. Sorts that exhaust their budget fail.
    Disabled,
}

#[derive(Clone, Debug)]
pub struct DiskManagerBuilder {
    mode: DiskManagerMode,
    max_disk_usage: u64,
}

impl Default for DiskManagerBuilder {
    fn default() -> Self {
        Self {
            mode: DiskManagerMode::default(),
            max_disk_usage: DEFAULT_MAX_DISK_USAGE,
        }
    }
}

impl DiskManagerBuilder {
    pub fn with_mode(mut self, mode: DiskManagerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Caps the bytes on disk of all live runs
    pub fn with_max_disk_usage(mut self, max_disk_usage: u64) -> Self {
        self.max_disk_usage = max_disk_usage;
        self
    }

    pub fn build(self) -> Result<DiskManager> {
        let dirs = match self.mode {
            DiskManagerMode::OsTmpDirectory => RunDirs::OsTmp(Mutex::new(None)),
            DiskManagerMode::Directories(roots) => {
                let dirs = roots
                    .iter()
                    .map(|root| run_dir_in(root).map(Arc::new))
                    .collect::<Result<Vec<_>>>()?;
                if dirs.is_empty() {
                    return config_err!("At least one directory is needed to write runs");
                }
                RunDirs::Configured(dirs)
            }
            DiskManagerMode::Disabled => {
                if self.max_disk_usage != DEFAULT_MAX_DISK_USAGE {
                    return config_err!(
                        "A disk usage limit was set on a disabled DiskManager"
                    );
                }
                RunDirs::Disabled
            }
        };
        Ok(DiskManager {
            dirs,
            max_disk_usage: self.max_disk_usage,
            used_disk_space: AtomicU64::new(0),
        })
    }
}

/// Creates the directory runs are written to under `root`
fn run_dir_in(root: &Path) -> Result<TempDir> {
    fs::create_dir_all(root)?;
    let dir = Builder::new().prefix("flowsort-").tempdir_in(root)?;
    debug!("Writing sorted runs to {:?}", dir.path());
    Ok(dir)
}

#[derive(Debug)]
enum RunDirs {
    OsTmp(Mutex<Option<Arc<TempDir>>>),
    Configured(Vec<Arc<TempDir>>),
    Disabled,
}

/// Hands out the temporary files sorted runs are written to, and keeps
/// the bytes they use under a limit.
///
/// The directories it creates are removed once the manager and every run
/// file in them are dropped.
#[derive(Debug)]
pub struct DiskManager {
    dirs: RunDirs,
    max_disk_usage: u64,
    used_disk_space: AtomicU64,
}

impl DiskManager {
    pub fn builder() -> DiskManagerBuilder {
        DiskManagerBuilder::default()
    }

    /// Bytes on disk of all live runs
    pub fn used_disk_space(&self) -> u64 {
        self.used_disk_space.load(Ordering::Relaxed)
    }

    pub fn max_disk_usage(&self) -> u64 {
        self.max_disk_usage
    }

    /// Whether runs can be written at all
    pub fn is_enabled(&self) -> bool {
        !matches!(self.dirs, RunDirs::Disabled)
    }

    /// Creates an empty file for a run written on behalf of `owner`
    pub fn create_run_file(self: &Arc<Self>, owner: &str) -> Result<RunFile> {
        let dir = match &self.dirs {
            RunDirs::Disabled => {
                return resources_err!(
                    "{owner} cannot write a sorted run to disk (DiskManager is disabled)"
                )
            }
            RunDirs::Configured(dirs) => {
                Arc::clone(&dirs[rng().random_range(0..dirs.len())])
            }
            RunDirs::OsTmp(slot) => {
                let mut slot = slot.lock();
                let dir = match slot.take() {
                    Some(dir) => dir,
                    None => Arc::new(run_dir_in(&std::env::temp_dir())?),
                };
                *slot = Some(Arc::clone(&dir));
                dir
            }
        };
        let file = Builder::new()
            .prefix("run-")
            .suffix(".arrow")
            .tempfile_in(dir.path())?;
        Ok(RunFile {
            file,
            _dir: dir,
            size: 0,
            manager: Arc::clone(self),
        })
    }

    /// Moves a run's accounted size from `old` to `new` bytes
    fn resize(&self, old: u64, new: u64) -> Result<()> {
        let total = if new >= old {
            self.used_disk_space.fetch_add(new - old, Ordering::Relaxed) + (new - old)
        } else {
            self.used_disk_space.fetch_sub(old - new, Ordering::Relaxed) - (old - new)
        };
        if total > self.max_disk_usage {
            return resources_err!(
                "Sorted runs use {} on disk, more than the limit of {}",
                human_readable_size(total as usize),
                human_readable_size(self.max_disk_usage as usize)
            );
        }
        Ok(())
    }
}

/// The temporary file holding one sorted run.
///
/// Its size counts against the [`DiskManager`] it came from until it is
/// dropped, which also deletes the file.
#[derive(Debug)]
pub struct RunFile {
    file: NamedTempFile,
    /// Keeps the directory alive while the run is
    _dir: Arc<TempDir>,
    size: u64,
    manager: Arc<DiskManager>,
}

impl RunFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Bytes on disk as of the last [`Self::refresh_size`]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads the file size back from disk once the run is written.
    ///
    /// Fails with `ResourcesExhausted` if the manager's runs now exceed
    /// its disk usage limit. The new size stays accounted until the file
    /// is dropped.
    pub fn refresh_size(&mut self) -> Result<()> {
        let size = self
            .file
            .as_file()
            .metadata()
            .map_err(FlowSortError::IoError)?
            .len();
        let old = std::mem::replace(&mut self.size, size);
        self.manager.resize(old, size)
    }
}

impl Drop for RunFile {
    fn drop(&mut self) {
        self.manager
            .used_disk_space
            .fetch_sub(self.size, Ordering::Relaxed);
    }
}
