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

//! flowsort configuration options

use std::env;
use std::str::FromStr;

use log::warn;

/// Environment variable enabling spilling for sorts that buffer their input
pub const OPT_USE_TEMP_STORAGE: &str = "FLOWSORT_EXECUTION_USE_TEMP_STORAGE";
/// Environment variable overriding the default per-sort memory quota
pub const OPT_WORK_MEM: &str = "FLOWSORT_EXECUTION_WORK_MEM";
/// Environment variable overriding the number of rows per spilled batch
pub const OPT_SPILL_BATCH_SIZE: &str = "FLOWSORT_EXECUTION_SPILL_BATCH_SIZE";
/// Environment variable overriding the capacity of row channels
pub const OPT_CHANNEL_CAPACITY: &str = "FLOWSORT_EXECUTION_CHANNEL_CAPACITY";

/// Default memory quota of a spilling sort (64MB)
pub const DEFAULT_WORK_MEM: usize = 64 * 1024 * 1024;

/// Options controlling how sort processors run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Allow sorts that buffer their whole input to fall back to disk when
    /// they exceed `work_mem`
    pub use_temp_storage: bool,
    /// Hard memory limit of the budget created for a spilling sort
    pub work_mem: usize,
    /// Number of rows written per batch in a spill file
    pub spill_batch_size: usize,
    /// Capacity of the bounded channels created by [`crate::stream::row_channel`]
    pub channel_capacity: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            use_temp_storage: true,
            work_mem: DEFAULT_WORK_MEM,
            spill_batch_size: 8192,
            channel_capacity: 16,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options from the `FLOWSORT_EXECUTION_*` environment
    /// variables. Variables that are unset keep their default; variables
    /// that fail to parse keep their default and log a warning.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        set_from_env(OPT_USE_TEMP_STORAGE, &mut options.use_temp_storage);
        set_from_env(OPT_WORK_MEM, &mut options.work_mem);
        set_from_env(OPT_SPILL_BATCH_SIZE, &mut options.spill_batch_size);
        set_from_env(OPT_CHANNEL_CAPACITY, &mut options.channel_capacity);
        options.spill_batch_size = options.spill_batch_size.max(1);
        options.channel_capacity = options.channel_capacity.max(1);
        options
    }

    pub fn with_use_temp_storage(mut self, use_temp_storage: bool) -> Self {
        self.use_temp_storage = use_temp_storage;
        self
    }

    pub fn with_work_mem(mut self, work_mem: usize) -> Self {
        self.work_mem = work_mem;
        self
    }

    pub fn with_spill_batch_size(mut self, spill_batch_size: usize) -> Self {
        self.spill_batch_size = spill_batch_size.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }
}

fn set_from_env<T: FromStr>(key: &str, value: &mut T) {
    let Ok(raw) = env::var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *value = parsed,
        Err(_) => warn!("Ignoring invalid value '{raw}' for {key}, keeping the default"),
    }
}
