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

//! Execution [`FlowContext`] shared by the processors of one flow

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ExecutionOptions;
use crate::disk_manager::{DiskManager, DiskManagerBuilder};
use crate::error::Result;
use crate::memory_pool::MemoryMonitor;

/// Name of the top-level memory budget of a flow
pub const FLOW_MONITOR_NAME: &str = "flow";

/// Resources shared by every processor of a flow: the top-level memory
/// budget, the disk manager used for spilling, the execution options and
/// the cancellation token.
#[derive(Debug)]
pub struct FlowContext {
    memory: Arc<MemoryMonitor>,
    disk_manager: Arc<DiskManager>,
    options: ExecutionOptions,
    cancel: CancellationToken,
}

impl FlowContext {
    /// A context with default options, no memory limit and spill files in
    /// the OS temporary directory
    pub fn try_new() -> Result<Arc<Self>> {
        FlowContextBuilder::new().build()
    }

    pub fn builder() -> FlowContextBuilder {
        FlowContextBuilder::new()
    }

    /// Top-level memory budget of the flow
    pub fn memory(&self) -> &Arc<MemoryMonitor> {
        &self.memory
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels every processor of the flow
    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Builds a [`FlowContext`]
#[derive(Debug, Default)]
pub struct FlowContextBuilder {
    memory_limit: Option<usize>,
    disk_manager: DiskManagerBuilder,
    options: ExecutionOptions,
    cancel: Option<CancellationToken>,
}

impl FlowContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the top-level memory budget of the flow to `limit` bytes
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }

    pub fn with_disk_manager_builder(mut self, disk_manager: DiskManagerBuilder) -> Self {
        self.disk_manager = disk_manager;
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses `cancel` instead of a fresh token, e.g. a child of a token
    /// owned by the caller
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<Arc<FlowContext>> {
        let memory = match self.memory_limit {
            Some(limit) => MemoryMonitor::new_with_limit(FLOW_MONITOR_NAME, limit),
            None => MemoryMonitor::new_unbounded(FLOW_MONITOR_NAME),
        };
        Ok(Arc::new(FlowContext {
            memory,
            disk_manager: Arc::new(self.disk_manager.build()?),
            options: self.options,
            cancel: self.cancel.unwrap_or_default(),
        }))
    }
}
