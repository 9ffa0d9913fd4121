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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use super::human_readable_size;
use crate::error::{FlowSortError, Result};

/// A node in a tree of memory budgets.
///
/// Every byte reserved against a monitor is also reserved against all of
/// its ancestors, so a child created with
/// [`MemoryMonitor::make_child_with_limit`] is constrained both by its
/// own hard limit and by whatever is left in its parents.
///
/// A child is started when it is created and stopped when the last
/// handle to it is dropped. Reservations hold a handle to their monitor,
/// so a monitor always outlives the memory accounted against it.
#[derive(Debug)]
pub struct MemoryMonitor {
    name: String,
    /// Hard limit in bytes, `None` for no limit
    limit: Option<usize>,
    reserved: AtomicUsize,
    peak: AtomicUsize,
    parent: Option<Arc<MemoryMonitor>>,
}

impl MemoryMonitor {
    /// Creates a root monitor that enforces no limit
    pub fn new_unbounded(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name.into(), None, None))
    }

    /// Creates a root monitor that allows at most `limit` bytes
    pub fn new_with_limit(name: impl Into<String>, limit: usize) -> Arc<Self> {
        Arc::new(Self::new(name.into(), Some(limit), None))
    }

    fn new(name: String, limit: Option<usize>, parent: Option<Arc<MemoryMonitor>>) -> Self {
        debug!(
            "Starting memory monitor {name} (limit={})",
            limit.map(human_readable_size).unwrap_or_else(|| "none".into())
        );
        Self {
            name,
            limit,
            reserved: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            parent,
        }
    }

    /// Creates a child budget with a hard limit of `limit` bytes
    pub fn make_child_with_limit(
        self: &Arc<Self>,
        name: impl Into<String>,
        limit: usize,
    ) -> Arc<Self> {
        Arc::new(Self::new(name.into(), Some(limit), Some(Arc::clone(self))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn parent(&self) -> Option<&Arc<MemoryMonitor>> {
        self.parent.as_ref()
    }

    /// Bytes currently reserved against this monitor, including all of
    /// its descendants
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }

    /// Highest value [`Self::reserved`] has reached
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Reserve `additional` bytes here and in every ancestor, failing with
    /// [`FlowSortError::ResourcesExhausted`] if any of them would exceed
    /// its limit. On failure nothing stays reserved.
    pub(super) fn try_grow(
        &self,
        consumer: &str,
        current: usize,
        additional: usize,
    ) -> Result<()> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.reserved
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                used.checked_add(additional)
                    .filter(|new_used| *new_used <= limit)
            })
            .map_err(|used| {
                insufficient_capacity_err(
                    &self.name,
                    consumer,
                    additional,
                    current,
                    limit.saturating_sub(used),
                )
            })?;

        if let Some(parent) = &self.parent {
            if let Err(e) = parent.try_grow(consumer, current, additional) {
                self.reserved.fetch_sub(additional, Ordering::Relaxed);
                return Err(e);
            }
        }
        self.peak.fetch_max(self.reserved(), Ordering::Relaxed);
        Ok(())
    }

    /// Reserve `additional` bytes without checking any limit
    pub(super) fn grow(&self, additional: usize) {
        let new_used = self.reserved.fetch_add(additional, Ordering::Relaxed) + additional;
        self.peak.fetch_max(new_used, Ordering::Relaxed);
        if let Some(parent) = &self.parent {
            parent.grow(additional);
        }
    }

    /// Release `shrink` bytes here and in every ancestor
    pub(super) fn shrink(&self, shrink: usize) {
        self.reserved.fetch_sub(shrink, Ordering::Relaxed);
        if let Some(parent) = &self.parent {
            parent.shrink(shrink);
        }
    }

    /// Stops the budget. Any bytes still reserved (which can only happen
    /// when the owner leaked a reservation) are returned to the parent.
    pub fn stop(self: Arc<Self>) {
        drop(self)
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        let leaked = self.reserved.swap(0, Ordering::Relaxed);
        if leaked > 0 {
            warn!(
                "Memory monitor {} stopped with {} still reserved",
                self.name,
                human_readable_size(leaked)
            );
            if let Some(parent) = &self.parent {
                parent.shrink(leaked);
            }
        }
        debug!(
            "Stopped memory monitor {} (peak {})",
            self.name,
            human_readable_size(self.peak())
        );
    }
}

fn insufficient_capacity_err(
    monitor: &str,
    consumer: &str,
    additional: usize,
    current: usize,
    available: usize,
) -> FlowSortError {
    FlowSortError::ResourcesExhausted(format!("Failed to allocate additional {additional} bytes for {consumer} with {current} bytes already allocated - maximum available in {monitor} is {available}"))
}
