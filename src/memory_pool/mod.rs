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

//! [`MemoryMonitor`] tree and the [`MemoryReservation`]s used to account
//! memory against it

use std::sync::Arc;

use crate::error::Result;

mod monitor;

pub use monitor::MemoryMonitor;

/// A memory consumer is a named allocation traced by a particular
/// [`MemoryReservation`] in a [`MemoryMonitor`]. All allocations are
/// registered to a particular `MemoryConsumer`.
///
/// Consumers that set `can_spill` are able to write their buffered rows
/// to disk when the monitor refuses an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConsumer {
    name: String,
    can_spill: bool,
}

impl MemoryConsumer {
    /// Create a new empty [`MemoryConsumer`] that can be grown using [`MemoryReservation`]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            can_spill: false,
        }
    }

    /// Set whether this allocation can be spilled to disk
    pub fn with_can_spill(self, can_spill: bool) -> Self {
        Self { can_spill, ..self }
    }

    /// Returns true if this allocation can spill to disk
    pub fn can_spill(&self) -> bool {
        self.can_spill
    }

    /// Returns the name associated with this allocation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers this [`MemoryConsumer`] with the provided [`MemoryMonitor`]
    /// returning a [`MemoryReservation`] that can be grown or shrunk over time
    pub fn register(self, monitor: &Arc<MemoryMonitor>) -> MemoryReservation {
        MemoryReservation {
            consumer: self,
            monitor: Arc::clone(monitor),
            size: 0,
        }
    }
}

/// A [`MemoryReservation`] tracks an individual reservation of a number of
/// bytes of memory in a [`MemoryMonitor`] that is freed back to the
/// monitor (and all its ancestors) on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    consumer: MemoryConsumer,
    monitor: Arc<MemoryMonitor>,
    size: usize,
}

impl MemoryReservation {
    /// Returns the size of this reservation in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the [`MemoryConsumer`] for this [`MemoryReservation`]
    pub fn consumer(&self) -> &MemoryConsumer {
        &self.consumer
    }

    /// Returns the [`MemoryMonitor`] this reservation accounts against
    pub fn monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }

    /// Frees all bytes from this reservation back to the underlying
    /// monitor, returning the number of bytes freed
    pub fn free(&mut self) -> usize {
        let size = self.size;
        if size != 0 {
            self.shrink(size)
        }
        size
    }

    /// Frees `capacity` bytes from this reservation
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`Self::size`]
    pub fn shrink(&mut self, capacity: usize) {
        let new_size = self.size.checked_sub(capacity).unwrap();
        self.monitor.shrink(capacity);
        self.size = new_size
    }

    /// Increase the size of this reservation by `capacity` bytes
    /// without checking any limit
    pub fn grow(&mut self, capacity: usize) {
        self.monitor.grow(capacity);
        self.size += capacity;
    }

    /// Try to increase the size of this reservation by `capacity`
    /// bytes, returning an error if there is insufficient capacity left
    /// in the monitor or one of its ancestors
    pub fn try_grow(&mut self, capacity: usize) -> Result<()> {
        self.monitor
            .try_grow(&self.consumer.name, self.size, capacity)?;
        self.size += capacity;
        Ok(())
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.free();
    }
}

const TB: u64 = 1 << 40;
const GB: u64 = 1 << 30;
const MB: u64 = 1 << 20;
const KB: u64 = 1 << 10;

/// Present size in human readable form
pub fn human_readable_size(size: usize) -> String {
    let size = size as u64;
    let (value, unit) = {
        if size >= 2 * TB {
            (size as f64 / TB as f64, "TB")
        } else if size >= 2 * GB {
            (size as f64 / GB as f64, "GB")
        } else if size >= 2 * MB {
            (size as f64 / MB as f64, "MB")
        } else if size >= 2 * KB {
            (size as f64 / KB as f64, "KB")
        } else {
            (size as f64, "B")
        }
    };
    format!("{value:.1} {unit}")
}
