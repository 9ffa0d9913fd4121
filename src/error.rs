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

//! flowsort error types

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

use arrow::error::ArrowError;

/// Result type for operations that could result in an [FlowSortError]
pub type Result<T, E = FlowSortError> = result::Result<T, E>;

/// Error type for generic operations that could result in FlowSortError::External
pub type GenericError = Box<dyn error::Error + Send + Sync>;

/// flowsort error
#[derive(Debug)]
pub enum FlowSortError {
    /// Error returned by arrow, usually while converting rows for a spill file.
    ArrowError(ArrowError),
    /// Error associated to I/O operations and associated traits.
    IoError(io::Error),
    /// A memory budget refused an allocation and there was no way to
    /// release memory (spilling disabled or impossible).
    ResourcesExhausted(String),
    /// The external row store used for overflow failed to accept or
    /// return rows.
    Storage(String),
    /// The flow was cancelled before the operator completed.
    Cancelled,
    /// Invalid operator or runtime configuration.
    Configuration(String),
    /// Error returned during execution of the operator.
    Execution(String),
    /// Error returned as a consequence of a broken internal invariant.
    /// This error should not happen in normal usage.
    Internal(String),
    /// Errors originating from outside this crate, for example produced by
    /// an upstream processor and carried in metadata.
    External(GenericError),
}

impl FlowSortError {
    /// Returns true if this error only signals cancellation of the flow.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowSortError::Cancelled)
    }

    /// Returns true if this error reports an exhausted memory or disk budget.
    pub fn is_resources_exhausted(&self) -> bool {
        matches!(self, FlowSortError::ResourcesExhausted(_))
    }
}

impl From<io::Error> for FlowSortError {
    fn from(e: io::Error) -> Self {
        FlowSortError::IoError(e)
    }
}

impl From<ArrowError> for FlowSortError {
    fn from(e: ArrowError) -> Self {
        FlowSortError::ArrowError(e)
    }
}

impl From<GenericError> for FlowSortError {
    fn from(err: GenericError) -> Self {
        FlowSortError::External(err)
    }
}

impl Display for FlowSortError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match *self {
            FlowSortError::ArrowError(ref desc) => write!(f, "Arrow error: {desc}"),
            FlowSortError::IoError(ref desc) => write!(f, "IO error: {desc}"),
            FlowSortError::ResourcesExhausted(ref desc) => {
                write!(f, "Resources exhausted: {desc}")
            }
            FlowSortError::Storage(ref desc) => write!(f, "Storage error: {desc}"),
            FlowSortError::Cancelled => write!(f, "Execution cancelled"),
            FlowSortError::Configuration(ref desc) => {
                write!(f, "Invalid configuration: {desc}")
            }
            FlowSortError::Execution(ref desc) => write!(f, "Execution error: {desc}"),
            FlowSortError::Internal(ref desc) => {
                write!(f, "Internal error: {desc}. This was likely caused by a bug in flowsort")
            }
            FlowSortError::External(ref desc) => write!(f, "External error: {desc}"),
        }
    }
}

impl error::Error for FlowSortError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            FlowSortError::ArrowError(e) => Some(e),
            FlowSortError::IoError(e) => Some(e),
            FlowSortError::External(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Returns `Err(FlowSortError::Execution(..))` built from a format string
#[macro_export]
macro_rules! exec_err {
    ($($arg:tt)*) => {
        Err($crate::error::FlowSortError::Execution(format!($($arg)*)))
    };
}

/// Returns `Err(FlowSortError::Internal(..))` built from a format string
#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => {
        Err($crate::error::FlowSortError::Internal(format!($($arg)*)))
    };
}

/// Returns `Err(FlowSortError::Configuration(..))` built from a format string
#[macro_export]
macro_rules! config_err {
    ($($arg:tt)*) => {
        Err($crate::error::FlowSortError::Configuration(format!($($arg)*)))
    };
}

/// Returns `Err(FlowSortError::ResourcesExhausted(..))` built from a format string
#[macro_export]
macro_rules! resources_err {
    ($($arg:tt)*) => {
        Err($crate::error::FlowSortError::ResourcesExhausted(format!($($arg)*)))
    };
}

/// Returns `Err(FlowSortError::Storage(..))` built from a format string
#[macro_export]
macro_rules! storage_err {
    ($($arg:tt)*) => {
        Err($crate::storage_flowsort_err!($($arg)*))
    };
}

/// Builds a `FlowSortError::Storage` (not wrapped in `Err`) from a format string
#[macro_export]
macro_rules! storage_flowsort_err {
    ($($arg:tt)*) => {
        $crate::error::FlowSortError::Storage(format!($($arg)*))
    };
}
