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

//! Column orderings and the row comparator built from them

use std::cmp::Ordering;
use std::fmt;

use arrow::datatypes::Schema;

use crate::config_err;
use crate::error::Result;
use crate::row::Row;

/// Sort direction of a single ordering column
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One `(column index, direction)` entry of a [`ColumnOrdering`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrderingColumn {
    pub column_idx: usize,
    pub direction: SortDirection,
}

impl OrderingColumn {
    pub fn asc(column_idx: usize) -> Self {
        Self {
            column_idx,
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(column_idx: usize) -> Self {
        Self {
            column_idx,
            direction: SortDirection::Descending,
        }
    }
}

impl fmt::Display for OrderingColumn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "@{} ASC", self.column_idx),
            SortDirection::Descending => write!(f, "@{} DESC", self.column_idx),
        }
    }
}

/// A lexicographical ordering over rows.
///
/// Column indices are checked against the stream schema when the
/// ordering is built with [`ColumnOrdering::try_new`], so the comparator
/// never has to deal with missing columns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnOrdering {
    columns: Vec<OrderingColumn>,
}

impl ColumnOrdering {
    /// Creates an ordering, validating it against `schema`: every column
    /// index must exist and appear at most once.
    pub fn try_new(columns: Vec<OrderingColumn>, schema: &Schema) -> Result<Self> {
        let num_fields = schema.fields().len();
        for (i, column) in columns.iter().enumerate() {
            if column.column_idx >= num_fields {
                return config_err!(
                    "Ordering column {} is out of bounds for a schema with {} fields",
                    column.column_idx,
                    num_fields
                );
            }
            if columns[..i]
                .iter()
                .any(|c| c.column_idx == column.column_idx)
            {
                return config_err!(
                    "Ordering column {} appears more than once",
                    column.column_idx
                );
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[OrderingColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Compares two rows on the full ordering.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        self.compare_prefix(a, b, self.columns.len())
    }

    /// Compares two rows using only the first `prefix_len` ordering columns.
    ///
    /// `prefix_len` larger than the ordering is clamped to its length.
    pub fn compare_prefix(&self, a: &Row, b: &Row, prefix_len: usize) -> Ordering {
        let prefix_len = prefix_len.min(self.columns.len());
        for column in &self.columns[..prefix_len] {
            let idx = column.column_idx;
            let ord = a.value(idx).total_cmp(b.value(idx));
            let ord = match column.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Sorts `rows` in place. The sort is stable.
    pub fn sort_rows(&self, rows: &mut [Row]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for ColumnOrdering {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let columns: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", columns.join(", "))
    }
}
