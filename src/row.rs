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

//! [`Row`]s and their conversion to and from Arrow [`RecordBatch`]es

use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder,
    Int32Array, Int32Builder, Int64Array, Int64Builder, NullArray, StringArray,
    StringBuilder,
};
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::Result;
use crate::scalar::ScalarValue;
use crate::{exec_err, internal_err};

/// One row of a stream: an ordered tuple of values whose types follow
/// the stream schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    values: Vec<ScalarValue>,
}

impl Row {
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Self { values }
    }

    /// Value of the column at `idx`. Panics if `idx` is out of bounds;
    /// orderings and projections are validated against the schema, and
    /// incoming rows against it with [`Row::try_conform`].
    pub fn value(&self, idx: usize) -> &ScalarValue {
        &self.values[idx]
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<ScalarValue> {
        self.values
    }

    pub fn num_columns(&self) -> usize {
        self.values.len()
    }

    /// Checks that the row has one value per field of `schema`, and types
    /// every untyped [`ScalarValue::Null`] after its field.
    ///
    /// Typed nulls are what a spilled row reads back as, so a conformed
    /// row is equal to itself after a round trip through disk.
    pub fn try_conform(mut self, schema: &Schema) -> Result<Row> {
        let fields = schema.fields();
        if self.values.len() != fields.len() {
            return exec_err!(
                "Row has {} columns but the schema has {}",
                self.values.len(),
                fields.len()
            );
        }
        for (value, field) in self.values.iter_mut().zip(fields.iter()) {
            if matches!(value, ScalarValue::Null) {
                if let Some(typed) = ScalarValue::try_new_null(field.data_type()) {
                    *value = typed;
                }
            }
        }
        Ok(self)
    }

    /// Keeps only the columns listed in `columns`, in that order.
    pub fn project(self, columns: &[usize]) -> Row {
        let mut values = self.values;
        let projected = columns
            .iter()
            .map(|&idx| std::mem::replace(&mut values[idx], ScalarValue::Null))
            .collect();
        Row::new(projected)
    }

    /// Estimated memory footprint of the row, used for memory accounting.
    pub fn size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.values.capacity() * std::mem::size_of::<ScalarValue>()
            + self
                .values
                .iter()
                .map(|v| v.size() - std::mem::size_of_val(v))
                .sum::<usize>()
    }
}

impl From<Vec<ScalarValue>> for Row {
    fn from(values: Vec<ScalarValue>) -> Self {
        Row::new(values)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

/// Builds a [`RecordBatch`] holding `rows`, validating every value
/// against `schema`.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[Row]) -> Result<RecordBatch> {
    for row in rows {
        if row.num_columns() != schema.fields().len() {
            return exec_err!(
                "Row has {} columns but the schema has {}",
                row.num_columns(),
                schema.fields().len()
            );
        }
    }

    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| build_column(field.data_type(), rows, idx))
        .collect::<Result<Vec<_>>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        columns,
        &options,
    )?)
}

macro_rules! build_primitive_column {
    ($builder:ty, $variant:ident, $rows:expr, $idx:expr, $data_type:expr) => {{
        let mut builder = <$builder>::with_capacity($rows.len());
        for row in $rows {
            match row.value($idx) {
                ScalarValue::$variant(v) => builder.append_option(*v),
                ScalarValue::Null => builder.append_null(),
                other => {
                    return exec_err!(
                        "Expected {} value in column {}, got {:?}",
                        $data_type,
                        $idx,
                        other
                    )
                }
            }
        }
        Arc::new(builder.finish()) as ArrayRef
    }};
}

fn build_column(data_type: &DataType, rows: &[Row], idx: usize) -> Result<ArrayRef> {
    let array = match data_type {
        DataType::Null => Arc::new(NullArray::new(rows.len())) as ArrayRef,
        DataType::Boolean => {
            build_primitive_column!(BooleanBuilder, Boolean, rows, idx, data_type)
        }
        DataType::Int32 => {
            build_primitive_column!(Int32Builder, Int32, rows, idx, data_type)
        }
        DataType::Int64 => {
            build_primitive_column!(Int64Builder, Int64, rows, idx, data_type)
        }
        DataType::Float64 => {
            build_primitive_column!(Float64Builder, Float64, rows, idx, data_type)
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::with_capacity(rows.len(), 0);
            for row in rows {
                match row.value(idx) {
                    ScalarValue::Utf8(v) => builder.append_option(v.as_deref()),
                    ScalarValue::Null => builder.append_null(),
                    other => {
                        return exec_err!(
                            "Expected {} value in column {}, got {:?}",
                            data_type,
                            idx,
                            other
                        )
                    }
                }
            }
            Arc::new(builder.finish()) as ArrayRef
        }
        other => return exec_err!("Unsupported column type {other} in sorted rows"),
    };
    Ok(array)
}

/// Splits a [`RecordBatch`] back into [`Row`]s.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let mut values: Vec<Vec<ScalarValue>> = (0..batch.num_rows())
        .map(|_| Vec::with_capacity(batch.num_columns()))
        .collect();

    for column in batch.columns() {
        for (row_idx, row_values) in values.iter_mut().enumerate() {
            row_values.push(array_value(column, row_idx)?);
        }
    }

    Ok(values.into_iter().map(Row::new).collect())
}

macro_rules! downcast_value {
    ($array:expr, $ty:ty, $variant:ident, $row:expr) => {{
        let Some(array) = $array.as_any().downcast_ref::<$ty>() else {
            return internal_err!(
                "Failed to downcast array of type {} to {}",
                $array.data_type(),
                stringify!($ty)
            );
        };
        if array.is_null($row) {
            ScalarValue::$variant(None)
        } else {
            ScalarValue::$variant(Some(array.value($row).into()))
        }
    }};
}

fn array_value(array: &ArrayRef, row: usize) -> Result<ScalarValue> {
    Ok(match array.data_type() {
        DataType::Null => ScalarValue::Null,
        DataType::Boolean => downcast_value!(array, BooleanArray, Boolean, row),
        DataType::Int32 => downcast_value!(array, Int32Array, Int32, row),
        DataType::Int64 => downcast_value!(array, Int64Array, Int64, row),
        DataType::Float64 => downcast_value!(array, Float64Array, Float64, row),
        DataType::Utf8 => downcast_value!(array, StringArray, Utf8, row),
        other => return exec_err!("Unsupported column type {other} in sorted rows"),
    })
}
