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

//! [`ScalarValue`]: a single typed cell of a [`Row`](crate::row::Row)

use std::cmp::Ordering;
use std::fmt;

use arrow::datatypes::DataType;

/// A dynamically typed, nullable, single value.
///
/// Each variant corresponds to one Arrow [`DataType`] so rows can be
/// converted to `RecordBatch`es when they are spilled.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    /// represents `DataType::Null` (castable to/from any other type)
    Null,
    /// true or false value
    Boolean(Option<bool>),
    /// signed 32bit int
    Int32(Option<i32>),
    /// signed 64bit int
    Int64(Option<i64>),
    /// 64bit float
    Float64(Option<f64>),
    /// utf-8 encoded string.
    Utf8(Option<String>),
}

impl ScalarValue {
    /// Getter for the `DataType` of the value
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        }
    }

    /// Whether this value is null or not.
    pub fn is_null(&self) -> bool {
        match self {
            ScalarValue::Null => true,
            ScalarValue::Boolean(v) => v.is_none(),
            ScalarValue::Int32(v) => v.is_none(),
            ScalarValue::Int64(v) => v.is_none(),
            ScalarValue::Float64(v) => v.is_none(),
            ScalarValue::Utf8(v) => v.is_none(),
        }
    }

    /// Create a null value of the given `DataType`, if supported
    pub fn try_new_null(data_type: &DataType) -> Option<Self> {
        Some(match data_type {
            DataType::Null => ScalarValue::Null,
            DataType::Boolean => ScalarValue::Boolean(None),
            DataType::Int32 => ScalarValue::Int32(None),
            DataType::Int64 => ScalarValue::Int64(None),
            DataType::Float64 => ScalarValue::Float64(None),
            DataType::Utf8 => ScalarValue::Utf8(None),
            _ => return None,
        })
    }

    /// Estimate of the number of bytes taken by this value, including
    /// heap allocations.
    pub fn size(&self) -> usize {
        std::mem::size_of_val(self)
            + match self {
                ScalarValue::Utf8(Some(s)) => s.capacity(),
                _ => 0,
            }
    }

    /// Total order used by the row comparator.
    ///
    /// Nulls sort before every non-null value. Floats are ordered with
    /// [`f64::total_cmp`]. Values of different types are ordered by a
    /// fixed type rank so that the order stays total.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a.cmp(b),
            (ScalarValue::Int32(a), ScalarValue::Int32(b)) => a.cmp(b),
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a.cmp(b),
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => match (a, b) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            },
            (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) => a.cmp(b),
            _ => match (self.is_null(), other.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => self.type_rank().cmp(&other.type_rank()),
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Boolean(_) => 1,
            ScalarValue::Int32(_) => 2,
            ScalarValue::Int64(_) => 3,
            ScalarValue::Float64(_) => 4,
            ScalarValue::Utf8(_) => 5,
        }
    }
}

macro_rules! impl_scalar_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for ScalarValue {
            fn from(value: $ty) -> Self {
                ScalarValue::$variant(Some(value))
            }
        }

        impl From<Option<$ty>> for ScalarValue {
            fn from(value: Option<$ty>) -> Self {
                ScalarValue::$variant(value)
            }
        }
    };
}

impl_scalar_from!(bool, Boolean);
impl_scalar_from!(i32, Int32);
impl_scalar_from!(i64, Int64);
impl_scalar_from!(f64, Float64);
impl_scalar_from!(String, Utf8);

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(Some(value.to_string()))
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }
        match self {
            ScalarValue::Boolean(Some(v)) => write!(f, "{v}"),
            ScalarValue::Int32(Some(v)) => write!(f, "{v}"),
            ScalarValue::Int64(Some(v)) => write!(f, "{v}"),
            ScalarValue::Float64(Some(v)) => write!(f, "{v}"),
            ScalarValue::Utf8(Some(v)) => write!(f, "{v}"),
            _ => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_sort_first() {
        let null = ScalarValue::Int64(None);
        let one = ScalarValue::from(1i64);
        assert_eq!(null.total_cmp(&one), Ordering::Less);
        assert_eq!(one.total_cmp(&null), Ordering::Greater);
        assert_eq!(null.total_cmp(&ScalarValue::Null), Ordering::Equal);
    }

    #[test]
    fn floats_have_total_order() {
        let nan = ScalarValue::from(f64::NAN);
        let inf = ScalarValue::from(f64::INFINITY);
        assert_eq!(inf.total_cmp(&nan), Ordering::Less);
        assert_eq!(nan.total_cmp(&nan), Ordering::Equal);
        assert_eq!(
            ScalarValue::Float64(None).total_cmp(&ScalarValue::from(-1.0)),
            Ordering::Less
        );
    }

    #[test]
    fn strings_compare_lexicographically() {
        let a = ScalarValue::from("apple");
        let b = ScalarValue::from("banana");
        assert_eq!(a.total_cmp(&b), Ordering::Less);
        assert_eq!(a.to_string(), "apple");
        assert_eq!(ScalarValue::Utf8(None).to_string(), "NULL");
    }

    #[test]
    fn size_includes_heap() {
        let inline = ScalarValue::from(1i32).size();
        let s = ScalarValue::Utf8(Some(String::with_capacity(100)));
        assert!(s.size() >= inline + 100);
    }

    #[test]
    fn null_of_type() {
        assert_eq!(
            ScalarValue::try_new_null(&DataType::Utf8),
            Some(ScalarValue::Utf8(None))
        );
        assert_eq!(ScalarValue::try_new_null(&DataType::Date32), None);
    }
}
