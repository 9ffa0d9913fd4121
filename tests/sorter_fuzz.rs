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

//! Fuzz tests comparing the sorter against `Vec::sort_by` for random
//! inputs, with and without spilling

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use flowsort::config::ExecutionOptions;
use flowsort::test::{TestRowReceiver, TestRowSource};
use flowsort::{
    ColumnOrdering, FlowContext, OrderingColumn, PostProcessSpec, Row, ScalarValue,
    Sorter, SorterSpec,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("x", DataType::Int32, true),
        Field::new("y", DataType::Utf8, true),
        Field::new("seq", DataType::Int64, false),
    ]))
}

/// Rows with a random nullable key `x`, a random string `y` and their
/// arrival position `seq`
fn make_rows(len: usize, key_range: i32, seed: u64) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|seq| {
            let x = if rng.random_range(0..20) == 0 {
                ScalarValue::Int32(None)
            } else {
                ScalarValue::from(rng.random_range(0..key_range))
            };
            let y = ScalarValue::from(format!("v{}", rng.random_range(0..1000)));
            Row::new(vec![x, y, ScalarValue::from(seq as i64)])
        })
        .collect()
}

fn ordering(columns: Vec<OrderingColumn>) -> ColumnOrdering {
    ColumnOrdering::try_new(columns, &schema()).unwrap()
}

fn sorted(rows: &[Row], ordering: &ColumnOrdering) -> Vec<Row> {
    let mut expected = rows.to_vec();
    expected.sort_by(|a, b| ordering.compare(a, b));
    expected
}

/// Runs a sorter over `rows` and returns the emitted rows, checking that
/// the run released every resource
async fn run_sort(
    ctx: Arc<FlowContext>,
    spec: SorterSpec,
    rows: Vec<Row>,
    post: PostProcessSpec,
    testing_mem_limit: usize,
) -> Vec<Row> {
    let receiver = TestRowReceiver::new();
    let source = TestRowSource::from_rows(schema(), rows);
    Sorter::try_new(
        Arc::clone(&ctx),
        spec,
        Box::new(source.clone()),
        post,
        Box::new(receiver.clone()),
    )
    .unwrap()
    .with_testing_mem_limit(testing_mem_limit)
    .run()
    .await;

    assert!(receiver.is_closed());
    assert_eq!(receiver.close_error(), None);
    assert_eq!(source.remaining(), 0);
    assert_eq!(
        ctx.memory().reserved(),
        0,
        "The sort should have returned all memory used back to the flow budget"
    );
    assert_eq!(ctx.disk_manager().used_disk_space(), 0);
    receiver.rows()
}

#[rstest]
#[case::tiny(5, 1)]
#[case::small(2_000, 2)]
#[case::large(20_000, 3)]
#[tokio::test]
async fn sort_all_spilling_matches_unbounded(#[case] len: usize, #[case] seed: u64) {
    let rows = make_rows(len, 1_000, seed);
    let spec = SorterSpec::new(ordering(vec![
        OrderingColumn::asc(0),
        OrderingColumn::desc(1),
    ]));
    let expected = sorted(&rows, &spec.ordering);

    let unbounded = run_sort(
        FlowContext::builder()
            .with_options(ExecutionOptions::new().with_use_temp_storage(false))
            .build()
            .unwrap(),
        spec.clone(),
        rows.clone(),
        PostProcessSpec::new(),
        0,
    )
    .await;
    assert_eq!(unbounded, expected);

    let mem_limit = 64 * rows[0].size();
    let ctx = FlowContext::builder()
        .with_options(ExecutionOptions::new().with_spill_batch_size(100))
        .build()
        .unwrap();
    let spilled = run_sort(
        Arc::clone(&ctx),
        spec,
        rows,
        PostProcessSpec::new(),
        mem_limit,
    )
    .await;
    assert!(ctx.memory().peak() <= mem_limit);
    assert_eq!(spilled, expected);
}

#[tokio::test]
async fn sort_all_sorted_input_is_unchanged() {
    let spec = SorterSpec::new(ordering(vec![OrderingColumn::asc(2)]));
    let rows = make_rows(1_000, 10, 7);
    let output = run_sort(
        FlowContext::try_new().unwrap(),
        spec,
        rows.clone(),
        PostProcessSpec::new(),
        0,
    )
    .await;
    assert_eq!(output, rows);
}

#[derive(Clone, Copy, Debug)]
enum Arrival {
    Sorted,
    Reverse,
    AllEqual,
    Random,
}

fn arrange(arrival: Arrival, len: usize) -> Vec<Row> {
    let mut rows = make_rows(len, 10_000, 11);
    let key_order = ordering(vec![OrderingColumn::asc(0)]);
    match arrival {
        Arrival::Sorted => rows.sort_by(|a, b| key_order.compare(a, b)),
        Arrival::Reverse => rows.sort_by(|a, b| key_order.compare(b, a)),
        Arrival::AllEqual => {
            for row in rows.iter_mut() {
                let mut values = row.values().to_vec();
                values[0] = ScalarValue::from(42);
                *row = Row::new(values);
            }
        }
        Arrival::Random => {}
    }
    rows
}

fn keys(rows: &[Row]) -> Vec<ScalarValue> {
    rows.iter().map(|r| r.value(0).clone()).collect()
}

#[rstest]
#[tokio::test]
async fn top_k_keeps_smallest_rows(
    #[values(Arrival::Sorted, Arrival::Reverse, Arrival::AllEqual, Arrival::Random)]
    arrival: Arrival,
    #[values(1, 10, 999, 5_000)] k: usize,
) {
    let rows = arrange(arrival, 1_000);
    let spec = SorterSpec::new(ordering(vec![OrderingColumn::asc(0)]));
    let expected = sorted(&rows, &spec.ordering);
    let expected = &expected[..k.min(rows.len())];

    let output = run_sort(
        FlowContext::try_new().unwrap(),
        spec,
        rows,
        PostProcessSpec::new().with_limit(k),
        0,
    )
    .await;
    // equal keys may come out in any order
    assert_eq!(keys(&output), keys(expected), "arrival {arrival:?}, k {k}");
}

#[rstest]
#[tokio::test]
async fn top_k_with_offset(#[values(0, 3, 50)] offset: usize) {
    let rows = make_rows(500, 1_000_000, 5);
    let spec = SorterSpec::new(ordering(vec![OrderingColumn::desc(0)]));
    let expected = sorted(&rows, &spec.ordering);
    let limit = 20;

    let output = run_sort(
        FlowContext::try_new().unwrap(),
        spec,
        rows,
        PostProcessSpec::new().with_offset(offset).with_limit(limit),
        0,
    )
    .await;
    assert_eq!(
        keys(&output),
        keys(&expected[offset..offset + limit]),
        "offset {offset}"
    );
}

/// Rows grouped on `x`, in ascending order of `x`, with random `y`
fn make_chunked_rows(num_chunks: i32, seed: u64) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seq = 0i64;
    let mut rows = vec![];
    for chunk in 0..num_chunks {
        for _ in 0..rng.random_range(1..200) {
            rows.push(Row::new(vec![
                ScalarValue::from(chunk),
                ScalarValue::from(format!("v{:04}", rng.random_range(0..1000))),
                ScalarValue::from(seq),
            ]));
            seq += 1;
        }
    }
    rows
}

#[rstest]
#[case::in_memory(0)]
#[case::spilling(4_096)]
#[tokio::test]
async fn chunks_sorts_each_group(#[case] testing_mem_limit: usize) {
    let rows = make_chunked_rows(40, 9);
    let spec = SorterSpec::new(ordering(vec![
        OrderingColumn::asc(0),
        OrderingColumn::asc(1),
    ]))
    .with_match_len(1);
    // input already ordered on the prefix: a full stable sort sorts each
    // group in place
    let expected = sorted(&rows, &spec.ordering);

    let output = run_sort(
        FlowContext::try_new().unwrap(),
        spec,
        rows,
        PostProcessSpec::new(),
        testing_mem_limit,
    )
    .await;
    assert_eq!(output, expected);
}

#[tokio::test]
async fn chunks_never_reorder_groups() {
    // groups are not in ascending order: the sorter must keep their order
    let mut rows = make_chunked_rows(10, 13);
    rows.reverse();
    let spec = SorterSpec::new(ordering(vec![
        OrderingColumn::asc(0),
        OrderingColumn::asc(2),
    ]))
    .with_match_len(1);

    let output = run_sort(
        FlowContext::try_new().unwrap(),
        spec,
        rows.clone(),
        PostProcessSpec::new(),
        0,
    )
    .await;

    let group_sequence = |rows: &[Row]| {
        let mut groups: Vec<ScalarValue> = keys(rows);
        groups.dedup();
        groups
    };
    assert_eq!(group_sequence(&output), group_sequence(&rows));
    for group in output.chunk_by(|a, b| a.value(0) == b.value(0)) {
        let seqs = group.iter().map(|r| r.value(2).clone()).collect::<Vec<_>>();
        let mut sorted_seqs = seqs.clone();
        sorted_seqs.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(seqs, sorted_seqs);
    }
}
