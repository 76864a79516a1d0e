// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use opbind::convert::{DecoderBuilder, FieldPath};
use opbind::schema::{FieldSchema, TableSchema};
use opbind::{analyze_type_info, EnrichedValueType, StructType, TypeDesc, Value, ValueType};

fn chunk_fields() -> Vec<FieldSchema> {
    vec![
        FieldSchema::new("text", EnrichedValueType::new(ValueType::Str)),
        FieldSchema::new("offset", EnrichedValueType::new(ValueType::Int64)),
        FieldSchema::new("score", EnrichedValueType::new(ValueType::Float32)),
    ]
}

fn chunk_rows(n: usize) -> Value {
    Value::from(
        (0..n)
            .map(|i| {
                Value::from(vec![
                    Value::from(format!("chunk {i}")),
                    Value::from(i as i64),
                    Value::from(i as f32 / 10.0),
                ])
            })
            .collect::<Vec<_>>(),
    )
}

fn decode_table(c: &mut Criterion) {
    let src = ValueType::LTable(TableSchema {
        row: opbind::schema::StructSchema {
            fields: chunk_fields(),
            description: None,
        },
    });
    let chunk = StructType::new("Chunk")
        .field("text", TypeDesc::Str)
        .field("offset", TypeDesc::Int)
        .field("score", TypeDesc::Float)
        .build();

    let mut group = c.benchmark_group("decode ltable");
    for (label, dst) in [
        ("struct rows", TypeDesc::list_of(chunk)),
        ("untyped rows", TypeDesc::Any),
    ] {
        let decoder = DecoderBuilder::default()
            .value_decoder(&FieldPath::root("chunks"), &src, &analyze_type_info(&dst), false)
            .unwrap();
        for n in [10, 1000] {
            let rows = chunk_rows(n);
            group.bench_with_input(BenchmarkId::new(label, n), &rows, |b, rows| {
                b.iter(|| decoder(black_box(rows)).unwrap())
            });
        }
    }
    group.finish();
}

fn decode_vector(c: &mut Criterion) {
    let src = ValueType::Vector(opbind::schema::VectorTypeSchema {
        element_type: Box::new(ValueType::Float32),
        dimension: Some(384),
    });
    let dst = TypeDesc::vector(TypeDesc::float32(), Some(384));
    let decoder = DecoderBuilder::default()
        .value_decoder(&FieldPath::root("embedding"), &src, &analyze_type_info(&dst), false)
        .unwrap();
    let embedding = Value::from((0..384).map(|i| Value::from(i as f32)).collect::<Vec<_>>());

    c.bench_function("decode 384-dim vector", |b| {
        b.iter(|| decoder(black_box(&embedding)).unwrap())
    });
}

criterion_group!(benches, decode_table, decode_vector);
criterion_main!(benches);
