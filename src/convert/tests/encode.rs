// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::unwrap_used)]

use super::super::*;
use crate::schema::{encode_enriched_type, EnrichedValueType};
use crate::typing::StructType;

#[test]
fn test_struct_encodes_positionally() {
    let v = Value::from(
        StructValue::new("Row")
            .with_field("a", 1i64)
            .with_field("b", "x"),
    );
    assert_eq!(
        encode_value(&v),
        Value::from(vec![Value::from(1i64), Value::from("x")])
    );
}

#[test]
fn test_map_of_structs_encodes_as_keyed_rows() {
    let mut m = BTreeMap::new();
    m.insert(
        Value::from("k1"),
        Value::from(StructValue::new("Row").with_field("n", 1i64)),
    );
    m.insert(
        Value::from("k2"),
        Value::from(StructValue::new("Row").with_field("n", 2i64)),
    );
    assert_eq!(
        encode_value(&Value::from(m)),
        Value::from(vec![
            Value::from(vec![Value::from("k1"), Value::from(1i64)]),
            Value::from(vec![Value::from("k2"), Value::from(2i64)]),
        ])
    );
}

#[test]
fn test_plain_values_pass_through() {
    assert_eq!(encode_value(&Value::new_map()), Value::new_map());
    assert_eq!(encode_value(&Value::from("s")), Value::from("s"));

    let mut m = BTreeMap::new();
    m.insert(Value::from("a"), Value::from(1i64));
    let m = Value::from(m);
    assert_eq!(encode_value(&m), m);
}

#[test]
fn test_decode_of_encoded_struct() {
    let row = StructType::new("Row")
        .field("a", TypeDesc::Int)
        .field("b", TypeDesc::Str)
        .build();
    let EnrichedValueType { typ, .. } = encode_enriched_type(&row).unwrap();
    let decoder = DecoderBuilder::default()
        .value_decoder(&FieldPath::root("row"), &typ, &analyze_type_info(&row), false)
        .unwrap();

    let v = Value::from(
        StructValue::new("Row")
            .with_field("a", 1i64)
            .with_field("b", "x"),
    );
    assert_eq!(decoder(&encode_value(&v)).unwrap(), v);
}
