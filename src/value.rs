// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::BTreeMap;
use std::ops;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::ser::{SerializeMap, SerializeStruct, Serializer};
use serde::Serialize;
use uuid::Uuid;

// A single value type is used on both sides of the engine boundary.
// Engine-encoded rows are positional arrays; decoded host rows are structs and maps.
// BTree is used for maps so that values can be compared and hashed deterministically.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    LocalDateTime(NaiveDateTime),
    OffsetDateTime(DateTime<FixedOffset>),
    TimeDelta(TimeDelta),
    Json(Arc<serde_json::Value>),

    // Lists, vectors, engine-encoded struct rows and tables.
    Array(Arc<Vec<Value>>),

    // Named record produced by struct decoders.
    Struct(Arc<StructValue>),

    // Ordered by key. Structs decoded as dicts come back sorted by field name.
    Map(Arc<BTreeMap<Value, Value>>),
}

/// A decoded record: a type name plus fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructValue {
    name: Arc<str>,
    fields: Vec<(Arc<str>, Value)>,
}

impl StructValue {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            fields: vec![],
        }
    }

    pub fn with_field(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn push(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.fields.push((name.into(), value));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_ref(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int64(_) => 2,
            Value::Float32(_) => 3,
            Value::Float64(_) => 4,
            Value::Str(_) => 5,
            Value::Bytes(_) => 6,
            Value::Uuid(_) => 7,
            Value::Date(_) => 8,
            Value::Time(_) => 9,
            Value::LocalDateTime(_) => 10,
            Value::OffsetDateTime(_) => 11,
            Value::TimeDelta(_) => 12,
            Value::Json(_) => 13,
            Value::Array(_) => 14,
            Value::Struct(_) => 15,
            Value::Map(_) => 16,
        }
    }
}

// Floats are ordered with `total_cmp` so that values can key maps.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float32(a), Value::Float32(b)) => a.total_cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::LocalDateTime(a), Value::LocalDateTime(b)) => a.cmp(b),
            (Value::OffsetDateTime(a), Value::OffsetDateTime(b)) => a.cmp(b),
            (Value::TimeDelta(a), Value::TimeDelta(b)) => a.cmp(b),
            (Value::Json(a), Value::Json(b)) => a.to_string().cmp(&b.to_string()),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Struct(a), Value::Struct(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int64(n) => n.hash(state),
            Value::Float32(f) => f.to_bits().hash(state),
            Value::Float64(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Uuid(u) => u.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Time(t) => t.hash(state),
            Value::LocalDateTime(dt) => dt.hash(state),
            Value::OffsetDateTime(dt) => dt.hash(state),
            Value::TimeDelta(d) => d.hash(state),
            Value::Json(j) => j.to_string().hash(state),
            Value::Array(a) => a.hash(state),
            Value::Struct(s) => s.hash(state),
            Value::Map(m) => m.hash(state),
        }
    }
}

struct TimeDeltaParts<'a>(&'a TimeDelta);

impl Serialize for TimeDeltaParts<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("TimeDelta", 2)?;
        s.serialize_field("secs", &self.0.num_seconds())?;
        s.serialize_field("nanos", &self.0.subsec_nanos())?;
        s.end()
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::Error;
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int64(n) => serializer.serialize_i64(*n),
            Value::Float32(f) => serializer.serialize_f32(*f),
            Value::Float64(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Uuid(u) => serializer.collect_str(u),
            Value::Date(d) => serializer.collect_str(d),
            Value::Time(t) => serializer.collect_str(t),
            Value::LocalDateTime(dt) => {
                serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f"))
            }
            Value::OffsetDateTime(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            Value::TimeDelta(d) => TimeDeltaParts(d).serialize(serializer),
            Value::Json(j) => j.serialize(serializer),
            Value::Array(a) => a.serialize(serializer),
            Value::Struct(s) => {
                let mut map = serializer.serialize_map(Some(s.len()))?;
                for (name, v) in s.fields() {
                    map.serialize_entry(name, v)?;
                }
                map.end()
            }
            Value::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    match k {
                        Value::Str(_) => map.serialize_entry(k, v)?,
                        _ => {
                            let key_str = serde_json::to_string(k).map_err(Error::custom)?;
                            map.serialize_entry(&key_str, v)?
                        }
                    }
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            _ => match serde_json::to_string(self) {
                Ok(s) => write!(f, "{s}"),
                Err(_e) => Err(fmt::Error),
            },
        }
    }
}

impl Value {
    pub fn new_array() -> Value {
        Value::from(vec![])
    }

    pub fn new_map() -> Value {
        Value::from(BTreeMap::new())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(b.into().into())
    }

    pub fn json(j: serde_json::Value) -> Value {
        Value::Json(Arc::new(j))
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::LocalDateTime(_) => "local datetime",
            Value::OffsetDateTime(_) => "offset datetime",
            Value::TimeDelta(_) => "timedelta",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int64(n) => Ok(*n),
            _ => Err(anyhow!("not an int64")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Float64(f) => Ok(*f),
            Value::Float32(f) => Ok(f64::from(*f)),
            Value::Int64(n) => Ok(*n as f64),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_f32(&self) -> Result<f32> {
        match self {
            Value::Float32(f) => Ok(*f),
            Value::Float64(f) => Ok(*f as f32),
            Value::Int64(n) => Ok(*n as f32),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => Err(anyhow!("not bytes")),
        }
    }

    pub fn as_uuid(&self) -> Result<&Uuid> {
        match self {
            Value::Uuid(u) => Ok(u),
            _ => Err(anyhow!("not a uuid")),
        }
    }

    pub fn as_json(&self) -> Result<&serde_json::Value> {
        match self {
            Value::Json(j) => Ok(j),
            _ => Err(anyhow!("not json")),
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Value>> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(anyhow!("not an array")),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Ok(Arc::make_mut(a)),
            _ => Err(anyhow!("not an array")),
        }
    }

    pub fn as_struct(&self) -> Result<&StructValue> {
        match self {
            Value::Struct(s) => Ok(s),
            _ => Err(anyhow!("not a struct")),
        }
    }

    pub fn as_map(&self) -> Result<&BTreeMap<Value, Value>> {
        match self {
            Value::Map(m) => Ok(m),
            _ => Err(anyhow!("not a map")),
        }
    }

    pub fn as_map_mut(&mut self) -> Result<&mut BTreeMap<Value, Value>> {
        match self {
            Value::Map(m) => Ok(Arc::make_mut(m)),
            _ => Err(anyhow!("not a map")),
        }
    }

    /// Look up a named field of a struct, or a string key of a map.
    pub fn field(&self, name: &str) -> Result<&Value> {
        match self {
            Value::Struct(s) => s
                .get(name)
                .ok_or_else(|| anyhow!("struct `{}` has no field `{name}`", s.name())),
            Value::Map(m) => m
                .get(&Value::from(name))
                .ok_or_else(|| anyhow!("map has no key `{name}`")),
            _ => Err(anyhow!("cannot access field `{name}` of a {}", self.kind_name())),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int64(i64::from(n))
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float32(f)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::Time(t)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::LocalDateTime(dt)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Value::OffsetDateTime(dt)
    }
}

impl From<TimeDelta> for Value {
    fn from(d: TimeDelta) -> Self {
        Value::TimeDelta(d)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::json(j)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(Arc::new(a))
    }
}

impl From<StructValue> for Value {
    fn from(s: StructValue) -> Self {
        Value::Struct(Arc::new(s))
    }
}

impl From<BTreeMap<Value, Value>> for Value {
    fn from(m: BTreeMap<Value, Value>) -> Self {
        Value::Map(Arc::new(m))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl ops::Index<usize> for Value {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        match self.as_array() {
            Ok(a) if index < a.len() => &a[index],
            _ => &Value::Null,
        }
    }
}

impl ops::Index<&str> for Value {
    type Output = Value;

    fn index(&self, key: &str) -> &Self::Output {
        self.field(key).unwrap_or(&Value::Null)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn floats_order_totally() {
        let mut m = BTreeMap::new();
        m.insert(Value::from(f64::NAN), Value::Null);
        m.insert(Value::from(1.5), Value::Null);
        m.insert(Value::from(-0.0), Value::Null);
        assert_eq!(m.len(), 3);
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
    }

    #[test]
    fn struct_fields_keep_declaration_order() {
        let v = Value::from(
            StructValue::new("Row")
                .with_field("b", 1i64)
                .with_field("a", "x"),
        );
        let names: Vec<_> = v.as_struct().unwrap().fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(v["a"], Value::from("x"));
        assert_eq!(v["missing"], Value::Null);
    }

    #[test]
    fn serialize_time_delta_as_parts() {
        let v = Value::from(TimeDelta::milliseconds(1500));
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"secs": 1, "nanos": 500_000_000})
        );
    }

    #[test]
    fn serialize_map_with_non_string_keys() {
        let mut m = BTreeMap::new();
        m.insert(Value::from(1i64), Value::from("one"));
        m.insert(Value::from("k"), Value::from(true));
        let json = serde_json::to_string(&Value::from(m)).unwrap();
        assert_eq!(json, r#"{"1":"one","k":true}"#);
    }

    #[test]
    fn accessors_reject_wrong_kind() {
        assert!(Value::from("x").as_i64().is_err());
        assert_eq!(Value::from(2.0f32).as_f64().unwrap(), 2.0);
        assert!(Value::Null.field("a").is_err());
    }
}
