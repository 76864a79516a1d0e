// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Conversion between engine-encoded values and host values.
//
// Decoders are built once from an (engine schema, declared host type) pair and then applied
// to every value crossing the boundary. Building a decoder performs all the type checks;
// applying it only checks the shape of the value at hand.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::schema::{FieldSchema, ValueType};
use crate::typing::{analyze_type_info, AnalyzedTypeInfo, AnalyzedVariant, BasicKind, TypeDesc};
use crate::value::{StructValue, Value};

mod error;

pub use error::DecodeError;

/// Decodes one engine value into the host representation of a declared type.
pub type Decoder = Arc<dyn Fn(&Value) -> Result<Value, DecodeError> + Send + Sync>;

// Decodes the positional field values of one engine struct row.
type RowDecoder = Arc<dyn Fn(&[Value]) -> Result<Value, DecodeError> + Send + Sync>;
type FieldDecoder = Box<dyn Fn(&[Value]) -> Result<Value, DecodeError> + Send + Sync>;

fn make_decoder<F>(f: F) -> Decoder
where
    F: Fn(&Value) -> Result<Value, DecodeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn make_row_decoder<F>(f: F) -> RowDecoder
where
    F: Fn(&[Value]) -> Result<Value, DecodeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn identity() -> Decoder {
    make_decoder(|value| Ok(value.clone()))
}

/// Location of a value inside an argument, e.g. `doc.chunks[*].text`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}{segment}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn mismatch(path: &FieldPath, detail: impl Into<String>) -> DecodeError {
    DecodeError::TypeMismatch {
        path: path.to_string(),
        detail: detail.into(),
    }
}

fn unexpected(path: &FieldPath, expected: &'static str, actual: &Value) -> DecodeError {
    DecodeError::UnexpectedValue {
        path: path.to_string(),
        expected,
        actual: actual.kind_name(),
    }
}

fn check_field_count(path: &FieldPath, expected: usize, actual: usize) -> Result<(), DecodeError> {
    if expected != actual {
        return Err(DecodeError::FieldCount {
            path: path.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn decode_row(decoder: &RowDecoder, path: &FieldPath, row: &Value) -> Result<Value, DecodeError> {
    match row {
        Value::Array(fields) => decoder(fields.as_slice()),
        v => Err(unexpected(path, "a struct row", v)),
    }
}

const CONVERTIBLE_KINDS: &[(BasicKind, BasicKind)] = &[
    (BasicKind::Float32, BasicKind::Float64),
    (BasicKind::LocalDateTime, BasicKind::OffsetDateTime),
];

fn is_kind_convertible(src: BasicKind, dst: BasicKind) -> bool {
    src == dst || CONVERTIBLE_KINDS.contains(&(src, dst))
}

// Floats truncate toward zero; NaN, infinities and out of range values have no integer.
fn float_to_i64(f: f64) -> Option<i64> {
    const BOUND: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (f.is_finite() && (-BOUND..BOUND).contains(&f)).then(|| f as i64)
}

fn coerce_numeric(kind: BasicKind, value: &Value) -> Option<Value> {
    match (kind, value) {
        (BasicKind::Int64, Value::Int64(n)) => Some(Value::Int64(*n)),
        (BasicKind::Int64, Value::Float32(f)) => float_to_i64(f64::from(*f)).map(Value::Int64),
        (BasicKind::Int64, Value::Float64(f)) => float_to_i64(*f).map(Value::Int64),
        (BasicKind::Float32, v) => v.as_f32().ok().map(Value::Float32),
        (BasicKind::Float64, v) => v.as_f64().ok().map(Value::Float64),
        _ => None,
    }
}

/// Default assigned to a struct field missing from the engine schema, when one is safe.
fn auto_default(info: &AnalyzedTypeInfo) -> Option<Value> {
    if info.nullable {
        return Some(Value::Null);
    }
    match info.variant {
        AnalyzedVariant::List { .. } => Some(Value::new_array()),
        AnalyzedVariant::Dict { .. } => Some(Value::new_map()),
        _ => None,
    }
}

enum ElementDecode {
    Coerce(BasicKind),
    Decode(Decoder),
    Raw,
}

#[derive(Debug, Clone)]
pub struct DecoderBuilder {
    auto_default_missing_fields: bool,
}

impl Default for DecoderBuilder {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

impl DecoderBuilder {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            auto_default_missing_fields: config.auto_default_missing_fields,
        }
    }

    /// Build a decoder from engine values of type `src` to host values of type `dst`.
    ///
    /// `for_key` selects positional decoding for untyped struct keys, so that keys stay
    /// comparable.
    pub fn value_decoder(
        &self,
        path: &FieldPath,
        src: &ValueType,
        dst: &AnalyzedTypeInfo,
        for_key: bool,
    ) -> Result<Decoder, DecodeError> {
        if dst.variant == AnalyzedVariant::Unknown {
            return Err(mismatch(
                path,
                format!("declared `{}`, an unsupported type", dst.core_type),
            ));
        }

        match src {
            ValueType::Struct(s) => return self.struct_decoder(path, &s.fields, dst, for_key),
            ValueType::LTable(t) => return self.ltable_decoder(path, &t.row.fields, dst),
            ValueType::KTable(t) => return self.ktable_decoder(path, &t.row.fields, dst),
            ValueType::Union(u) => return self.union_decoder(path, &u.types, dst),
            _ => {}
        }

        if dst.is_any() {
            return Ok(identity());
        }

        if let ValueType::Vector(v) = src {
            return self.vector_decoder(path, &v.element_type, dst);
        }

        match &dst.variant {
            AnalyzedVariant::Basic(kind) => basic_decoder(path, src, dst, *kind),
            AnalyzedVariant::Union(arms) => self.union_arm_decoder(path, src, dst, arms),
            // Engine JSON may be read into any structured host type.
            _ if src.basic_kind() == Some(BasicKind::Json) => Ok(identity()),
            _ => Err(mismatch(
                path,
                format!("passed in {}, declared {}", src.kind(), dst.core_type),
            )),
        }
    }

    /// Build a decoder from engine struct rows (positional field arrays) to host values.
    pub fn struct_decoder(
        &self,
        path: &FieldPath,
        src_fields: &[FieldSchema],
        dst: &AnalyzedTypeInfo,
        for_key: bool,
    ) -> Result<Decoder, DecodeError> {
        let row_decoder = self.row_decoder(path, src_fields, dst, for_key)?;
        let path = path.clone();
        Ok(make_decoder(move |value| match value {
            Value::Null => Ok(Value::Null),
            v => decode_row(&row_decoder, &path, v),
        }))
    }

    fn ltable_decoder(
        &self,
        path: &FieldPath,
        row_fields: &[FieldSchema],
        dst: &AnalyzedTypeInfo,
    ) -> Result<Decoder, DecodeError> {
        let rows_path = path.child("[*]");
        let elem = match &dst.variant {
            AnalyzedVariant::Any => TypeDesc::Any,
            AnalyzedVariant::List { elem, .. } => elem.clone(),
            _ => {
                return Err(mismatch(
                    &rows_path,
                    format!("declared `{}`, a list type expected", dst.core_type),
                ))
            }
        };
        let row_decoder =
            self.row_decoder(&rows_path, row_fields, &analyze_type_info(&elem), false)?;

        Ok(make_decoder(move |value| match value {
            Value::Null => Ok(Value::Null),
            Value::Array(rows) => rows
                .iter()
                .map(|row| decode_row(&row_decoder, &rows_path, row))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::from),
            v => Err(unexpected(&rows_path, "a list of rows", v)),
        }))
    }

    fn ktable_decoder(
        &self,
        path: &FieldPath,
        row_fields: &[FieldSchema],
        dst: &AnalyzedTypeInfo,
    ) -> Result<Decoder, DecodeError> {
        let rows_path = path.child("[*]");
        let (key_type, value_type) = match &dst.variant {
            AnalyzedVariant::Any => (TypeDesc::Any, TypeDesc::Any),
            AnalyzedVariant::Dict { key, value } => (key.clone(), value.clone()),
            _ => {
                return Err(mismatch(
                    &rows_path,
                    format!("declared `{}`, a dict type expected", dst.core_type),
                ))
            }
        };
        let Some((key_field, value_fields)) = row_fields.split_first() else {
            return Err(mismatch(&rows_path, "KTable row has no key field"));
        };

        let key_decoder = self.value_decoder(
            &rows_path.child(&format!(".{}", key_field.name)),
            &key_field.value_type.typ,
            &analyze_type_info(&key_type),
            true,
        )?;
        let value_decoder =
            self.row_decoder(&rows_path, value_fields, &analyze_type_info(&value_type), false)?;

        Ok(make_decoder(move |value| match value {
            Value::Null => Ok(Value::Null),
            Value::Array(rows) => {
                let mut table = BTreeMap::new();
                for row in rows.iter() {
                    match row {
                        Value::Array(fields) if !fields.is_empty() => {
                            let key = key_decoder(&fields[0])?;
                            table.insert(key, value_decoder(&fields[1..])?);
                        }
                        v => return Err(unexpected(&rows_path, "a keyed row", v)),
                    }
                }
                Ok(Value::from(table))
            }
            v => Err(unexpected(&rows_path, "a list of keyed rows", v)),
        }))
    }

    fn union_decoder(
        &self,
        path: &FieldPath,
        src_types: &[ValueType],
        dst: &AnalyzedTypeInfo,
    ) -> Result<Decoder, DecodeError> {
        let owned_path = path.clone();
        if dst.is_any() {
            return Ok(make_decoder(move |value| match value {
                Value::Null => Ok(Value::Null),
                Value::Array(pair) if pair.len() == 2 => Ok(pair[1].clone()),
                v => Err(unexpected(&owned_path, "a [tag, value] pair", v)),
            }));
        }

        let dst_arms: Vec<AnalyzedTypeInfo> = match &dst.variant {
            AnalyzedVariant::Union(arms) => arms.iter().map(analyze_type_info).collect(),
            _ => vec![dst.clone()],
        };

        // Each engine variant binds to the first compatible declared arm.
        let mut decoders = Vec::with_capacity(src_types.len());
        for (idx, src_arm) in src_types.iter().enumerate() {
            let arm_path = path.child(&format!("[{idx}]"));
            let decoder = dst_arms
                .iter()
                .find_map(|dst_arm| self.value_decoder(&arm_path, src_arm, dst_arm, false).ok())
                .ok_or_else(|| {
                    mismatch(
                        &arm_path,
                        format!(
                            "cannot find matched target type for source type variant {}",
                            src_arm.kind()
                        ),
                    )
                })?;
            decoders.push(decoder);
        }

        Ok(make_decoder(move |value| match value {
            Value::Null => Ok(Value::Null),
            Value::Array(pair) if pair.len() == 2 => {
                let tag = pair[0]
                    .as_i64()
                    .map_err(|_| unexpected(&owned_path, "an integer union tag", &pair[0]))?;
                let decoder = usize::try_from(tag)
                    .ok()
                    .and_then(|idx| decoders.get(idx))
                    .ok_or_else(|| DecodeError::UnionTag {
                        path: owned_path.to_string(),
                        tag,
                    })?;
                decoder(&pair[1])
            }
            v => Err(unexpected(&owned_path, "a [tag, value] pair", v)),
        }))
    }

    // A plain engine value declared as a union binds to the first compatible arm.
    fn union_arm_decoder(
        &self,
        path: &FieldPath,
        src: &ValueType,
        dst: &AnalyzedTypeInfo,
        arms: &[TypeDesc],
    ) -> Result<Decoder, DecodeError> {
        let decoder = arms
            .iter()
            .find_map(|arm| {
                self.value_decoder(path, src, &analyze_type_info(arm), false)
                    .ok()
            })
            .ok_or_else(|| {
                mismatch(
                    path,
                    format!("passed in {}, declared {}", src.kind(), dst.core_type),
                )
            })?;
        let path = path.clone();
        let nullable = dst.nullable;
        Ok(make_decoder(move |value| match value {
            Value::Null if nullable => Ok(Value::Null),
            Value::Null => Err(DecodeError::NullNotAllowed {
                path: path.to_string(),
                what: "scalar",
            }),
            v => decoder(v),
        }))
    }

    fn vector_decoder(
        &self,
        path: &FieldPath,
        element_type: &ValueType,
        dst: &AnalyzedTypeInfo,
    ) -> Result<Decoder, DecodeError> {
        let AnalyzedVariant::List { elem, vector } = &dst.variant else {
            return Err(mismatch(
                path,
                format!("declared `{}`, a list type expected", dst.core_type),
            ));
        };
        let expected_dim = vector.and_then(|v| v.dim);

        let elem_decode = if matches!(dst.base_type, TypeDesc::NdArray(_)) {
            match analyze_type_info(elem).variant {
                AnalyzedVariant::Basic(kind) if kind.is_numeric() => ElementDecode::Coerce(kind),
                _ => ElementDecode::Raw,
            }
        } else {
            ElementDecode::Decode(self.value_decoder(
                &path.child("[*]"),
                element_type,
                &analyze_type_info(elem),
                false,
            )?)
        };

        let path = path.clone();
        let nullable = dst.nullable;
        Ok(make_decoder(move |value| match value {
            Value::Null if nullable => Ok(Value::Null),
            Value::Null => Err(DecodeError::NullNotAllowed {
                path: path.to_string(),
                what: "vector",
            }),
            Value::Array(items) => {
                if let Some(dim) = expected_dim {
                    if items.len() != dim {
                        return Err(DecodeError::DimensionMismatch {
                            path: path.to_string(),
                            expected: dim,
                            actual: items.len(),
                        });
                    }
                }
                let decoded = match &elem_decode {
                    ElementDecode::Coerce(kind) => items
                        .iter()
                        .map(|v| coerce_numeric(*kind, v).ok_or_else(|| unexpected(&path, "a number", v)))
                        .collect::<Result<Vec<_>, _>>()?,
                    ElementDecode::Decode(decoder) => {
                        items.iter().map(|v| decoder(v)).collect::<Result<Vec<_>, _>>()?
                    }
                    ElementDecode::Raw => return Ok(value.clone()),
                };
                Ok(Value::from(decoded))
            }
            v => Err(unexpected(&path, "a list for vector", v)),
        }))
    }

    fn row_decoder(
        &self,
        path: &FieldPath,
        src_fields: &[FieldSchema],
        dst: &AnalyzedTypeInfo,
        for_key: bool,
    ) -> Result<RowDecoder, DecodeError> {
        match &dst.variant {
            AnalyzedVariant::Any if for_key => return self.tuple_row_decoder(path, src_fields),
            AnalyzedVariant::Any => return self.dict_row_decoder(path, src_fields, &TypeDesc::Any),
            AnalyzedVariant::Dict { key, value } => {
                let key_info = analyze_type_info(key);
                if key_info.is_any() || key_info.variant == AnalyzedVariant::Basic(BasicKind::Str)
                {
                    return self.dict_row_decoder(path, src_fields, value);
                }
            }
            _ => {}
        }

        let AnalyzedVariant::Struct(st) = &dst.variant else {
            return Err(mismatch(
                path,
                format!(
                    "declared `{}`, a struct or dict[str, Any] expected",
                    dst.core_type
                ),
            ));
        };

        let mut field_decoders: Vec<(Arc<str>, FieldDecoder)> = Vec::with_capacity(st.fields.len());
        for field in &st.fields {
            let field_path = path.child(&format!(".{}", field.name));
            let info = analyze_type_info(&field.ty);

            let decoder: FieldDecoder = match src_fields.iter().position(|f| f.name == *field.name) {
                Some(idx) => {
                    let decoder = self.value_decoder(
                        &field_path,
                        &src_fields[idx].value_type.typ,
                        &info,
                        for_key,
                    )?;
                    Box::new(move |row: &[Value]| decoder(&row[idx]))
                }
                None => match (&field.default, auto_default(&info)) {
                    (Some(default), _) => {
                        let default = default.clone();
                        Box::new(move |_: &[Value]| Ok(default.clone()))
                    }
                    (None, Some(auto)) if self.auto_default_missing_fields => {
                        log::warn!(
                            "Field '{}' (type {}) without default value is missing in input: {field_path}. Auto-assigning default value: {auto}",
                            field.name,
                            field.ty
                        );
                        Box::new(move |_: &[Value]| Ok(auto.clone()))
                    }
                    _ => {
                        return Err(DecodeError::MissingField {
                            path: field_path.to_string(),
                            field: field.name.to_string(),
                            ty: field.ty.to_string(),
                        })
                    }
                },
            };
            field_decoders.push((field.name.clone(), decoder));
        }

        let expected = src_fields.len();
        let name = st.name.clone();
        let path = path.clone();
        Ok(make_row_decoder(move |row| {
            check_field_count(&path, expected, row.len())?;
            let mut value = StructValue::new(name.clone());
            for (field_name, decoder) in &field_decoders {
                value.push(field_name.clone(), decoder(row)?);
            }
            Ok(value.into())
        }))
    }

    // Maps are ordered by key, so the engine's field order is not kept.
    fn dict_row_decoder(
        &self,
        path: &FieldPath,
        src_fields: &[FieldSchema],
        value_type: &TypeDesc,
    ) -> Result<RowDecoder, DecodeError> {
        let value_info = analyze_type_info(value_type);
        let field_decoders = src_fields
            .iter()
            .map(|f| {
                let decoder = self.value_decoder(
                    &path.child(&format!(".{}", f.name)),
                    &f.value_type.typ,
                    &value_info,
                    false,
                )?;
                Ok((Value::from(f.name.as_str()), decoder))
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let path = path.clone();
        Ok(make_row_decoder(move |row| {
            check_field_count(&path, field_decoders.len(), row.len())?;
            let mut map = BTreeMap::new();
            for ((name, decoder), value) in field_decoders.iter().zip(row) {
                map.insert(name.clone(), decoder(value)?);
            }
            Ok(Value::from(map))
        }))
    }

    fn tuple_row_decoder(
        &self,
        path: &FieldPath,
        src_fields: &[FieldSchema],
    ) -> Result<RowDecoder, DecodeError> {
        let any = analyze_type_info(&TypeDesc::Any);
        let field_decoders = src_fields
            .iter()
            .map(|f| {
                self.value_decoder(
                    &path.child(&format!(".{}", f.name)),
                    &f.value_type.typ,
                    &any,
                    false,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let path = path.clone();
        Ok(make_row_decoder(move |row| {
            check_field_count(&path, field_decoders.len(), row.len())?;
            field_decoders
                .iter()
                .zip(row)
                .map(|(decoder, value)| decoder(value))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::from)
        }))
    }
}

fn basic_decoder(
    path: &FieldPath,
    src: &ValueType,
    dst: &AnalyzedTypeInfo,
    kind: BasicKind,
) -> Result<Decoder, DecodeError> {
    let src_kind = src.basic_kind();
    if !src_kind.is_some_and(|s| is_kind_convertible(s, kind)) {
        return Err(mismatch(
            path,
            format!(
                "passed in {}, declared {} ({kind})",
                src.kind(),
                dst.core_type
            ),
        ));
    }

    if kind.is_numeric() {
        let path = path.clone();
        let nullable = dst.nullable;
        return Ok(make_decoder(move |value| match value {
            Value::Null if nullable => Ok(Value::Null),
            Value::Null => Err(DecodeError::NullNotAllowed {
                path: path.to_string(),
                what: "scalar",
            }),
            v => coerce_numeric(kind, v).ok_or_else(|| unexpected(&path, "a number", v)),
        }));
    }

    let path = path.clone();
    let nullable = dst.nullable;
    let from_local = src_kind == Some(BasicKind::LocalDateTime);
    Ok(make_decoder(move |value| match value {
        Value::Null if nullable => Ok(Value::Null),
        Value::Null => Err(DecodeError::NullNotAllowed {
            path: path.to_string(),
            what: "scalar",
        }),
        // Local timestamps are taken to be UTC.
        Value::LocalDateTime(dt) if from_local && kind == BasicKind::OffsetDateTime => {
            Ok(Value::OffsetDateTime(dt.and_utc().fixed_offset()))
        }
        v if holds_kind(kind, v) => Ok(v.clone()),
        v => Err(unexpected(&path, kind.as_str(), v)),
    }))
}

fn holds_kind(kind: BasicKind, value: &Value) -> bool {
    match (kind, value) {
        (BasicKind::Bool, Value::Bool(_))
        | (BasicKind::Str, Value::Str(_))
        | (BasicKind::Bytes, Value::Bytes(_))
        | (BasicKind::Uuid, Value::Uuid(_))
        | (BasicKind::Date, Value::Date(_))
        | (BasicKind::Time, Value::Time(_))
        | (BasicKind::LocalDateTime, Value::LocalDateTime(_))
        | (BasicKind::OffsetDateTime, Value::OffsetDateTime(_))
        | (BasicKind::TimeDelta, Value::TimeDelta(_)) => true,
        (BasicKind::Range, Value::Array(bounds)) => {
            matches!(bounds.as_slice(), [Value::Int64(_), Value::Int64(_)])
        }
        (BasicKind::Json, _) => true,
        _ => false,
    }
}

/// Convert a host value back into its engine encoding.
///
/// Structs become positional field arrays, and maps of structs become KTable rows
/// `[key, field...]`.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Struct(s) => Value::from(s.fields().map(|(_, v)| encode_value(v)).collect::<Vec<_>>()),
        Value::Array(items) => Value::from(items.iter().map(encode_value).collect::<Vec<_>>()),
        Value::Map(map) => match map.values().next() {
            Some(Value::Struct(_)) => Value::from(
                map.iter()
                    .map(|(k, v)| {
                        let mut row = vec![encode_value(k)];
                        if let Value::Struct(s) = v {
                            row.extend(s.fields().map(|(_, f)| encode_value(f)));
                        }
                        Value::from(row)
                    })
                    .collect::<Vec<_>>(),
            ),
            _ => value.clone(),
        },
        v => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    mod decode;
    mod encode;
}
