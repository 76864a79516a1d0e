// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]

/// Engine schemas and the encoder that produces them from host types.
///
/// The canonical wire shape of an enriched type is
///
/// {
///   "type": { "kind": "Int64" },
///   "attrs": { "cocoindex.io/chunk_base_text": ... },
///   "nullable": true
/// }
///
/// where `attrs` and `nullable` appear only when set, and only at the enriched level; they are
/// never nested inside the recursive kind structure. Composite kinds:
///
/// Struct
///     { "kind": "Struct", "fields": [ { "name": "a", "type": {...} }, ... ], "description": "..." }
///
/// Vector
///     { "kind": "Vector", "element_type": { "kind": "Float32" }, "dimension": 384 }
///     `dimension` is null when the vector length is unconstrained.
///
/// LTable (list of structs, rows addressed by position)
///     { "kind": "LTable", "row": { "fields": [...] } }
///
/// KTable (mapping to structs, rows addressed by key)
///     { "kind": "KTable", "row": { "fields": [ { "name": "_key", ... }, ... ] } }
///
/// Union
///     { "kind": "Union", "types": [ {...}, ... ] }
///
/// Schemas are plain serde types; the engine side parses them back with the same definitions.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::typing::{
    analyze_type_info, supported_dtypes, AnalyzedTypeInfo, AnalyzedVariant, BasicKind,
    StructType, TypeDesc,
};

mod error;

pub use error::SchemaError;

/// Name of the synthetic leading field carrying the key of a KTable row.
pub const KEY_FIELD_NAME: &str = "_key";

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedValueType {
    #[serde(rename = "type")]
    pub typ: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<IndexMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
}

impl EnrichedValueType {
    pub fn new(typ: ValueType) -> Self {
        Self {
            typ,
            attrs: None,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ValueType {
    Int64,
    Float32,
    Float64,
    Bool,
    Str,
    Bytes,
    Uuid,
    Date,
    Time,
    OffsetDateTime,
    LocalDateTime,
    TimeDelta,
    Range,
    Json,
    Struct(StructSchema),
    Vector(VectorTypeSchema),
    LTable(TableSchema),
    KTable(TableSchema),
    Union(UnionTypeSchema),
}

impl ValueType {
    pub fn kind(&self) -> &'static str {
        match self {
            ValueType::Int64 => "Int64",
            ValueType::Float32 => "Float32",
            ValueType::Float64 => "Float64",
            ValueType::Bool => "Bool",
            ValueType::Str => "Str",
            ValueType::Bytes => "Bytes",
            ValueType::Uuid => "Uuid",
            ValueType::Date => "Date",
            ValueType::Time => "Time",
            ValueType::OffsetDateTime => "OffsetDateTime",
            ValueType::LocalDateTime => "LocalDateTime",
            ValueType::TimeDelta => "TimeDelta",
            ValueType::Range => "Range",
            ValueType::Json => "Json",
            ValueType::Struct(_) => "Struct",
            ValueType::Vector(_) => "Vector",
            ValueType::LTable(_) => "LTable",
            ValueType::KTable(_) => "KTable",
            ValueType::Union(_) => "Union",
        }
    }

    /// The scalar kind, if this is not a composite type.
    pub fn basic_kind(&self) -> Option<BasicKind> {
        Some(match self {
            ValueType::Int64 => BasicKind::Int64,
            ValueType::Float32 => BasicKind::Float32,
            ValueType::Float64 => BasicKind::Float64,
            ValueType::Bool => BasicKind::Bool,
            ValueType::Str => BasicKind::Str,
            ValueType::Bytes => BasicKind::Bytes,
            ValueType::Uuid => BasicKind::Uuid,
            ValueType::Date => BasicKind::Date,
            ValueType::Time => BasicKind::Time,
            ValueType::OffsetDateTime => BasicKind::OffsetDateTime,
            ValueType::LocalDateTime => BasicKind::LocalDateTime,
            ValueType::TimeDelta => BasicKind::TimeDelta,
            ValueType::Range => BasicKind::Range,
            ValueType::Json => BasicKind::Json,
            _ => return None,
        })
    }

    pub fn struct_of(fields: Vec<FieldSchema>) -> ValueType {
        ValueType::Struct(StructSchema {
            fields,
            description: None,
        })
    }
}

impl From<BasicKind> for ValueType {
    fn from(kind: BasicKind) -> Self {
        match kind {
            BasicKind::Int64 => ValueType::Int64,
            BasicKind::Float32 => ValueType::Float32,
            BasicKind::Float64 => ValueType::Float64,
            BasicKind::Bool => ValueType::Bool,
            BasicKind::Str => ValueType::Str,
            BasicKind::Bytes => ValueType::Bytes,
            BasicKind::Uuid => ValueType::Uuid,
            BasicKind::Date => ValueType::Date,
            BasicKind::Time => ValueType::Time,
            BasicKind::OffsetDateTime => ValueType::OffsetDateTime,
            BasicKind::LocalDateTime => ValueType::LocalDateTime,
            BasicKind::TimeDelta => ValueType::TimeDelta,
            BasicKind::Range => ValueType::Range,
            BasicKind::Json => ValueType::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructSchema {
    pub fields: Vec<FieldSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(flatten)]
    pub value_type: EnrichedValueType,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, value_type: EnrichedValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorTypeSchema {
    pub element_type: Box<ValueType>,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub row: StructSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionTypeSchema {
    pub types: Vec<ValueType>,
}

/// Encode a host type into its enriched engine schema.
pub fn encode_enriched_type(t: &TypeDesc) -> Result<EnrichedValueType, SchemaError> {
    encode_enriched_type_info(&analyze_type_info(t))
}

pub fn encode_enriched_type_info(
    info: &AnalyzedTypeInfo,
) -> Result<EnrichedValueType, SchemaError> {
    Ok(EnrichedValueType {
        typ: encode_type(info)?,
        attrs: info.attrs.clone(),
        nullable: info.nullable,
    })
}

pub fn encode_type(info: &AnalyzedTypeInfo) -> Result<ValueType, SchemaError> {
    match &info.variant {
        AnalyzedVariant::Any => Err(SchemaError::AnyType),
        AnalyzedVariant::Unknown => Err(match &info.core_type {
            TypeDesc::Scalar(dtype) => SchemaError::UnsupportedDtype {
                dtype: dtype.to_string(),
                supported: supported_dtypes()
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            t => SchemaError::Unsupported(t.to_string()),
        }),
        AnalyzedVariant::Basic(kind) => Ok(ValueType::from(*kind)),
        AnalyzedVariant::Struct(st) => Ok(ValueType::Struct(encode_struct_schema(st, None)?)),
        AnalyzedVariant::List { elem, vector } => {
            let elem_info = analyze_type_info(elem);
            if let AnalyzedVariant::Struct(st) = &elem_info.variant {
                if vector.is_some() {
                    return Err(SchemaError::VectorTableConflict(info.core_type.to_string()));
                }
                return Ok(ValueType::LTable(TableSchema {
                    row: encode_struct_schema(st, None)?,
                }));
            }
            if matches!(info.base_type, TypeDesc::NdArray(_)) && elem_info.is_any() {
                return Err(SchemaError::UnspecifiedDtype(info.core_type.to_string()));
            }
            Ok(ValueType::Vector(VectorTypeSchema {
                element_type: Box::new(encode_type(&elem_info)?),
                dimension: vector.and_then(|v| v.dim),
            }))
        }
        AnalyzedVariant::Dict { key, value } => {
            let value_info = analyze_type_info(value);
            match &value_info.variant {
                AnalyzedVariant::Struct(st) => Ok(ValueType::KTable(TableSchema {
                    row: encode_struct_schema(st, Some(key))?,
                })),
                _ => Err(SchemaError::KTableValueNotStruct(
                    value_info.core_type.to_string(),
                )),
            }
        }
        AnalyzedVariant::Union(arms) => Ok(ValueType::Union(UnionTypeSchema {
            types: arms
                .iter()
                .map(|t| encode_type(&analyze_type_info(t)))
                .collect::<Result<_, _>>()?,
        })),
    }
}

/// Encode the fields of a struct in declaration order.
///
/// With `key_type`, a synthetic `_key` field is prepended, as used for KTable rows.
pub fn encode_struct_schema(
    st: &StructType,
    key_type: Option<&TypeDesc>,
) -> Result<StructSchema, SchemaError> {
    let encode_field = |name: &str, t: &TypeDesc| {
        encode_enriched_type(t)
            .map(|value_type| FieldSchema::new(name, value_type))
            .map_err(|e| SchemaError::Field {
                struct_name: st.name.to_string(),
                field: name.to_string(),
                source: Box::new(e),
            })
    };

    let mut fields = Vec::with_capacity(st.fields.len() + 1);
    if let Some(key_type) = key_type {
        fields.push(encode_field(KEY_FIELD_NAME, key_type)?);
    }
    for field in &st.fields {
        fields.push(encode_field(&field.name, &field.ty)?);
    }

    Ok(StructSchema {
        fields,
        description: st.doc.clone(),
    })
}

#[cfg(test)]
mod tests {
    mod encode;
}
