// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Host type descriptors and their classification.
//
// A `TypeDesc` is the host-side description of a value's type, as declared by operator
// authors on parameters, return values and struct fields. Annotation layers attach a kind
// override, vector dimension info or free-form attributes to a type:
//
//     TypeDesc::Float.with_kind(BasicKind::Float32)            // a float stored as Float32
//     TypeDesc::vector(TypeDesc::Scalar(Dtype::Float32), Some(384))
//     TypeDesc::Str.with_attr("cocoindex.io/source", json!("x"))
//
// `analyze_type_info` peels annotation layers and classifies the bare type into exactly
// one `AnalyzedVariant`. Classification never fails; types that cannot cross the engine
// boundary surface as `AnalyzedVariant::Unknown` and are rejected by the schema encoder.

use core::fmt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Scalar kinds understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BasicKind {
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
}

impl BasicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasicKind::Int64 => "Int64",
            BasicKind::Float32 => "Float32",
            BasicKind::Float64 => "Float64",
            BasicKind::Bool => "Bool",
            BasicKind::Str => "Str",
            BasicKind::Bytes => "Bytes",
            BasicKind::Uuid => "Uuid",
            BasicKind::Date => "Date",
            BasicKind::Time => "Time",
            BasicKind::OffsetDateTime => "OffsetDateTime",
            BasicKind::LocalDateTime => "LocalDateTime",
            BasicKind::TimeDelta => "TimeDelta",
            BasicKind::Range => "Range",
            BasicKind::Json => "Json",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            BasicKind::Int64 | BasicKind::Float32 | BasicKind::Float64
        )
    }
}

impl fmt::Display for BasicKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element types of numeric arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dtype {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Dtype::Int8 => "int8",
            Dtype::Int16 => "int16",
            Dtype::Int32 => "int32",
            Dtype::Int64 => "int64",
            Dtype::UInt8 => "uint8",
            Dtype::UInt16 => "uint16",
            Dtype::UInt32 => "uint32",
            Dtype::UInt64 => "uint64",
            Dtype::Float16 => "float16",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
        };
        f.write_str(s)
    }
}

lazy_static! {
    static ref DTYPE_KINDS: HashMap<Dtype, BasicKind> = [
        (Dtype::Float32, BasicKind::Float32),
        (Dtype::Float64, BasicKind::Float64),
        (Dtype::Int64, BasicKind::Int64),
    ]
    .into_iter()
    .collect();
}

/// Engine kind of a numeric array element type, if the dtype is supported.
pub fn dtype_kind(dtype: Dtype) -> Option<BasicKind> {
    DTYPE_KINDS.get(&dtype).copied()
}

pub fn supported_dtypes() -> Vec<Dtype> {
    let mut dtypes: Vec<Dtype> = DTYPE_KINDS.keys().copied().collect();
    dtypes.sort();
    dtypes
}

/// Marks a list as an embedding vector, optionally with a fixed dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VectorInfo {
    pub dim: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Kind(BasicKind),
    Vector(VectorInfo),
    Attr(String, serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: Arc<str>,
    pub ty: TypeDesc,
    pub default: Option<Value>,
}

/// A record type with named, ordered, typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub name: Arc<str>,
    pub doc: Option<String>,
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            fields: vec![],
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn field(mut self, name: impl Into<Arc<str>>, ty: TypeDesc) -> Self {
        self.fields.push(StructField {
            name: name.into(),
            ty,
            default: None,
        });
        self
    }

    pub fn field_with_default(
        mut self,
        name: impl Into<Arc<str>>,
        ty: TypeDesc,
        default: impl Into<Value>,
    ) -> Self {
        self.fields.push(StructField {
            name: name.into(),
            ty,
            default: Some(default.into()),
        });
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name.as_ref() == name)
    }

    pub fn build(self) -> TypeDesc {
        TypeDesc::Struct(Arc::new(self))
    }
}

/// Host type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    /// Matches any type.
    Any,
    /// No type was declared.
    Missing,
    /// The null type.
    None,

    Bytes,
    Str,
    Bool,
    Int,
    Float,
    Uuid,
    Date,
    Time,
    DateTime,
    TimeDelta,

    /// Numeric array element scalar.
    Scalar(Dtype),
    /// Numeric array; `None` when the element type is unspecified.
    NdArray(Option<Box<TypeDesc>>),
    Sequence(Option<Box<TypeDesc>>),
    Tuple(Vec<TypeDesc>),
    Mapping(Option<Box<(TypeDesc, TypeDesc)>>),
    Union(Vec<TypeDesc>),
    Struct(Arc<StructType>),
    /// A host type with no engine representation.
    Opaque(Arc<str>),

    Annotated(Box<TypeDesc>, Vec<Annotation>),
}

impl TypeDesc {
    pub fn list_of(elem: TypeDesc) -> TypeDesc {
        TypeDesc::Sequence(Some(Box::new(elem)))
    }

    pub fn dict_of(key: TypeDesc, value: TypeDesc) -> TypeDesc {
        TypeDesc::Mapping(Some(Box::new((key, value))))
    }

    pub fn ndarray_of(elem: TypeDesc) -> TypeDesc {
        TypeDesc::NdArray(Some(Box::new(elem)))
    }

    pub fn int64() -> TypeDesc {
        TypeDesc::Int.with_kind(BasicKind::Int64)
    }

    pub fn float32() -> TypeDesc {
        TypeDesc::Float.with_kind(BasicKind::Float32)
    }

    pub fn float64() -> TypeDesc {
        TypeDesc::Float.with_kind(BasicKind::Float64)
    }

    pub fn range() -> TypeDesc {
        TypeDesc::Tuple(vec![TypeDesc::Int, TypeDesc::Int]).with_kind(BasicKind::Range)
    }

    pub fn json() -> TypeDesc {
        TypeDesc::Any.with_kind(BasicKind::Json)
    }

    pub fn local_date_time() -> TypeDesc {
        TypeDesc::DateTime.with_kind(BasicKind::LocalDateTime)
    }

    pub fn offset_date_time() -> TypeDesc {
        TypeDesc::DateTime.with_kind(BasicKind::OffsetDateTime)
    }

    /// An embedding vector of `elem`. Numeric dtypes become numeric arrays, anything else a list.
    pub fn vector(elem: TypeDesc, dim: Option<usize>) -> TypeDesc {
        let list = match elem.base() {
            TypeDesc::Scalar(_) | TypeDesc::NdArray(_) => TypeDesc::ndarray_of(elem),
            _ => TypeDesc::list_of(elem),
        };
        list.annotate(Annotation::Vector(VectorInfo { dim }))
    }

    pub fn optional(self) -> TypeDesc {
        TypeDesc::Union(vec![self, TypeDesc::None])
    }

    pub fn annotate(self, annotation: Annotation) -> TypeDesc {
        TypeDesc::Annotated(Box::new(self), vec![annotation])
    }

    pub fn with_kind(self, kind: BasicKind) -> TypeDesc {
        self.annotate(Annotation::Kind(kind))
    }

    pub fn with_attr(self, key: impl Into<String>, value: serde_json::Value) -> TypeDesc {
        self.annotate(Annotation::Attr(key.into(), value))
    }

    /// The type with annotation layers removed.
    pub fn core(&self) -> &TypeDesc {
        let mut t = self;
        while let TypeDesc::Annotated(inner, _) = t {
            t = inner;
        }
        t
    }

    /// The core type with generic parameters removed.
    pub fn base(&self) -> TypeDesc {
        match self.core() {
            TypeDesc::NdArray(_) => TypeDesc::NdArray(None),
            TypeDesc::Sequence(_) => TypeDesc::Sequence(None),
            TypeDesc::Tuple(_) => TypeDesc::Tuple(vec![]),
            TypeDesc::Mapping(_) => TypeDesc::Mapping(None),
            TypeDesc::Union(_) => TypeDesc::Union(vec![]),
            t => t.clone(),
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn join(f: &mut fmt::Formatter, items: &[TypeDesc], sep: &str) -> fmt::Result {
            for (idx, t) in items.iter().enumerate() {
                if idx > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{t}")?;
            }
            Ok(())
        }

        match self {
            TypeDesc::Any => f.write_str("Any"),
            TypeDesc::Missing => f.write_str("<missing>"),
            TypeDesc::None => f.write_str("None"),
            TypeDesc::Bytes => f.write_str("bytes"),
            TypeDesc::Str => f.write_str("str"),
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::Int => f.write_str("int"),
            TypeDesc::Float => f.write_str("float"),
            TypeDesc::Uuid => f.write_str("uuid"),
            TypeDesc::Date => f.write_str("date"),
            TypeDesc::Time => f.write_str("time"),
            TypeDesc::DateTime => f.write_str("datetime"),
            TypeDesc::TimeDelta => f.write_str("timedelta"),
            TypeDesc::Scalar(d) => write!(f, "{d}"),
            TypeDesc::NdArray(None) => f.write_str("ndarray"),
            TypeDesc::NdArray(Some(e)) => write!(f, "ndarray[{e}]"),
            TypeDesc::Sequence(None) => f.write_str("list"),
            TypeDesc::Sequence(Some(e)) => write!(f, "list[{e}]"),
            TypeDesc::Tuple(items) => {
                f.write_str("tuple[")?;
                join(f, items, ", ")?;
                f.write_str("]")
            }
            TypeDesc::Mapping(None) => f.write_str("dict"),
            TypeDesc::Mapping(Some(kv)) => write!(f, "dict[{}, {}]", kv.0, kv.1),
            TypeDesc::Union(arms) => join(f, arms, " | "),
            TypeDesc::Struct(st) => f.write_str(&st.name),
            TypeDesc::Opaque(name) => f.write_str(name),
            TypeDesc::Annotated(inner, _) => write!(f, "{inner}"),
        }
    }
}

/// Rust types that describe themselves as host type descriptors.
pub trait Describe {
    fn describe() -> TypeDesc;
}

pub fn describe<T: Describe>() -> TypeDesc {
    T::describe()
}

macro_rules! describe_as {
    ($($t:ty => $desc:expr),* $(,)?) => {
        $(
            impl Describe for $t {
                fn describe() -> TypeDesc {
                    $desc
                }
            }
        )*
    };
}

describe_as! {
    i64 => TypeDesc::Int,
    f64 => TypeDesc::Float,
    f32 => TypeDesc::Scalar(Dtype::Float32),
    i32 => TypeDesc::Scalar(Dtype::Int32),
    u8 => TypeDesc::Scalar(Dtype::UInt8),
    bool => TypeDesc::Bool,
    String => TypeDesc::Str,
    Arc<str> => TypeDesc::Str,
    Uuid => TypeDesc::Uuid,
    NaiveDate => TypeDesc::Date,
    NaiveTime => TypeDesc::Time,
    NaiveDateTime => TypeDesc::local_date_time(),
    DateTime<FixedOffset> => TypeDesc::DateTime,
    TimeDelta => TypeDesc::TimeDelta,
    serde_json::Value => TypeDesc::json(),
    Value => TypeDesc::Any,
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDesc {
        T::describe().optional()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::list_of(T::describe())
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn describe() -> TypeDesc {
        TypeDesc::dict_of(K::describe(), V::describe())
    }
}

impl<K: Describe, V: Describe, S> Describe for HashMap<K, V, S> {
    fn describe() -> TypeDesc {
        TypeDesc::dict_of(K::describe(), V::describe())
    }
}

impl<K: Describe, V: Describe, S> Describe for IndexMap<K, V, S> {
    fn describe() -> TypeDesc {
        TypeDesc::dict_of(K::describe(), V::describe())
    }
}

impl<A: Describe, B: Describe> Describe for (A, B) {
    fn describe() -> TypeDesc {
        TypeDesc::Tuple(vec![A::describe(), B::describe()])
    }
}

impl<A: Describe, B: Describe, C: Describe> Describe for (A, B, C) {
    fn describe() -> TypeDesc {
        TypeDesc::Tuple(vec![A::describe(), B::describe(), C::describe()])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzedVariant {
    Any,
    Basic(BasicKind),
    List {
        elem: TypeDesc,
        vector: Option<VectorInfo>,
    },
    Struct(Arc<StructType>),
    Union(Vec<TypeDesc>),
    Dict {
        key: TypeDesc,
        value: TypeDesc,
    },
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedTypeInfo {
    /// The type without annotations.
    pub core_type: TypeDesc,
    /// The core type without generic parameters.
    pub base_type: TypeDesc,
    pub variant: AnalyzedVariant,
    pub attrs: Option<IndexMap<String, serde_json::Value>>,
    pub nullable: bool,
}

impl AnalyzedTypeInfo {
    pub fn is_any(&self) -> bool {
        matches!(self.variant, AnalyzedVariant::Any)
    }
}

fn flatten_union<'a>(arms: &'a [TypeDesc], out: &mut Vec<&'a TypeDesc>) {
    for arm in arms {
        match arm {
            TypeDesc::Union(inner) => flatten_union(inner, out),
            _ if out.contains(&arm) => {}
            _ => out.push(arm),
        }
    }
}

pub fn analyze_type_info(t: &TypeDesc) -> AnalyzedTypeInfo {
    // Outer layers are applied last so that they override inner ones.
    let mut layers = vec![];
    let mut core = t;
    while let TypeDesc::Annotated(inner, annotations) = core {
        layers.push(annotations.as_slice());
        core = inner;
    }

    let mut attrs: Option<IndexMap<String, serde_json::Value>> = None;
    let mut vector = None;
    let mut kind = None;
    for annotation in layers.iter().rev().flat_map(|a| a.iter()) {
        match annotation {
            Annotation::Kind(k) => kind = Some(*k),
            Annotation::Vector(v) => vector = Some(*v),
            Annotation::Attr(key, value) => {
                attrs
                    .get_or_insert_with(IndexMap::new)
                    .insert(key.clone(), value.clone());
            }
        }
    }

    let variant = match (kind, core) {
        (Some(kind), _) => AnalyzedVariant::Basic(kind),
        (_, TypeDesc::Any | TypeDesc::Missing) => AnalyzedVariant::Any,
        (_, TypeDesc::Struct(st)) => AnalyzedVariant::Struct(st.clone()),
        (_, TypeDesc::Scalar(dtype)) => match dtype_kind(*dtype) {
            Some(kind) => AnalyzedVariant::Basic(kind),
            None => AnalyzedVariant::Unknown,
        },
        (_, TypeDesc::Sequence(elem) | TypeDesc::NdArray(elem)) => AnalyzedVariant::List {
            elem: elem.as_deref().cloned().unwrap_or(TypeDesc::Any),
            vector,
        },
        (_, TypeDesc::Mapping(kv)) => match kv.as_deref() {
            Some((key, value)) => AnalyzedVariant::Dict {
                key: key.clone(),
                value: value.clone(),
            },
            None => AnalyzedVariant::Dict {
                key: TypeDesc::Any,
                value: TypeDesc::Any,
            },
        },
        (_, TypeDesc::Union(arms)) => {
            let mut flat = vec![];
            flatten_union(arms, &mut flat);
            let non_null: Vec<&TypeDesc> = flat
                .iter()
                .copied()
                .filter(|a| **a != TypeDesc::None)
                .collect();

            // A union of only nulls is the null type itself.
            if non_null.is_empty() {
                return analyze_type_info(&TypeDesc::None);
            }

            let nullable = non_null.len() < flat.len();
            if let [single] = non_null.as_slice() {
                let mut result = analyze_type_info(single);
                result.nullable |= nullable;
                if let Some(outer) = attrs {
                    result.attrs.get_or_insert_with(IndexMap::new).extend(outer);
                }
                return result;
            }
            return AnalyzedTypeInfo {
                core_type: core.clone(),
                base_type: core.base(),
                variant: AnalyzedVariant::Union(non_null.into_iter().cloned().collect()),
                attrs,
                nullable,
            };
        }
        (_, TypeDesc::Bytes) => AnalyzedVariant::Basic(BasicKind::Bytes),
        (_, TypeDesc::Str) => AnalyzedVariant::Basic(BasicKind::Str),
        (_, TypeDesc::Bool) => AnalyzedVariant::Basic(BasicKind::Bool),
        (_, TypeDesc::Int) => AnalyzedVariant::Basic(BasicKind::Int64),
        (_, TypeDesc::Float) => AnalyzedVariant::Basic(BasicKind::Float64),
        (_, TypeDesc::Uuid) => AnalyzedVariant::Basic(BasicKind::Uuid),
        (_, TypeDesc::Date) => AnalyzedVariant::Basic(BasicKind::Date),
        (_, TypeDesc::Time) => AnalyzedVariant::Basic(BasicKind::Time),
        (_, TypeDesc::DateTime) => AnalyzedVariant::Basic(BasicKind::OffsetDateTime),
        (_, TypeDesc::TimeDelta) => AnalyzedVariant::Basic(BasicKind::TimeDelta),
        (_, TypeDesc::None | TypeDesc::Tuple(_) | TypeDesc::Opaque(_)) => {
            AnalyzedVariant::Unknown
        }
        (_, TypeDesc::Annotated(..)) => AnalyzedVariant::Unknown,
    };

    AnalyzedTypeInfo {
        core_type: core.clone(),
        base_type: core.base(),
        variant,
        attrs,
        nullable: false,
    }
}

#[cfg(test)]
mod tests {
    mod analyze;
}
