// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Errors raised while encoding host types into engine schemas.
///
/// These are definition-time errors: they surface to the code that declares an operator
/// or connector, never to a running pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// A concrete type is required at the engine boundary.
    #[error("Specific type annotation is expected")]
    AnyType,
    /// The type has no engine representation.
    #[error("Unsupported type annotation: {0}")]
    Unsupported(String),
    /// Numeric array element type outside the dtype table.
    #[error("Unsupported dtype in numeric array: {dtype}. Supported dtypes: {supported}")]
    UnsupportedDtype { dtype: String, supported: String },
    /// Numeric array without a concrete element type.
    #[error("Numeric array for vector must use a concrete dtype, got `{0}`")]
    UnspecifiedDtype(String),
    /// A list of structs annotated with vector info.
    #[error("LTable type must not have a vector info: {0}")]
    VectorTableConflict(String),
    /// A mapping whose value type is not a struct.
    #[error("KTable value must have a Struct type, got {0}")]
    KTableValueNotStruct(String),
    /// A struct field failed to encode.
    #[error("Failed to encode annotation for field - {struct_name}.{field}: {source}")]
    Field {
        struct_name: String,
        field: String,
        source: Box<SchemaError>,
    },
    /// Malformed mutation type declared by a target connector.
    #[error(
        "Mutation type of {connector} must be a tuple with 2 elements (spec and dict of value structs), got {declared}"
    )]
    InvalidMutationType { connector: String, declared: String },
}
