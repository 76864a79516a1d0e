// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Errors raised while building decoders or decoding engine values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The engine schema cannot be decoded into the declared type.
    #[error("Type mismatch for `{path}`: {detail}")]
    TypeMismatch { path: String, detail: String },
    /// A declared struct field has no counterpart in the engine schema and no default.
    #[error("Field '{field}' (type {ty}) without default value is missing in input: {path}")]
    MissingField {
        path: String,
        field: String,
        ty: String,
    },
    #[error("Received null for non-nullable {what} `{path}`")]
    NullNotAllowed { path: String, what: &'static str },
    #[error("Expected {expected} for `{path}`, got {actual}")]
    UnexpectedValue {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Vector dimension mismatch for `{path}`: expected {expected}, got {actual}")]
    DimensionMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("Field count mismatch for `{path}`: expected {expected}, got {actual}")]
    FieldCount {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("Union tag {tag} is out of range for `{path}`")]
    UnionTag { path: String, tag: i64 },
    /// Positional argument count differs from the analyzed call shape.
    #[error("Expected {expected} positional arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },
    /// A keyword argument that was not present at analyze time.
    #[error("Keyword argument `{0}` was not analyzed")]
    UnexpectedArgument(String),
}
