// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::OpCategory;

/// Signature and argument mismatches found while binding an operator to a call site.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("Too many positional arguments passed in: {passed} > {accepted}")]
    TooManyPositional { passed: usize, accepted: usize },
    #[error("Unexpected keyword argument passed in: {0}")]
    UnexpectedKeyword(String),
    /// All required parameters left unbound, in declaration order.
    #[error("Missing arguments: {}", .0.join(", "))]
    MissingArguments(Vec<String>),
    #[error("Unsupported executor category `{category}` for `{kind}`")]
    UnsupportedCategory { kind: String, category: OpCategory },
}
