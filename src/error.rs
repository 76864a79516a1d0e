// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::convert::DecodeError;
use crate::op::BindingError;
use crate::registry::RegistryError;
use crate::schema::SchemaError;
use crate::target::ConnectorError;

/// Errors surfaced by the runtime and bound operators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    /// The engine supplied a spec that does not match the spec type.
    #[error("Invalid operator spec: {0}")]
    Spec(#[from] serde_json::Error),
    #[error("No {category} is registered for `{kind}`")]
    NotFound {
        category: &'static str,
        kind: String,
    },
    /// Preparation failed; every caller waiting on it sees the same failure.
    #[error("Failed to prepare operator: {0:#}")]
    Prepare(Arc<anyhow::Error>),
    /// An error returned by user code.
    #[error(transparent)]
    User(anyhow::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
