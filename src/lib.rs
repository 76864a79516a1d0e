// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

pub mod config;
pub mod convert;
mod error;
pub mod op;
pub mod registry;
mod runtime;
pub mod schema;
pub mod target;
pub mod typing;
mod value;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use op::{
    ArgRelationship, ArgSchema, Args, Blocking, BlockingExecutor, BoundOperator, Executor,
    FnExecutor, OpArgs, OpCategory, OpSpec, OperatorBinder, Param, ParamKind, Signature,
};
pub use runtime::{to_camel_case, FunctionFactory, Runtime};
pub use schema::{encode_enriched_type, EnrichedValueType, ValueType};
pub use target::{ExportContext, ExportTarget, Mutation, SetupChange, TargetConnector};
pub use typing::{analyze_type_info, StructType, TypeDesc};
pub use value::{StructValue, Value};
