// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Operator definitions: specs, signatures and executors.
//
// An operator is defined by a spec type (its immutable user configuration) and an executor
// implementing the operator's behavior. Executors declare their call signature as an explicit
// table of parameters; `OperatorBinder` matches that table against the argument schemas
// supplied by the engine and produces a `BoundOperator` the engine invokes.

use core::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::schema::EnrichedValueType;
use crate::typing::TypeDesc;
use crate::value::Value;

mod binder;
mod error;
mod gate;

pub use binder::{BoundOperator, OperatorBinder};
pub use error::BindingError;
pub use gate::ExclusiveGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpCategory {
    Function,
    Source,
    Target,
    Declaration,
}

impl fmt::Display for OpCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            OpCategory::Function => "function",
            OpCategory::Source => "source",
            OpCategory::Target => "target",
            OpCategory::Declaration => "declaration",
        })
    }
}

/// Immutable configuration of an operator instance.
///
/// Specs travel to and from the engine as JSON objects.
pub trait OpSpec: Serialize + DeserializeOwned + Send + Sync + 'static {
    const CATEGORY: OpCategory;
    /// Name the engine knows this kind of operator by.
    const KIND: &'static str;
}

pub fn load_spec<S: OpSpec>(spec: &serde_json::Value) -> Result<S, serde_json::Error> {
    S::deserialize(spec)
}

/// Serialize a spec for the engine. Null members are dropped.
pub fn dump_spec<S: OpSpec>(spec: &S) -> Result<serde_json::Value, serde_json::Error> {
    fn drop_nulls(value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k, drop_nulls(v)))
                    .collect(),
            ),
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(drop_nulls).collect())
            }
            v => v,
        }
    }
    Ok(drop_nulls(serde_json::to_value(spec)?))
}

pub const ATTR_PREFIX: &str = "cocoindex.io/";

/// Relationship between an input argument and the operator's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgRelationship {
    EmbeddingOriginText,
    #[serde(rename = "chunk_base_text")]
    ChunksBaseText,
    RectsBaseImage,
}

impl ArgRelationship {
    /// Attribute key under which the related argument's analyzed value is recorded.
    pub fn attr_key(&self) -> String {
        let name = match self {
            ArgRelationship::EmbeddingOriginText => "embedding_origin_text",
            ArgRelationship::ChunksBaseText => "chunk_base_text",
            ArgRelationship::RectsBaseImage => "rects_base_image",
        };
        format!("{ATTR_PREFIX}{name}")
    }
}

/// Per-operator options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpArgs {
    /// Serialize invocations through the runtime's exclusive gate.
    #[serde(alias = "gpu")]
    pub exclusive: bool,
    /// Let the engine cache results.
    pub cache: bool,
    /// Cached results are invalidated when this changes.
    pub behavior_version: Option<i64>,
    /// The output relates to the argument with the given name.
    pub arg_relationship: Option<(ArgRelationship, String)>,
}

impl OpArgs {
    pub fn with_exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn with_cache(mut self, behavior_version: Option<i64>) -> Self {
        self.cache = true;
        self.behavior_version = behavior_version;
        self
    }

    pub fn with_arg_relationship(
        mut self,
        relationship: ArgRelationship,
        arg_name: impl Into<String>,
    ) -> Self {
        self.arg_relationship = Some((relationship, arg_name.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub ty: TypeDesc,
    pub default: Option<Value>,
}

impl Param {
    fn with_kind(name: impl Into<String>, kind: ParamKind, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            default: None,
        }
    }

    /// A parameter that binds by position or by name.
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::with_kind(name, ParamKind::PositionalOrKeyword, ty)
    }

    pub fn positional_only(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::with_kind(name, ParamKind::PositionalOnly, ty)
    }

    pub fn keyword_only(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::with_kind(name, ParamKind::KeywordOnly, ty)
    }

    pub fn var_positional(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::with_kind(name, ParamKind::VarPositional, ty)
    }

    pub fn var_keyword(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::with_kind(name, ParamKind::VarKeyword, ty)
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self.kind, ParamKind::VarPositional | ParamKind::VarKeyword)
    }
}

/// Declared call signature of an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Param>,
    pub returns: TypeDesc,
}

impl Default for Signature {
    fn default() -> Self {
        Self::new()
    }
}

impl Signature {
    pub fn new() -> Self {
        Self {
            params: vec![],
            returns: TypeDesc::Missing,
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, ty: TypeDesc) -> Self {
        self.returns = ty;
        self
    }
}

/// Schema of one argument supplied by the engine at analyze time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSchema {
    pub value_type: EnrichedValueType,
    /// Engine-side description of the argument's origin, used for provenance attributes.
    #[serde(default)]
    pub analyzed_value: serde_json::Value,
}

impl ArgSchema {
    pub fn new(value_type: EnrichedValueType) -> Self {
        Self {
            value_type,
            analyzed_value: serde_json::Value::Null,
        }
    }

    pub fn with_analyzed_value(mut self, analyzed_value: serde_json::Value) -> Self {
        self.analyzed_value = analyzed_value;
        self
    }
}

/// Decoded arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: IndexMap<String, Value>,
    rest: Vec<Value>,
    extra: IndexMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn push_rest(&mut self, value: Value) {
        self.rest.push(value);
    }

    pub fn insert_extra(&mut self, name: impl Into<String>, value: Value) {
        self.extra.insert(name.into(), value);
    }

    /// Value of a declared parameter, including defaults of unbound optional parameters.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| anyhow!("missing argument `{name}`"))
    }

    /// Declared parameter values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Positional values bound to the variadic positional parameter.
    pub fn rest(&self) -> &[Value] {
        &self.rest
    }

    /// Keyword values bound to the variadic keyword parameter.
    pub fn extra(&self) -> &IndexMap<String, Value> {
        &self.extra
    }
}

/// An asynchronous operator implementation.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    fn signature(&self) -> Signature;

    /// Result type for the given argument schemas.
    ///
    /// Returning `Some` overrides the declared return type, e.g. when a vector dimension
    /// depends on the spec.
    fn analyze(
        &self,
        _args: &[ArgSchema],
        _kwargs: &IndexMap<String, ArgSchema>,
    ) -> Result<Option<TypeDesc>> {
        Ok(None)
    }

    /// Called once after analysis and before the first invocation.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    async fn invoke(&self, args: Args) -> Result<Value>;
}

/// A synchronous operator implementation. Wrap it in [`Blocking`] to use it as an [`Executor`].
pub trait BlockingExecutor: Send + Sync + 'static {
    fn signature(&self) -> Signature;

    fn analyze(
        &self,
        _args: &[ArgSchema],
        _kwargs: &IndexMap<String, ArgSchema>,
    ) -> Result<Option<TypeDesc>> {
        Ok(None)
    }

    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn invoke(&self, args: Args) -> Result<Value>;
}

/// Runs a [`BlockingExecutor`] on tokio's blocking thread pool.
pub struct Blocking<E>(Arc<E>);

impl<E: BlockingExecutor> Blocking<E> {
    pub fn new(executor: E) -> Self {
        Self(Arc::new(executor))
    }
}

#[async_trait]
impl<E: BlockingExecutor> Executor for Blocking<E> {
    fn signature(&self) -> Signature {
        self.0.signature()
    }

    fn analyze(
        &self,
        args: &[ArgSchema],
        kwargs: &IndexMap<String, ArgSchema>,
    ) -> Result<Option<TypeDesc>> {
        self.0.analyze(args, kwargs)
    }

    async fn prepare(&self) -> Result<()> {
        let executor = self.0.clone();
        tokio::task::spawn_blocking(move || executor.prepare()).await?
    }

    async fn invoke(&self, args: Args) -> Result<Value> {
        let executor = self.0.clone();
        tokio::task::spawn_blocking(move || executor.invoke(args)).await?
    }
}

/// Function-style operator: a plain closure plus its declared signature.
pub struct FnExecutor<F> {
    signature: Signature,
    f: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(Args) -> Result<Value> + Send + Sync + 'static,
{
    pub fn new(signature: Signature, f: F) -> Self {
        Self { signature, f }
    }
}

impl<F> BlockingExecutor for FnExecutor<F>
where
    F: Fn(Args) -> Result<Value> + Send + Sync + 'static,
{
    fn signature(&self) -> Signature {
        self.signature.clone()
    }

    fn invoke(&self, args: Args) -> Result<Value> {
        (self.f)(args)
    }
}

#[cfg(test)]
mod tests {
    mod bind;
    mod invoke;
}
