// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Target connectors: user code that owns an external store rows are exported to.
//
// A connector is written against its own spec type and host value types. `TargetConnectorBinder`
// adapts it to the engine-facing `ExportTarget` contract, which speaks JSON specs and
// engine-encoded rows.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use indexmap::IndexMap;

use crate::config::RuntimeConfig;
use crate::convert::{Decoder, DecoderBuilder, FieldPath};
use crate::error::{Error, Result};
use crate::op::{load_spec, BindingError, OpCategory, OpSpec};
use crate::schema::{FieldSchema, SchemaError, ValueType};
use crate::typing::{analyze_type_info, AnalyzedVariant, TypeDesc};
use crate::value::Value;

mod error;

pub use error::ConnectorError;

/// Decoded mutations of one export target: key to new value, `None` deleting the key.
pub type Mutation = IndexMap<Value, Option<Value>>;

/// A user-implemented target connector.
#[async_trait]
pub trait TargetConnector: Send + Sync + 'static {
    type Spec: OpSpec + Clone;

    /// Declared type of one `mutate` entry, `tuple[Spec, dict[Key, Value]]`.
    ///
    /// `None` leaves keys and values undecoded beyond their engine structure.
    fn mutation_type(&self) -> Option<TypeDesc> {
        None
    }

    /// Identifies the external resource backing a target, stable across spec edits.
    fn get_persistent_key(&self, spec: &Self::Spec, target_name: &str) -> AnyResult<Value>;

    /// Human readable name of a resource key.
    fn describe(&self, _key: &Value) -> Option<String> {
        None
    }

    /// Derive the spec used for mutations, e.g. by resolving connection settings.
    fn prepare(&self, spec: &Self::Spec) -> AnyResult<Self::Spec> {
        Ok(spec.clone())
    }

    /// Move the resource at `key` from `previous` to `current`. `None` means absent.
    async fn apply_setup_change(
        &self,
        key: &Value,
        previous: Option<Self::Spec>,
        current: Option<Self::Spec>,
    ) -> AnyResult<()>;

    async fn mutate(&self, mutations: Vec<(Self::Spec, Mutation)>) -> AnyResult<()>;
}

/// One resource whose setup changed.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupChange {
    pub key: Value,
    /// Specs the resource may currently have; `None` where it may not exist.
    pub previous: Vec<Option<serde_json::Value>>,
    pub current: Option<serde_json::Value>,
}

/// Per-target state created once when an export target is set up.
pub struct ExportContext {
    target_name: String,
    state: Arc<dyn Any + Send + Sync>,
    key_decoder: Decoder,
    value_decoder: Decoder,
}

impl ExportContext {
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    fn decode(&self, key: &Value, value: Option<&Value>) -> Result<(Value, Option<Value>)> {
        let key = (self.key_decoder)(key)?;
        let value = value.map(|v| (self.value_decoder)(v)).transpose()?;
        Ok((key, value))
    }
}

impl fmt::Debug for ExportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportContext")
            .field("target_name", &self.target_name)
            .finish_non_exhaustive()
    }
}

struct ContextState<S> {
    spec: S,
    prepared_spec: S,
}

/// Engine-facing contract of a target connector.
#[async_trait]
pub trait ExportTarget: Send + Sync + 'static {
    fn kind(&self) -> &'static str;

    fn create_export_context(
        &self,
        name: &str,
        spec: &serde_json::Value,
        key_fields: &[FieldSchema],
        value_fields: &[FieldSchema],
    ) -> Result<ExportContext>;

    fn get_persistent_key(&self, context: &ExportContext) -> Result<Value>;

    fn describe_resource(&self, key: &Value) -> String;

    async fn apply_setup_changes(&self, changes: Vec<SetupChange>) -> Result<()>;

    async fn mutate(&self, mutations: Vec<(Arc<ExportContext>, Vec<(Value, Option<Value>)>)>)
        -> Result<()>;
}

/// Key and value types declared by a connector's mutation type.
///
/// Returns `None` when the declaration leaves both unconstrained.
pub fn analyze_mutation_type(
    connector: &str,
    declared: Option<&TypeDesc>,
) -> Result<Option<(TypeDesc, TypeDesc)>, SchemaError> {
    let Some(declared) = declared else {
        return Ok(None);
    };
    let info = analyze_type_info(declared);
    if info.is_any() {
        return Ok(None);
    }

    if let TypeDesc::Tuple(elems) = &info.core_type {
        match elems.as_slice() {
            [] => return Ok(None),
            [_, mutation] => {
                let mutation = analyze_type_info(mutation);
                match mutation.variant {
                    AnalyzedVariant::Any => return Ok(None),
                    AnalyzedVariant::Dict { key, value } => {
                        let value_info = analyze_type_info(&value);
                        if matches!(
                            value_info.variant,
                            AnalyzedVariant::Struct(_) | AnalyzedVariant::Any
                        ) {
                            return Ok(Some((key, value)));
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Err(SchemaError::InvalidMutationType {
        connector: connector.to_string(),
        declared: declared.to_string(),
    })
}

/// Adapts a [`TargetConnector`] to [`ExportTarget`].
pub struct TargetConnectorBinder<C> {
    connector: Arc<C>,
    key_type: TypeDesc,
    value_type: TypeDesc,
    decoders: DecoderBuilder,
}

impl<C: TargetConnector> TargetConnectorBinder<C> {
    pub fn new(connector: C, config: &RuntimeConfig) -> Result<Self> {
        if C::Spec::CATEGORY != OpCategory::Target {
            return Err(BindingError::UnsupportedCategory {
                kind: C::Spec::KIND.to_string(),
                category: C::Spec::CATEGORY,
            }
            .into());
        }
        let (key_type, value_type) =
            analyze_mutation_type(C::Spec::KIND, connector.mutation_type().as_ref())?
                .unwrap_or((TypeDesc::Any, TypeDesc::Any));
        Ok(Self {
            connector: Arc::new(connector),
            key_type,
            value_type,
            decoders: DecoderBuilder::new(config),
        })
    }

    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    fn state<'a>(&self, context: &'a ExportContext) -> Result<&'a ContextState<C::Spec>> {
        context
            .state
            .downcast_ref::<ContextState<C::Spec>>()
            .ok_or_else(|| {
                ConnectorError::ForeignContext {
                    target: context.target_name.clone(),
                    kind: C::Spec::KIND,
                }
                .into()
            })
    }

    fn key_decoder(&self, key_fields: &[FieldSchema]) -> Result<Decoder> {
        let path = FieldPath::root("(key)");
        let key_info = analyze_type_info(&self.key_type);
        let decoder = match key_fields {
            // A single non-struct key column maps to a plain value without the wrapper struct.
            [single]
                if !matches!(single.value_type.typ, ValueType::Struct(_))
                    && matches!(
                        key_info.variant,
                        AnalyzedVariant::Any | AnalyzedVariant::Basic(_)
                    ) =>
            {
                self.decoders
                    .value_decoder(&path, &single.value_type.typ, &key_info, true)?
            }
            _ => self
                .decoders
                .struct_decoder(&path, key_fields, &key_info, true)?,
        };
        Ok(decoder)
    }
}

#[async_trait]
impl<C: TargetConnector> ExportTarget for TargetConnectorBinder<C> {
    fn kind(&self) -> &'static str {
        C::Spec::KIND
    }

    fn create_export_context(
        &self,
        name: &str,
        spec: &serde_json::Value,
        key_fields: &[FieldSchema],
        value_fields: &[FieldSchema],
    ) -> Result<ExportContext> {
        let key_decoder = self.key_decoder(key_fields)?;
        let value_decoder = self.decoders.struct_decoder(
            &FieldPath::root("(value)"),
            value_fields,
            &analyze_type_info(&self.value_type),
            false,
        )?;

        let spec: C::Spec = load_spec(spec)?;
        let prepared_spec = self.connector.prepare(&spec).map_err(Error::User)?;
        log::debug!("{}: created export context for `{name}`", C::Spec::KIND);

        Ok(ExportContext {
            target_name: name.to_string(),
            state: Arc::new(ContextState {
                spec,
                prepared_spec,
            }),
            key_decoder,
            value_decoder,
        })
    }

    fn get_persistent_key(&self, context: &ExportContext) -> Result<Value> {
        let state = self.state(context)?;
        self.connector
            .get_persistent_key(&state.spec, &context.target_name)
            .map_err(Error::User)
    }

    fn describe_resource(&self, key: &Value) -> String {
        self.connector
            .describe(key)
            .unwrap_or_else(|| key.to_string())
    }

    async fn apply_setup_changes(&self, changes: Vec<SetupChange>) -> Result<()> {
        for change in changes {
            let previous = change
                .previous
                .iter()
                .map(|spec| spec.as_ref().map(load_spec::<C::Spec>).transpose())
                .collect::<Result<Vec<_>, _>>()?;
            let current = change
                .current
                .as_ref()
                .map(load_spec::<C::Spec>)
                .transpose()?;

            log::info!(
                "{}: applying setup change for {}",
                C::Spec::KIND,
                self.describe_resource(&change.key)
            );
            for prev in previous {
                self.connector
                    .apply_setup_change(&change.key, prev, current.clone())
                    .await
                    .map_err(Error::User)?;
            }
        }
        Ok(())
    }

    async fn mutate(
        &self,
        mutations: Vec<(Arc<ExportContext>, Vec<(Value, Option<Value>)>)>,
    ) -> Result<()> {
        let mut decoded = Vec::with_capacity(mutations.len());
        for (context, rows) in &mutations {
            let state = self.state(context)?;
            let mut mutation = Mutation::with_capacity(rows.len());
            for (key, value) in rows {
                let (key, value) = context.decode(key, value.as_ref())?;
                mutation.insert(key, value);
            }
            log::debug!(
                "{}: {} mutations for `{}`",
                C::Spec::KIND,
                mutation.len(),
                context.target_name
            );
            decoded.push((state.prepared_spec.clone(), mutation));
        }
        self.connector.mutate(decoded).await.map_err(Error::User)
    }
}

#[cfg(test)]
mod tests {
    mod connector;
}
