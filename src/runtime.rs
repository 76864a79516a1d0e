// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::op::{
    load_spec, ArgSchema, Args, Blocking, BindingError, BoundOperator, ExclusiveGate, Executor,
    FnExecutor, OpArgs, OpCategory, OpSpec, OperatorBinder, Signature,
};
use crate::registry::Registry;
use crate::schema::EnrichedValueType;
use crate::target::{ExportTarget, TargetConnector, TargetConnectorBinder};
use crate::value::Value;

type MakeExecutor = Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Executor>> + Send + Sync>;

/// Creates bound operators of one function kind.
pub trait FunctionFactory: Send + Sync + 'static {
    fn kind(&self) -> &str;

    /// Load `spec`, construct the executor and bind it to the given argument schemas.
    fn create(
        &self,
        spec: &serde_json::Value,
        args: &[ArgSchema],
        kwargs: &IndexMap<String, ArgSchema>,
    ) -> Result<(EnrichedValueType, BoundOperator)>;
}

struct ExecutorFactory {
    kind: String,
    make: MakeExecutor,
    op_args: OpArgs,
    gate: Arc<ExclusiveGate>,
    config: RuntimeConfig,
}

impl FunctionFactory for ExecutorFactory {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn create(
        &self,
        spec: &serde_json::Value,
        args: &[ArgSchema],
        kwargs: &IndexMap<String, ArgSchema>,
    ) -> Result<(EnrichedValueType, BoundOperator)> {
        let executor = (self.make)(spec)?;
        let bound = OperatorBinder::new(
            executor,
            self.op_args.clone(),
            self.gate.clone(),
            &self.config,
        )
        .analyze(args, kwargs)?;
        log::debug!("{}: created operator", self.kind);
        Ok((bound.result_schema().clone(), bound))
    }
}

// Spec of function-style operators, which carry no configuration.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptySpec {}

/// `split_by_separators` becomes `SplitBySeparators`.
pub fn to_camel_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Owns the operator registries and the exclusive gate shared by all operators created here.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    gate: Arc<ExclusiveGate>,
    functions: Registry<dyn FunctionFactory>,
    targets: Registry<dyn ExportTarget>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            gate: Arc::new(ExclusiveGate::new()),
            functions: Registry::new("FunctionRegistry"),
            targets: Registry::new("TargetConnectorRegistry"),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn gate(&self) -> &Arc<ExclusiveGate> {
        &self.gate
    }

    fn register_factory(&self, kind: String, make: MakeExecutor, op_args: OpArgs) -> Result<()> {
        let factory = ExecutorFactory {
            kind: kind.clone(),
            make,
            op_args,
            gate: self.gate.clone(),
            config: self.config.clone(),
        };
        Ok(self.functions.register(kind, Arc::new(factory))?)
    }

    /// Register an executor constructed from its spec for every operator instance.
    pub fn register_executor<S, E, F>(&self, make: F, op_args: OpArgs) -> Result<()>
    where
        S: OpSpec,
        E: Executor,
        F: Fn(S) -> anyhow::Result<E> + Send + Sync + 'static,
    {
        if S::CATEGORY != OpCategory::Function {
            return Err(BindingError::UnsupportedCategory {
                kind: S::KIND.to_string(),
                category: S::CATEGORY,
            }
            .into());
        }
        let make: MakeExecutor = Box::new(move |spec: &serde_json::Value| {
            let spec = load_spec::<S>(spec)?;
            let executor = make(spec).map_err(Error::User)?;
            Ok::<_, Error>(Arc::new(executor) as Arc<dyn Executor>)
        });
        self.register_factory(S::KIND.to_string(), make, op_args)
    }

    /// Register a plain function. The operator kind is `name` in CamelCase.
    pub fn register_function<F>(
        &self,
        name: &str,
        signature: Signature,
        f: F,
        op_args: OpArgs,
    ) -> Result<()>
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let executor: Arc<dyn Executor> = Arc::new(Blocking::new(FnExecutor::new(signature, f)));
        let make: MakeExecutor = Box::new(move |spec: &serde_json::Value| {
            EmptySpec::deserialize(spec)?;
            Ok::<_, Error>(executor.clone())
        });
        self.register_factory(to_camel_case(name), make, op_args)
    }

    pub fn register_target_connector<C: TargetConnector>(&self, connector: C) -> Result<()> {
        let binder = TargetConnectorBinder::new(connector, &self.config)?;
        Ok(self.targets.register(C::Spec::KIND, Arc::new(binder))?)
    }

    pub fn function_factory(&self, kind: &str) -> Result<Arc<dyn FunctionFactory>> {
        self.functions.get(kind).ok_or_else(|| Error::NotFound {
            category: "function",
            kind: kind.to_string(),
        })
    }

    pub fn target_connector(&self, kind: &str) -> Result<Arc<dyn ExportTarget>> {
        self.targets.get(kind).ok_or_else(|| Error::NotFound {
            category: "target connector",
            kind: kind.to_string(),
        })
    }

    /// Remove a function registration. Returns whether `kind` was registered.
    pub fn unregister_function(&self, kind: &str) -> bool {
        let removed = self.functions.remove(kind).is_some();
        if removed {
            log::debug!("unregistered function `{kind}`");
        }
        removed
    }

    pub fn unregister_target_connector(&self, kind: &str) -> bool {
        let removed = self.targets.remove(kind).is_some();
        if removed {
            log::debug!("unregistered target connector `{kind}`");
        }
        removed
    }

    pub fn function_kinds(&self) -> Vec<Arc<str>> {
        self.functions.list_names()
    }

    pub fn target_kinds(&self) -> Vec<Arc<str>> {
        self.targets.list_names()
    }

    /// Drop all registrations. Operators already bound keep working.
    pub fn shutdown(&self) {
        log::info!(
            "shutting down runtime with {} functions and {} target connectors",
            self.functions.len(),
            self.targets.len()
        );
        self.functions.clear();
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    mod naming;
}
