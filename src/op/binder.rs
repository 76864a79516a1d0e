// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::OnceCell;

use super::{ArgSchema, Args, BindingError, ExclusiveGate, Executor, OpArgs, Param, ParamKind};
use crate::config::RuntimeConfig;
use crate::convert::{encode_value, DecodeError, Decoder, DecoderBuilder, FieldPath};
use crate::error::{Error, Result};
use crate::schema::{encode_enriched_type, EnrichedValueType};
use crate::typing::{analyze_type_info, Annotation, TypeDesc};
use crate::value::Value;

/// Binds an executor's declared signature to the argument schemas of a call site.
pub struct OperatorBinder {
    executor: Arc<dyn Executor>,
    op_args: OpArgs,
    gate: Arc<ExclusiveGate>,
    decoders: DecoderBuilder,
}

impl OperatorBinder {
    pub fn new(
        executor: Arc<dyn Executor>,
        op_args: OpArgs,
        gate: Arc<ExclusiveGate>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            executor,
            op_args,
            gate,
            decoders: DecoderBuilder::new(config),
        }
    }

    fn decoder(&self, name: &str, arg: &ArgSchema, param: &Param) -> Result<Decoder> {
        Ok(self.decoders.value_decoder(
            &FieldPath::root(name),
            &arg.value_type.typ,
            &analyze_type_info(&param.ty),
            false,
        )?)
    }

    /// Match positional and keyword argument schemas against the declared parameters.
    ///
    /// Builds one decoder per argument and computes the encoded result schema.
    pub fn analyze(
        &self,
        args: &[ArgSchema],
        kwargs: &IndexMap<String, ArgSchema>,
    ) -> Result<BoundOperator> {
        let signature = self.executor.signature();
        let params = signature.params;

        let mut attributes = vec![];
        let mut record_provenance = |name: &str, arg: &ArgSchema| {
            if let Some((relationship, related)) = &self.op_args.arg_relationship {
                if related == name {
                    attributes.push(Annotation::Attr(
                        relationship.attr_key(),
                        arg.analyzed_value.clone(),
                    ));
                }
            }
        };

        let mut positional = Vec::with_capacity(args.len());
        let mut next = 0;
        for arg in args {
            let param = match params.get(next) {
                Some(p) if !matches!(p.kind, ParamKind::KeywordOnly | ParamKind::VarKeyword) => p,
                _ => {
                    return Err(BindingError::TooManyPositional {
                        passed: args.len(),
                        accepted: next,
                    }
                    .into())
                }
            };
            positional.push((next, self.decoder(&param.name, arg, param)?));
            record_provenance(&param.name, arg);
            if param.kind != ParamKind::VarPositional {
                next += 1;
            }
        }

        let remaining = &params[next..];
        let mut keyword = IndexMap::with_capacity(kwargs.len());
        for (name, arg) in kwargs {
            let Some(offset) = remaining.iter().position(|p| {
                (p.name == *name
                    && matches!(
                        p.kind,
                        ParamKind::KeywordOnly | ParamKind::PositionalOrKeyword
                    ))
                    || p.kind == ParamKind::VarKeyword
            }) else {
                return Err(BindingError::UnexpectedKeyword(name.clone()).into());
            };
            let param = &remaining[offset];
            keyword.insert(name.clone(), (next + offset, self.decoder(name, arg, param)?));
            record_provenance(name, arg);
        }

        let missing: Vec<String> = remaining
            .iter()
            .filter(|p| {
                p.default.is_none()
                    && match p.kind {
                        ParamKind::PositionalOnly => true,
                        ParamKind::KeywordOnly | ParamKind::PositionalOrKeyword => {
                            !kwargs.contains_key(&p.name)
                        }
                        ParamKind::VarPositional | ParamKind::VarKeyword => false,
                    }
            })
            .map(|p| p.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(BindingError::MissingArguments(missing).into());
        }

        let result_type = match self.executor.analyze(args, kwargs).map_err(Error::User)? {
            Some(t) => t,
            None => signature.returns,
        };
        let result_type = if attributes.is_empty() {
            result_type
        } else {
            TypeDesc::Annotated(Box::new(result_type), attributes)
        };
        let result_schema = encode_enriched_type(&result_type)?;

        log::debug!(
            "bound operator with {} positional and {} keyword arguments",
            positional.len(),
            keyword.len()
        );

        Ok(BoundOperator {
            executor: self.executor.clone(),
            params,
            positional,
            keyword,
            result_schema,
            op_args: self.op_args.clone(),
            gate: self.op_args.exclusive.then(|| self.gate.clone()),
            prepared: OnceCell::new(),
        })
    }
}

/// An operator bound to one call shape, ready to be invoked by the engine.
pub struct BoundOperator {
    executor: Arc<dyn Executor>,
    params: Vec<Param>,
    // (declared parameter index, decoder)
    positional: Vec<(usize, Decoder)>,
    keyword: IndexMap<String, (usize, Decoder)>,
    result_schema: EnrichedValueType,
    op_args: OpArgs,
    gate: Option<Arc<ExclusiveGate>>,
    prepared: OnceCell<Result<(), Arc<anyhow::Error>>>,
}

impl BoundOperator {
    pub fn result_schema(&self) -> &EnrichedValueType {
        &self.result_schema
    }

    pub fn cache_enabled(&self) -> bool {
        self.op_args.cache
    }

    pub fn behavior_version(&self) -> Option<i64> {
        self.op_args.behavior_version
    }

    pub fn is_exclusive(&self) -> bool {
        self.gate.is_some()
    }

    /// Run the executor's preparation exactly once.
    ///
    /// Concurrent callers wait for the same preparation and observe its outcome.
    pub async fn prepare(&self) -> Result<()> {
        self.prepared
            .get_or_init(|| async { self.executor.prepare().await.map_err(Arc::new) })
            .await
            .clone()
            .map_err(Error::Prepare)
    }

    fn decode_args(&self, args: &[Value], kwargs: &IndexMap<String, Value>) -> Result<Args> {
        if args.len() != self.positional.len() {
            return Err(DecodeError::ArgumentCount {
                expected: self.positional.len(),
                actual: args.len(),
            }
            .into());
        }

        let mut bound: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut decoded = Args::new();
        for ((idx, decoder), raw) in self.positional.iter().zip(args) {
            let value = decoder(raw)?;
            match self.params[*idx].kind {
                ParamKind::VarPositional => decoded.push_rest(value),
                _ => bound[*idx] = Some(value),
            }
        }
        for (name, raw) in kwargs {
            let (idx, decoder) = self
                .keyword
                .get(name)
                .ok_or_else(|| DecodeError::UnexpectedArgument(name.clone()))?;
            let value = decoder(raw)?;
            match self.params[*idx].kind {
                ParamKind::VarKeyword => decoded.insert_extra(name.clone(), value),
                _ => bound[*idx] = Some(value),
            }
        }

        for (param, value) in self.params.iter().zip(bound) {
            if param.is_variadic() {
                continue;
            }
            if let Some(value) = value.or_else(|| param.default.clone()) {
                decoded.insert(param.name.clone(), value);
            }
        }
        Ok(decoded)
    }

    /// Decode the raw arguments, run the executor and encode its result.
    pub async fn invoke(&self, args: &[Value], kwargs: &IndexMap<String, Value>) -> Result<Value> {
        let decoded = self.decode_args(args, kwargs)?;
        let output = match &self.gate {
            Some(gate) => gate.run(self.executor.invoke(decoded)).await,
            None => self.executor.invoke(decoded).await,
        }
        .map_err(Error::User)?;
        Ok(encode_value(&output))
    }
}
