// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use anyhow::{bail, Result};
use indexmap::IndexMap;
use opbind::registry::RegistryError;
use opbind::schema::{FieldSchema, TableSchema, VectorTypeSchema};
use opbind::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SplitBySeparators {
    separators: Vec<String>,
    #[serde(default)]
    keep_separator: bool,
}

impl OpSpec for SplitBySeparators {
    const CATEGORY: OpCategory = OpCategory::Function;
    const KIND: &'static str = "SplitBySeparators";
}

struct Splitter {
    spec: SplitBySeparators,
}

fn chunk_type() -> TypeDesc {
    StructType::new("Chunk")
        .doc("A piece of the input text.")
        .field("location", TypeDesc::range())
        .field("text", TypeDesc::Str)
        .build()
}

impl BlockingExecutor for Splitter {
    fn signature(&self) -> Signature {
        Signature::new()
            .param(Param::new("text", TypeDesc::Str))
            .param(Param::keyword_only("min_len", TypeDesc::Int).with_default(0i64))
            .returns(TypeDesc::list_of(chunk_type()))
    }

    fn invoke(&self, args: Args) -> Result<Value> {
        let text = args.require("text")?.as_str()?;
        let min_len = args.require("min_len")?.as_i64()? as usize;
        let mut chunks = vec![];
        let mut start = 0;
        for piece in text.split(|c: char| self.spec.separators.iter().any(|s| s.contains(c))) {
            let end = start + piece.len();
            if piece.len() >= min_len && !piece.is_empty() {
                chunks.push(Value::from(
                    StructValue::new("Chunk")
                        .with_field(
                            "location",
                            Value::from(vec![Value::from(start as i64), Value::from(end as i64)]),
                        )
                        .with_field("text", piece),
                ));
            }
            start = end + 1;
        }
        Ok(Value::from(chunks))
    }
}

fn str_arg() -> ArgSchema {
    ArgSchema::new(EnrichedValueType::new(ValueType::Str))
}

fn runtime_with_splitter() -> Result<Runtime> {
    let runtime = Runtime::default();
    register_splitter(&runtime)?;
    Ok(runtime)
}

fn register_splitter(runtime: &Runtime) -> Result<()> {
    runtime.register_executor::<SplitBySeparators, _, _>(
        |spec| {
            if spec.separators.is_empty() {
                bail!("at least one separator is required");
            }
            Ok(Blocking::new(Splitter { spec }))
        },
        OpArgs::default()
            .with_cache(Some(1))
            .with_arg_relationship(ArgRelationship::ChunksBaseText, "text"),
    )?;
    Ok(())
}

#[tokio::test]
async fn function_end_to_end() -> Result<()> {
    let runtime = runtime_with_splitter()?;
    let factory = runtime.function_factory("SplitBySeparators")?;
    assert_eq!(factory.kind(), "SplitBySeparators");

    let mut kwargs = IndexMap::new();
    kwargs.insert(
        "min_len".to_string(),
        ArgSchema::new(EnrichedValueType::new(ValueType::Int64)),
    );
    let (schema, op) = factory.create(
        &json!({ "separators": ["\n"] }),
        &[str_arg().with_analyzed_value(json!("doc.content"))],
        &kwargs,
    )?;

    let ValueType::LTable(TableSchema { row }) = &schema.typ else {
        bail!("unexpected result schema {schema:?}");
    };
    let names: Vec<_> = row.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["location", "text"]);
    assert_eq!(row.description.as_deref(), Some("A piece of the input text."));
    assert_eq!(
        schema.attrs.as_ref().map(|a| a["cocoindex.io/chunk_base_text"].clone()),
        Some(json!("doc.content"))
    );
    assert!(op.cache_enabled());
    assert_eq!(op.behavior_version(), Some(1));

    op.prepare().await?;
    let mut values = IndexMap::new();
    values.insert("min_len".to_string(), Value::from(2i64));
    let out = op
        .invoke(&[Value::from("ab\nc\ndef")], &values)
        .await?;

    // Rows come back in engine form: positional field arrays.
    assert_eq!(
        out,
        Value::from(vec![
            Value::from(vec![
                Value::from(vec![Value::from(0i64), Value::from(2i64)]),
                Value::from("ab"),
            ]),
            Value::from(vec![
                Value::from(vec![Value::from(5i64), Value::from(8i64)]),
                Value::from("def"),
            ]),
        ])
    );
    Ok(())
}

#[test]
fn wire_schema_of_result() -> Result<()> {
    let runtime = Runtime::default();
    runtime.register_function(
        "embed",
        Signature::new()
            .param(Param::new("text", TypeDesc::Str))
            .returns(TypeDesc::vector(TypeDesc::float32(), Some(3)).optional()),
        |_| Ok(Value::Null),
        OpArgs::default(),
    )?;
    let (schema, _) =
        runtime
            .function_factory("Embed")?
            .create(&json!({}), &[str_arg()], &IndexMap::new())?;

    assert_eq!(
        schema,
        EnrichedValueType::new(ValueType::Vector(VectorTypeSchema {
            element_type: Box::new(ValueType::Float32),
            dimension: Some(3),
        }))
        .nullable()
    );
    assert_eq!(
        serde_json::to_value(&schema)?,
        json!({
            "type": {"kind": "Vector", "element_type": {"kind": "Float32"}, "dimension": 3},
            "nullable": true,
        })
    );
    Ok(())
}

#[test]
fn factory_errors() -> Result<()> {
    let runtime = runtime_with_splitter()?;
    let factory = runtime.function_factory("SplitBySeparators")?;

    let err = factory
        .create(&json!({ "separators": 3 }), &[str_arg()], &IndexMap::new())
        .err();
    assert!(matches!(err, Some(Error::Spec(_))));

    let err = factory
        .create(&json!({ "separators": [] }), &[str_arg()], &IndexMap::new())
        .err();
    assert_eq!(
        err.map(|e| e.to_string()),
        Some("at least one separator is required".to_string())
    );

    let err = factory
        .create(&json!({ "separators": ["\n"] }), &[], &IndexMap::new())
        .err();
    assert_eq!(
        err.map(|e| e.to_string()),
        Some("Missing arguments: text".to_string())
    );

    let err = runtime.function_factory("Nope").err();
    assert_eq!(
        err.map(|e| e.to_string()),
        Some("No function is registered for `Nope`".to_string())
    );
    Ok(())
}

#[test]
fn function_spec_takes_no_fields() -> Result<()> {
    let runtime = Runtime::default();
    runtime.register_function(
        "noop",
        Signature::new().returns(TypeDesc::Bool),
        |_| Ok(Value::from(true)),
        OpArgs::default(),
    )?;
    let result = runtime
        .function_factory("Noop")?
        .create(&json!({ "unexpected": 1 }), &[], &IndexMap::new());
    assert!(matches!(result, Err(Error::Spec(_))));
    Ok(())
}

#[test]
fn registration_rules() -> Result<()> {
    let runtime = runtime_with_splitter()?;

    let err = runtime
        .register_executor::<SplitBySeparators, _, _>(
            |spec| Ok(Blocking::new(Splitter { spec })),
            OpArgs::default(),
        )
        .err();
    assert!(matches!(
        err,
        Some(Error::Registry(RegistryError::AlreadyExists { .. }))
    ));

    let err = runtime
        .register_function("", Signature::new(), |_| Ok(Value::Null), OpArgs::default())
        .err();
    assert!(matches!(
        err,
        Some(Error::Registry(RegistryError::InvalidName { .. }))
    ));

    #[derive(Serialize, Deserialize)]
    struct Declared {}
    impl OpSpec for Declared {
        const CATEGORY: OpCategory = OpCategory::Declaration;
        const KIND: &'static str = "Declared";
    }
    let err = runtime
        .register_executor::<Declared, _, _>(
            |_| {
                Ok(Blocking::new(Splitter {
                    spec: SplitBySeparators {
                        separators: vec![],
                        keep_separator: false,
                    },
                }))
            },
            OpArgs::default(),
        )
        .err();
    assert!(matches!(err, Some(Error::Binding(_))));

    assert_eq!(runtime.function_kinds().len(), 1);
    runtime.shutdown();
    assert!(runtime.function_kinds().is_empty());
    assert!(runtime.function_factory("SplitBySeparators").is_err());
    Ok(())
}

#[tokio::test]
async fn unregister_single_kind() -> Result<()> {
    let runtime = runtime_with_splitter()?;
    runtime.register_function(
        "noop",
        Signature::new().returns(TypeDesc::Bool),
        |_| Ok(Value::from(true)),
        OpArgs::default(),
    )?;
    let (_, op) = runtime.function_factory("SplitBySeparators")?.create(
        &json!({ "separators": [" "] }),
        &[str_arg()],
        &IndexMap::new(),
    )?;

    assert!(runtime.unregister_function("SplitBySeparators"));
    assert!(!runtime.unregister_function("SplitBySeparators"));
    assert!(matches!(
        runtime.function_factory("SplitBySeparators"),
        Err(Error::NotFound { .. })
    ));
    assert_eq!(runtime.function_kinds(), vec![Arc::<str>::from("Noop")]);
    assert!(!runtime.unregister_target_connector("Noop"));

    // Operators bound before removal keep working.
    let out = op.invoke(&[Value::from("a b")], &IndexMap::new()).await?;
    assert_eq!(out.as_array()?.len(), 2);

    register_splitter(&runtime)?;
    assert!(runtime.function_factory("SplitBySeparators").is_ok());
    Ok(())
}

#[test]
fn missing_struct_fields_follow_config() -> Result<()> {
    let point = StructType::new("Point")
        .field("x", TypeDesc::Int)
        .field("tags", TypeDesc::list_of(TypeDesc::Str))
        .build();
    let signature = Signature::new()
        .param(Param::new("p", point))
        .returns(TypeDesc::Int);
    let arg = ArgSchema::new(EnrichedValueType::new(ValueType::struct_of(vec![
        FieldSchema::new("x", EnrichedValueType::new(ValueType::Int64)),
    ])));

    let lenient = Runtime::default();
    lenient.register_function("probe", signature.clone(), |_| Ok(Value::from(0i64)), OpArgs::default())?;
    lenient
        .function_factory("Probe")?
        .create(&json!({}), &[arg.clone()], &IndexMap::new())?;

    let strict = Runtime::new(RuntimeConfig::from_json_str(
        r#"{"auto_default_missing_fields": false}"#,
    )?);
    strict.register_function("probe", signature, |_| Ok(Value::from(0i64)), OpArgs::default())?;
    let err = strict
        .function_factory("Probe")?
        .create(&json!({}), &[arg], &IndexMap::new())
        .err();
    assert!(matches!(
        err,
        Some(Error::Decode(opbind::convert::DecodeError::MissingField { .. }))
    ));
    Ok(())
}
