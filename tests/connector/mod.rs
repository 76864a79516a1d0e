// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use opbind::schema::FieldSchema;
use opbind::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct InMemoryTable {
    name: String,
}

impl OpSpec for InMemoryTable {
    const CATEGORY: OpCategory = OpCategory::Target;
    const KIND: &'static str = "InMemoryTable";
}

type Tables = Arc<Mutex<BTreeMap<String, BTreeMap<Value, Value>>>>;

struct InMemoryConnector {
    tables: Tables,
}

fn doc_type() -> TypeDesc {
    StructType::new("Doc")
        .field("title", TypeDesc::Str)
        .field("year", TypeDesc::Int.optional())
        .build()
}

#[async_trait]
impl TargetConnector for InMemoryConnector {
    type Spec = InMemoryTable;

    fn mutation_type(&self) -> Option<TypeDesc> {
        Some(TypeDesc::Tuple(vec![
            TypeDesc::Opaque("InMemoryTable".into()),
            TypeDesc::dict_of(TypeDesc::Str, doc_type()),
        ]))
    }

    fn get_persistent_key(&self, spec: &InMemoryTable, _target_name: &str) -> Result<Value> {
        Ok(Value::from(spec.name.as_str()))
    }

    fn describe(&self, key: &Value) -> Option<String> {
        Some(format!("in-memory table {key}"))
    }

    async fn apply_setup_change(
        &self,
        key: &Value,
        previous: Option<InMemoryTable>,
        current: Option<InMemoryTable>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(prev) = previous {
            if current.as_ref() != Some(&prev) {
                tables.remove(&prev.name);
            }
        }
        if let Some(current) = current {
            tables.entry(current.name).or_default();
        }
        log::debug!("applied setup change for {key}");
        Ok(())
    }

    async fn mutate(&self, mutations: Vec<(InMemoryTable, Mutation)>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        for (spec, mutation) in mutations {
            let table = tables.entry(spec.name).or_default();
            for (key, value) in mutation {
                match value {
                    Some(value) => table.insert(key, value),
                    None => table.remove(&key),
                };
            }
        }
        Ok(())
    }
}

fn field(name: &str, typ: ValueType) -> FieldSchema {
    FieldSchema::new(name, EnrichedValueType::new(typ))
}

#[tokio::test]
async fn export_flow() -> Result<()> {
    let tables = Tables::default();
    let runtime = Runtime::default();
    runtime.register_target_connector(InMemoryConnector {
        tables: tables.clone(),
    })?;
    assert_eq!(runtime.target_kinds(), vec![Arc::<str>::from("InMemoryTable")]);

    let target = runtime.target_connector("InMemoryTable")?;
    target
        .apply_setup_changes(vec![SetupChange {
            key: Value::from("docs"),
            previous: vec![None],
            current: Some(json!({"name": "docs"})),
        }])
        .await?;
    assert!(tables.lock().unwrap().contains_key("docs"));

    let context = Arc::new(target.create_export_context(
        "docs_target",
        &json!({"name": "docs"}),
        &[field("id", ValueType::Str)],
        // `year` is absent from the engine rows and defaults to null.
        &[field("title", ValueType::Str)],
    )?);
    assert_eq!(target.get_persistent_key(&context)?, Value::from("docs"));
    assert_eq!(
        target.describe_resource(&Value::from("docs")),
        "in-memory table docs"
    );

    target
        .mutate(vec![(
            context.clone(),
            vec![
                (Value::from("a"), Some(Value::from(vec![Value::from("Dune")]))),
                (Value::from("b"), Some(Value::from(vec![Value::from("Emma")]))),
            ],
        )])
        .await?;
    target
        .mutate(vec![(context, vec![(Value::from("b"), None)])])
        .await?;

    {
        let tables = tables.lock().unwrap();
        let docs = &tables["docs"];
        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[&Value::from("a")],
            Value::from(
                StructValue::new("Doc")
                    .with_field("title", "Dune")
                    .with_field("year", Value::Null)
            )
        );
    }

    // Renaming moves the table; both candidate previous states are offered.
    target
        .apply_setup_changes(vec![SetupChange {
            key: Value::from("docs"),
            previous: vec![Some(json!({"name": "docs"})), None],
            current: Some(json!({"name": "documents"})),
        }])
        .await?;
    let names: Vec<_> = tables.lock().unwrap().keys().cloned().collect();
    assert_eq!(names, ["documents"]);

    runtime.shutdown();
    assert!(runtime.target_connector("InMemoryTable").is_err());
    Ok(())
}

#[test]
fn duplicate_connector_is_rejected() -> Result<()> {
    let runtime = Runtime::default();
    runtime.register_target_connector(InMemoryConnector {
        tables: Tables::default(),
    })?;
    let err = runtime
        .register_target_connector(InMemoryConnector {
            tables: Tables::default(),
        })
        .err();
    assert_eq!(
        err.map(|e| e.to_string()),
        Some(
            "TargetConnectorRegistry registration failed: An item with the name 'InMemoryTable' is already registered."
                .to_string()
        )
    );
    Ok(())
}
