// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use opbind::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Barrier;

#[derive(Default)]
struct Concurrency {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProbeSpec {
    wait_for: Option<usize>,
}

impl OpSpec for ProbeSpec {
    const CATEGORY: OpCategory = OpCategory::Function;
    const KIND: &'static str = "Probe";
}

struct Probe {
    stats: Arc<Concurrency>,
    barrier: Option<Arc<Barrier>>,
}

#[async_trait]
impl Executor for Probe {
    fn signature(&self) -> Signature {
        Signature::new()
            .param(Param::new("x", TypeDesc::Int))
            .returns(TypeDesc::Int)
    }

    async fn invoke(&self, args: Args) -> Result<Value> {
        self.stats.enter();
        match &self.barrier {
            Some(barrier) => {
                barrier.wait().await;
            }
            None => tokio::time::sleep(Duration::from_millis(5)).await,
        }
        self.stats.leave();
        Ok(args.require("x")?.clone())
    }
}

fn register_probe(runtime: &Runtime, stats: Arc<Concurrency>, op_args: OpArgs) -> Result<()> {
    let barriers: Arc<std::sync::Mutex<IndexMap<usize, Arc<Barrier>>>> = Arc::default();
    runtime.register_executor::<ProbeSpec, _, _>(
        move |spec| {
            let barrier = spec.wait_for.map(|n| {
                barriers
                    .lock()
                    .unwrap()
                    .entry(n)
                    .or_insert_with(|| Arc::new(Barrier::new(n)))
                    .clone()
            });
            Ok(Probe {
                stats: stats.clone(),
                barrier,
            })
        },
        op_args,
    )?;
    Ok(())
}

fn int_arg() -> ArgSchema {
    ArgSchema::new(EnrichedValueType::new(ValueType::Int64))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exclusive_operators_never_overlap() -> Result<()> {
    let runtime = Runtime::default();
    let stats = Arc::new(Concurrency::default());
    register_probe(&runtime, stats.clone(), OpArgs::default().with_exclusive())?;

    let blocking_stats = stats.clone();
    runtime.register_function(
        "blocking_probe",
        Signature::new()
            .param(Param::new("x", TypeDesc::Int))
            .returns(TypeDesc::Int),
        move |args| {
            blocking_stats.enter();
            std::thread::sleep(Duration::from_millis(5));
            blocking_stats.leave();
            Ok(args.require("x")?.clone())
        },
        OpArgs::default().with_exclusive(),
    )?;

    let mut ops = vec![];
    for kind in ["Probe", "BlockingProbe"] {
        let (_, op) = runtime.function_factory(kind)?.create(
            &serde_json::json!({}),
            &[int_arg()],
            &IndexMap::new(),
        )?;
        assert!(op.is_exclusive());
        ops.push(Arc::new(op));
    }

    let mut tasks = vec![];
    for i in 0..16i64 {
        let op = ops[i as usize % ops.len()].clone();
        tasks.push(tokio::spawn(async move {
            op.invoke(&[Value::from(i)], &IndexMap::new()).await
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await??, Value::from(i as i64));
    }

    assert_eq!(stats.peak(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn non_exclusive_operators_run_concurrently() -> Result<()> {
    const PARTIES: usize = 4;

    let runtime = Runtime::default();
    let stats = Arc::new(Concurrency::default());
    register_probe(&runtime, stats.clone(), OpArgs::default())?;

    let (_, op) = runtime.function_factory("Probe")?.create(
        &serde_json::json!({ "wait_for": PARTIES }),
        &[int_arg()],
        &IndexMap::new(),
    )?;
    assert!(!op.is_exclusive());
    let op = Arc::new(op);

    // Every invocation waits until all of them are in flight at once.
    let tasks: Vec<_> = (0..PARTIES as i64)
        .map(|i| {
            let op = op.clone();
            tokio::spawn(async move { op.invoke(&[Value::from(i)], &IndexMap::new()).await })
        })
        .collect();
    tokio::time::timeout(Duration::from_secs(10), async {
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    })
    .await?;

    assert_eq!(stats.peak(), PARTIES);
    Ok(())
}
