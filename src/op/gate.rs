// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::future::Future;

use tokio::sync::Mutex;

/// Mutual exclusion shared by all exclusive operators of one runtime.
///
/// The guarded resource (typically a GPU) is assumed unsafe to use from concurrent calls.
/// Acquisition order is unspecified.
#[derive(Debug, Default)]
pub struct ExclusiveGate {
    lock: Mutex<()>,
}

impl ExclusiveGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` to completion while holding the gate.
    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        let _guard = self.lock.lock().await;
        fut.await
    }
}
