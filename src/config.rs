// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Settings shared by everything created from one [`crate::Runtime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Fill struct fields missing from the engine schema with an empty value
    /// (null, empty list or empty map) when the declared type allows it.
    pub auto_default_missing_fields: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            auto_default_missing_fields: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
