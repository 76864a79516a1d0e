// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Error type for export context handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// The export context was created by a different connector.
    #[error("Export context of target `{target}` does not belong to connector `{kind}`")]
    ForeignContext { target: String, kind: &'static str },
}
