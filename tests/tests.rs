// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod connector;
mod gate;
mod runtime;
