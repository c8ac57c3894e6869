// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes client creation and secret publishing.

pub mod client;
pub mod secrets;

pub use client::create_client;
pub use secrets::{
    published_credentials, render_secret, KubeSecretStore, RecordingSecretStore, SecretStore,
};
