// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use thiserror::Error;

/// Failures while reading the resource configuration. All of them abort the
/// run before anything is declared.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration key: {0}")]
    Missing(String),

    #[error("Invalid ACL mode '{0}', expected one of: public, readonly, private")]
    InvalidAcl(String),

    #[error("Invalid setting {key}: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("Failed to read configuration file {path}: {message}")]
    File { path: String, message: String },
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to load kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Object storage {operation} failed: {message}")]
    Provider { operation: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to serialize policy document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{resource} skipped, dependency failed: {cause}")]
    Dependency {
        resource: String,
        cause: Arc<ProvisionError>,
    },

    #[error("Provisioning aborted, {} resource(s) failed: {}", .failures.len(), .failures.join("; "))]
    Aborted { failures: Vec<String> },
}

impl ProvisionError {
    pub fn provider(operation: &str, err: impl std::fmt::Display) -> Self {
        ProvisionError::Provider {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    /// Walk through dependency wrappers to the failure that actually happened.
    pub fn root_cause(&self) -> &ProvisionError {
        match self {
            ProvisionError::Dependency { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
