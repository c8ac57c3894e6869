// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster client creation

use crate::config::RuntimeSettings;
use crate::error::{ProvisionError, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config as KConfig};
use std::path::Path;
use tracing::{info, instrument};

/// Create a client from the configured kubeconfig file, or from the
/// in-cluster / `KUBECONFIG` environment when none is configured
#[instrument(skip(settings))]
pub async fn create_client(settings: &RuntimeSettings) -> Result<Client> {
    match &settings.kubeconfig {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                ProvisionError::KubeconfigError(format!(
                    "Failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            info!("Using kubeconfig {}", path.display());
            create_client_from_kubeconfig(&raw, path).await
        }
        None => {
            let config = KConfig::infer().await.map_err(|e| {
                ProvisionError::KubeconfigError(format!("Failed to infer config: {}", e))
            })?;
            info!("Using inferred cluster config for {}", config.cluster_url);
            Client::try_from(config).map_err(|e| {
                ProvisionError::KubeconfigError(format!("Failed to create client: {}", e))
            })
        }
    }
}

async fn create_client_from_kubeconfig(kubeconfig: &str, origin: &Path) -> Result<Client> {
    let parsed = parse_kubeconfig(kubeconfig, origin)?;

    let client_config = KConfig::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
        .await
        .map_err(|e| ProvisionError::KubeconfigError(format!("Failed to create config: {}", e)))?;

    Client::try_from(client_config)
        .map_err(|e| ProvisionError::KubeconfigError(format!("Failed to create client: {}", e)))
}

fn parse_kubeconfig(kubeconfig: &str, origin: &Path) -> Result<Kubeconfig> {
    serde_yaml::from_str(kubeconfig).map_err(|e| {
        ProvisionError::KubeconfigError(format!(
            "Failed to parse kubeconfig {}: {}",
            origin.display(),
            e
        ))
    })
}
