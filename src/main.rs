// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bucketwright::config::{Command, Config, RuntimeSettings};
use bucketwright::declare::declare;
use bucketwright::kubernetes::{create_client, KubeSecretStore};
use bucketwright::provider::MinioProvider;
use bucketwright::stack::Stack;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the run outputs
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Nothing is declared before the configuration is complete
    let config = Config::load()?;
    let settings = RuntimeSettings::from_env()?;
    info!(
        "Configuration loaded: name={}, namespace={}, release={:?}, acl={}",
        config.name, config.namespace, config.release_name, config.acl
    );

    let declaration = declare(&config);

    match settings.command {
        Command::Preview => {
            let deployment = Stack::preview(&declaration).await?;
            info!("Policy document: {}", deployment.policy_document);
            println!("{}", deployment.outputs.to_json()?);
        }
        Command::Up => {
            let deployment = connect(&settings).await?.up(&declaration).await?;
            println!("{}", deployment.outputs.to_json()?);
        }
        Command::Down => {
            connect(&settings).await?.down(&declaration).await?;
        }
    }

    Ok(())
}

async fn connect(settings: &RuntimeSettings) -> Result<Stack> {
    let storage = MinioProvider::connect(settings).await?;
    let client = create_client(settings).await?;
    info!("Connected to Kubernetes cluster");
    Ok(Stack::new(Arc::new(storage), Arc::new(KubeSecretStore::new(client))))
}
