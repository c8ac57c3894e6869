// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Drives a [`Declaration`] against the providers.
//!
//! Every resource is a [`Deferred`] whose creation waits on the outputs it
//! consumes, so provisioning order follows data dependencies and resources
//! that do not depend on each other are created concurrently. When a
//! resource fails, everything downstream of it is skipped and whatever was
//! already created is left in place.

use crate::constants::resources::*;
use crate::declare::Declaration;
use crate::deferred::{Deferred, SharedError};
use crate::error::{ProvisionError, Result};
use crate::kubernetes::{published_credentials, render_secret, RecordingSecretStore, SecretStore};
use crate::outputs::Outputs;
use crate::policy;
use crate::provider::{MemoryProvider, ObjectStorage, ServiceAccount};
use futures::future::{self, BoxFuture, FutureExt, TryFutureExt};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Result of a successful `up`
#[derive(Debug, Clone)]
pub struct Deployment {
    pub outputs: Outputs,
    pub policy_document: String,
}

pub struct Stack {
    storage: Arc<dyn ObjectStorage>,
    secrets: Arc<dyn SecretStore>,
}

impl Stack {
    pub fn new(storage: Arc<dyn ObjectStorage>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { storage, secrets }
    }

    /// Run `up` against throwaway in-memory providers
    pub async fn preview(declaration: &Declaration) -> Result<Deployment> {
        let stack = Stack::new(
            Arc::new(MemoryProvider::new()),
            Arc::new(RecordingSecretStore::new()),
        );
        stack.up(declaration).await
    }

    #[instrument(skip(self, declaration), fields(user = %declaration.user.name, bucket = %declaration.bucket.name))]
    pub async fn up(&self, declaration: &Declaration) -> Result<Deployment> {
        let storage = self.storage.clone();
        let spec = declaration.user.clone();
        let user = root(IAM_USER, async move { storage.ensure_user(&spec).await });

        let storage = self.storage.clone();
        let spec = declaration.bucket.clone();
        let bucket = root(BUCKET, async move { storage.ensure_bucket(&spec).await });

        let acl = declaration.policy.acl;
        let document = bucket.apply(move |bucket| policy::document(&bucket.arn, acl));

        let storage = self.storage.clone();
        let name = declaration.policy.name.clone();
        let iam_policy = step(IAM_POLICY, &document, move |document| async move {
            storage.ensure_policy(&name, &document).await
        });

        let storage = self.storage.clone();
        let attachment = step(
            POLICY_ATTACHMENT,
            &user.zip(&iam_policy),
            move |(user, policy)| async move { storage.attach_policy(&user.name, &policy).await },
        );

        let storage = self.storage.clone();
        let secrets = self.secrets.clone();
        let spec = declaration.secret.clone();
        let service_account = step(
            SERVICE_ACCOUNT,
            &user.zip(&document).zip(&attachment),
            move |((user, document), ())| async move {
                let existing = secrets.get(&spec.namespace, &spec.name).await?;
                let published = existing.as_ref().and_then(published_credentials);
                ensure_service_account(storage.as_ref(), &user.name, &document, published).await
            },
        );

        let secrets = self.secrets.clone();
        let spec = declaration.secret.clone();
        let secret = step(SECRET, &service_account, move |account| async move {
            let secret = render_secret(&spec, &account)?;
            secrets.apply(&secret).await
        });

        // Superseded keys go only once the secret points at the current one
        let storage = self.storage.clone();
        let owner = declaration.service_account.target_user.clone();
        let stale = step(
            STALE_SERVICE_ACCOUNTS,
            &service_account.zip(&secret),
            move |(account, _)| async move {
                let keep = Some(account.access_key.as_str());
                prune_service_accounts(storage.as_ref(), &owner, keep).await
            },
        );

        let tracked: Vec<(&str, BoxFuture<'static, std::result::Result<(), SharedError>>)> = vec![
            (IAM_USER, settle(&user)),
            (BUCKET, settle(&bucket)),
            (IAM_POLICY, settle(&iam_policy)),
            (POLICY_ATTACHMENT, settle(&attachment)),
            (SERVICE_ACCOUNT, settle(&service_account)),
            (SECRET, settle(&secret)),
            (STALE_SERVICE_ACCOUNTS, settle(&stale)),
        ];
        let (names, pending): (Vec<_>, Vec<_>) = tracked.into_iter().unzip();
        let results = future::join_all(pending).await;

        let failures: Vec<String> = names
            .iter()
            .zip(results)
            .filter_map(|(name, result)| result.err().map(|e| describe_failure(name, &e)))
            .collect();

        if !failures.is_empty() {
            return Err(ProvisionError::Aborted { failures });
        }

        let bucket = bucket.resolve().await.map_err(|e| unshare(BUCKET, e))?;
        let secret: Secret = secret.resolve().await.map_err(|e| unshare(SECRET, e))?;
        let policy_document = document
            .resolve()
            .await
            .map_err(|e| unshare(POLICY_DOCUMENT, e))?;

        info!("All resources provisioned");
        Ok(Deployment {
            outputs: Outputs::new(declaration.layout, bucket.arn, secret.name_any()),
            policy_document,
        })
    }

    /// Remove everything `up` creates, in reverse dependency order, stopping
    /// at the first failure
    #[instrument(skip(self, declaration), fields(user = %declaration.user.name, bucket = %declaration.bucket.name))]
    pub async fn down(&self, declaration: &Declaration) -> Result<()> {
        let secret = &declaration.secret;
        teardown(SECRET, self.secrets.delete(&secret.namespace, &secret.name)).await?;
        teardown(
            SERVICE_ACCOUNT,
            prune_service_accounts(
                self.storage.as_ref(),
                &declaration.service_account.target_user,
                None,
            ),
        )
        .await?;
        teardown(
            POLICY_ATTACHMENT,
            self.storage.detach_policy(
                &declaration.attachment.user_name,
                &declaration.attachment.policy_name,
            ),
        )
        .await?;
        teardown(IAM_POLICY, self.storage.delete_policy(&declaration.policy.name)).await?;
        teardown(BUCKET, self.storage.delete_bucket(&declaration.bucket.name)).await?;
        teardown(IAM_USER, self.storage.delete_user(&declaration.user)).await?;

        info!("All resources removed");
        Ok(())
    }
}

/// A resource with no inputs
fn root<T, Fut>(resource: &'static str, create: Fut) -> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Deferred::new(async move {
        let value = create
            .await
            .inspect_err(|e| error!("Failed to provision {}: {}", resource, e))?;
        info!("{} ready", resource);
        Ok(value)
    })
}

/// A resource created from the resolved `input`
fn step<I, T, F, Fut>(resource: &'static str, input: &Deferred<I>, create: F) -> Deferred<T>
where
    I: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: FnOnce(I) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let input = input.clone();
    Deferred::new(async move {
        debug!("{} waiting for its inputs", resource);
        let value = input.resolve().await.map_err(|cause| {
            debug!("Skipping {}, an input failed", resource);
            ProvisionError::Dependency {
                resource: resource.to_string(),
                cause,
            }
        })?;

        let created = create(value)
            .await
            .inspect_err(|e| error!("Failed to provision {}: {}", resource, e))?;
        info!("{} ready", resource);
        Ok(created)
    })
}

/// Keep the published credentials while their key is still live, otherwise
/// issue a new service account. Either way the account ends up restricted by
/// `policy`.
async fn ensure_service_account(
    storage: &dyn ObjectStorage,
    user: &str,
    policy: &str,
    published: Option<ServiceAccount>,
) -> Result<ServiceAccount> {
    let live = storage.list_service_accounts(user).await?;
    match published {
        Some(account) if live.contains(&account.access_key) => {
            storage
                .update_service_account(&account.access_key, policy)
                .await?;
            debug!("Reusing published service account {}", account.access_key);
            Ok(account)
        }
        Some(account) => {
            info!(
                "Published service account {} no longer exists, issuing a new one",
                account.access_key
            );
            storage.create_service_account(user, policy).await
        }
        None => storage.create_service_account(user, policy).await,
    }
}

/// Delete every service account of `user` except `keep`
async fn prune_service_accounts(
    storage: &dyn ObjectStorage,
    user: &str,
    keep: Option<&str>,
) -> Result<()> {
    for access_key in storage.list_service_accounts(user).await? {
        if Some(access_key.as_str()) != keep {
            storage.delete_service_account(&access_key).await?;
        }
    }
    Ok(())
}

fn settle<T>(value: &Deferred<T>) -> BoxFuture<'static, std::result::Result<(), SharedError>>
where
    T: Clone + Send + Sync + 'static,
{
    value.resolve().map_ok(|_| ()).boxed()
}

fn describe_failure(resource: &str, err: &ProvisionError) -> String {
    match err {
        ProvisionError::Dependency { .. } => {
            format!("{resource}: skipped ({})", err.root_cause())
        }
        other => format!("{resource}: {other}"),
    }
}

/// Turn a shared failure back into an owned one for callers
fn unshare(resource: &str, err: SharedError) -> ProvisionError {
    Arc::try_unwrap(err).unwrap_or_else(|cause| ProvisionError::Dependency {
        resource: resource.to_string(),
        cause,
    })
}

async fn teardown<Fut>(resource: &'static str, delete: Fut) -> Result<()>
where
    Fut: Future<Output = Result<()>>,
{
    delete
        .await
        .inspect_err(|e| error!("Failed to remove {}: {}", resource, e))?;
    info!("{} removed", resource);
    Ok(())
}
