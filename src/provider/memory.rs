// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-process provider used for previews and tests.

use super::operations::*;
use super::{Bucket, IamPolicy, IamUser, ObjectStorage, ServiceAccount};
use crate::declare::{BucketSpec, IamUserSpec};
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredAccount {
    account: ServiceAccount,
    policy: String,
}

#[derive(Debug, Default)]
struct UserState {
    policies: BTreeSet<String>,
    service_accounts: Vec<StoredAccount>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<String, UserState>,
    buckets: BTreeSet<String>,
    policies: BTreeMap<String, String>,
    calls: Vec<String>,
    next_key: u64,
}

impl State {
    fn account_mut(&mut self, access_key: &str) -> Option<&mut StoredAccount> {
        self.users
            .values_mut()
            .flat_map(|u| u.service_accounts.iter_mut())
            .find(|s| s.account.access_key == access_key)
    }
}

#[derive(Debug, Default)]
pub struct MemoryProvider {
    state: Mutex<State>,
    failures: Mutex<HashSet<&'static str>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `operation` fail
    pub fn fail_on(self, operation: &'static str) -> Self {
        self.failures.lock().insert(operation);
        self
    }

    /// Let `operation` succeed again
    pub fn recover(&self, operation: &'static str) {
        self.failures.lock().remove(operation);
    }

    /// Operations performed so far, in order, as `Operation:target`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.state.lock().users.contains_key(name)
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        self.state.lock().buckets.contains(name)
    }

    pub fn policy_document(&self, name: &str) -> Option<String> {
        self.state.lock().policies.get(name).cloned()
    }

    pub fn attached_policies(&self, user: &str) -> Vec<String> {
        self.state
            .lock()
            .users
            .get(user)
            .map(|u| u.policies.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn service_accounts(&self, user: &str) -> Vec<ServiceAccount> {
        self.state
            .lock()
            .users
            .get(user)
            .map(|u| u.service_accounts.iter().map(|s| s.account.clone()).collect())
            .unwrap_or_default()
    }

    /// The policy restricting the service account with `access_key`
    pub fn service_account_policy(&self, access_key: &str) -> Option<String> {
        self.state
            .lock()
            .account_mut(access_key)
            .map(|s| s.policy.clone())
    }

    /// Record the call and fail it if requested
    fn enter(&self, operation: &'static str, target: &str) -> Result<parking_lot::MutexGuard<'_, State>> {
        let mut state = self.state.lock();
        state.calls.push(format!("{operation}:{target}"));
        if self.failures.lock().contains(operation) {
            return Err(ProvisionError::provider(
                operation,
                format!("injected failure for {target}"),
            ));
        }
        debug!("{} {}", operation, target);
        Ok(state)
    }
}

fn no_such_entity(operation: &str, kind: &str, name: &str) -> ProvisionError {
    ProvisionError::provider(operation, format!("{kind} {name} does not exist"))
}

#[async_trait]
impl ObjectStorage for MemoryProvider {
    async fn ensure_user(&self, spec: &IamUserSpec) -> Result<IamUser> {
        let mut state = self.enter(ADD_USER, &spec.name)?;
        state.users.entry(spec.name.clone()).or_default();
        Ok(IamUser {
            name: spec.name.clone(),
        })
    }

    async fn ensure_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        let mut state = self.enter(CREATE_BUCKET, &spec.name)?;
        state.buckets.insert(spec.name.clone());
        Ok(Bucket::new(&spec.name))
    }

    async fn ensure_policy(&self, name: &str, document: &str) -> Result<IamPolicy> {
        let mut state = self.enter(ADD_POLICY, name)?;
        state.policies.insert(name.to_string(), document.to_string());
        Ok(IamPolicy {
            name: name.to_string(),
        })
    }

    async fn attach_policy(&self, user: &str, policy: &IamPolicy) -> Result<()> {
        let mut state = self.enter(ATTACH_POLICY, &format!("{user}/{}", policy.name))?;
        if !state.policies.contains_key(&policy.name) {
            return Err(no_such_entity(ATTACH_POLICY, "policy", &policy.name));
        }
        let user_state = state
            .users
            .get_mut(user)
            .ok_or_else(|| no_such_entity(ATTACH_POLICY, "user", user))?;
        user_state.policies.insert(policy.name.clone());
        Ok(())
    }

    async fn list_service_accounts(&self, user: &str) -> Result<Vec<String>> {
        let state = self.enter(LIST_SERVICE_ACCOUNTS, user)?;
        Ok(state
            .users
            .get(user)
            .map(|u| {
                u.service_accounts
                    .iter()
                    .map(|s| s.account.access_key.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_service_account(&self, user: &str, policy: &str) -> Result<ServiceAccount> {
        let mut state = self.enter(ADD_SERVICE_ACCOUNT, user)?;
        state.next_key += 1;
        let n = state.next_key;
        let user_state = state
            .users
            .get_mut(user)
            .ok_or_else(|| no_such_entity(ADD_SERVICE_ACCOUNT, "user", user))?;

        let account = ServiceAccount {
            access_key: format!("BWAK{n:012}"),
            secret_key: format!("bwsk-{user}-{n:08}"),
        };
        user_state.service_accounts.push(StoredAccount {
            account: account.clone(),
            policy: policy.to_string(),
        });
        Ok(account)
    }

    async fn update_service_account(&self, access_key: &str, policy: &str) -> Result<()> {
        let mut state = self.enter(UPDATE_SERVICE_ACCOUNT, access_key)?;
        let stored = state
            .account_mut(access_key)
            .ok_or_else(|| no_such_entity(UPDATE_SERVICE_ACCOUNT, "service account", access_key))?;
        stored.policy = policy.to_string();
        Ok(())
    }

    async fn delete_service_account(&self, access_key: &str) -> Result<()> {
        let mut state = self.enter(DELETE_SERVICE_ACCOUNT, access_key)?;
        for user in state.users.values_mut() {
            user.service_accounts
                .retain(|s| s.account.access_key != access_key);
        }
        Ok(())
    }

    async fn detach_policy(&self, user: &str, policy_name: &str) -> Result<()> {
        let mut state = self.enter(DETACH_POLICY, &format!("{user}/{policy_name}"))?;
        if let Some(u) = state.users.get_mut(user) {
            u.policies.remove(policy_name);
        }
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<()> {
        let mut state = self.enter(REMOVE_POLICY, name)?;
        if state.users.values().any(|u| u.policies.contains(name)) {
            return Err(ProvisionError::provider(
                REMOVE_POLICY,
                format!("policy {name} is still attached"),
            ));
        }
        state.policies.remove(name);
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut state = self.enter(DELETE_BUCKET, name)?;
        state.buckets.remove(name);
        Ok(())
    }

    async fn delete_user(&self, spec: &IamUserSpec) -> Result<()> {
        let mut state = self.enter(REMOVE_USER, &spec.name)?;
        let Some(user) = state.users.get(&spec.name) else {
            return Ok(());
        };
        let attached = !user.policies.is_empty() || !user.service_accounts.is_empty();
        if attached && !spec.force_destroy {
            return Err(ProvisionError::provider(
                REMOVE_USER,
                format!("user {} still has policies or service accounts", spec.name),
            ));
        }
        state.users.remove(&spec.name);
        Ok(())
    }
}
