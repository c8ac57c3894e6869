// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Object storage providers: users, buckets, policies and service accounts.

pub mod admin;
pub mod crypto;
pub mod memory;
pub mod minio;

pub use memory::MemoryProvider;
pub use minio::MinioProvider;

use crate::declare::{BucketSpec, IamUserSpec};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Operation names used in logs and errors
pub mod operations {
    pub const USER_INFO: &str = "UserInfo";
    pub const ADD_USER: &str = "AddUser";
    pub const CREATE_BUCKET: &str = "CreateBucket";
    pub const ADD_POLICY: &str = "AddCannedPolicy";
    pub const ATTACH_POLICY: &str = "AttachPolicy";
    pub const LIST_SERVICE_ACCOUNTS: &str = "ListServiceAccounts";
    pub const ADD_SERVICE_ACCOUNT: &str = "AddServiceAccount";
    pub const UPDATE_SERVICE_ACCOUNT: &str = "UpdateServiceAccount";
    pub const DELETE_SERVICE_ACCOUNT: &str = "DeleteServiceAccount";
    pub const DETACH_POLICY: &str = "DetachPolicy";
    pub const REMOVE_POLICY: &str = "RemoveCannedPolicy";
    pub const DELETE_BUCKET: &str = "DeleteBucket";
    pub const REMOVE_USER: &str = "RemoveUser";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamUser {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub arn: String,
}

impl Bucket {
    pub fn new(name: &str) -> Self {
        Bucket {
            name: name.to_string(),
            arn: bucket_arn(name),
        }
    }
}

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamPolicy {
    pub name: String,
}

/// Credential pair derived for a user
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Create-or-adopt operations against a MinIO-compatible control plane.
///
/// Creating something that already exists under the same name adopts it,
/// deleting something that is already gone succeeds.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn ensure_user(&self, spec: &IamUserSpec) -> Result<IamUser>;

    async fn ensure_bucket(&self, spec: &BucketSpec) -> Result<Bucket>;

    /// Create the named policy, or replace its document
    async fn ensure_policy(&self, name: &str, document: &str) -> Result<IamPolicy>;

    async fn attach_policy(&self, user: &str, policy: &IamPolicy) -> Result<()>;

    /// Access keys of the service accounts owned by `user`
    async fn list_service_accounts(&self, user: &str) -> Result<Vec<String>>;

    /// Issue a new service account for `user`, restricted by `policy`
    async fn create_service_account(&self, user: &str, policy: &str) -> Result<ServiceAccount>;

    /// Replace the policy restricting an existing service account
    async fn update_service_account(&self, access_key: &str, policy: &str) -> Result<()>;

    async fn delete_service_account(&self, access_key: &str) -> Result<()>;

    async fn detach_policy(&self, user: &str, policy_name: &str) -> Result<()>;

    async fn delete_policy(&self, name: &str) -> Result<()>;

    async fn delete_bucket(&self, name: &str) -> Result<()>;

    async fn delete_user(&self, spec: &IamUserSpec) -> Result<()>;
}
