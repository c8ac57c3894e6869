// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bucket access policy documents.

use crate::error::{ConfigError, ProvisionError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

pub const POLICY_VERSION: &str = "2012-10-17";

/// Access mode applied to the bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclMode {
    Public,
    ReadOnly,
    Private,
}

impl AclMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclMode::Public => "public",
            AclMode::ReadOnly => "readonly",
            AclMode::Private => "private",
        }
    }

    fn sid(&self) -> &'static str {
        match self {
            AclMode::Public => "PublicBucketAccess",
            AclMode::ReadOnly => "ReadOnlyBucketAccess",
            AclMode::Private => "ListAllBucket",
        }
    }

    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            AclMode::Public => &["s3:Put*", "s3:Get*", "s3:List*"],
            AclMode::ReadOnly => &["s3:ListBucket", "s3:GetObject", "s3:GetObjectVersion"],
            AclMode::Private => &[
                "s3:ListBucket",
                "s3:PutObject",
                "s3:GetObject",
                "s3:DeleteObject",
            ],
        }
    }
}

impl FromStr for AclMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "public" => Ok(AclMode::Public),
            "readonly" => Ok(AclMode::ReadOnly),
            "private" => Ok(AclMode::Private),
            other => Err(ConfigError::InvalidAcl(other.to_string())),
        }
    }
}

impl fmt::Display for AclMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: &'static str,
    pub statement: Vec<Statement>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub sid: &'static str,
    pub effect: &'static str,
    pub action: Vec<&'static str>,
    pub principal: &'static str,
    pub resource: Vec<String>,
}

impl PolicyDocument {
    /// Single-statement document granting `acl` on the bucket and every key in it
    pub fn for_bucket(bucket_arn: &str, acl: AclMode) -> Result<Self> {
        if bucket_arn.trim().is_empty() {
            return Err(ProvisionError::InvalidInput(
                "bucket ARN must not be empty".to_string(),
            ));
        }

        // The private statement still grants to every principal.
        if acl == AclMode::Private {
            warn!(
                "Private ACL policy for {} uses an unrestricted principal",
                bucket_arn
            );
        }

        Ok(PolicyDocument {
            version: POLICY_VERSION,
            statement: vec![Statement {
                sid: acl.sid(),
                effect: "Allow",
                action: acl.actions().to_vec(),
                principal: "*",
                resource: vec![bucket_arn.to_string(), format!("{bucket_arn}/*")],
            }],
        })
    }
}

/// Render the policy document for `bucket_arn` as JSON
pub fn document(bucket_arn: &str, acl: AclMode) -> Result<String> {
    Ok(serde_json::to_string(&PolicyDocument::for_bucket(
        bucket_arn, acl,
    )?)?)
}
