// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Desired resources for one service instance, derived purely from [`Config`].

use crate::config::{Config, Layout};
use crate::constants::{labels, OPERATOR_NAME};
use crate::policy::AclMode;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamUserSpec {
    pub name: String,
    /// Remove access keys and policy attachments when deleting the user
    pub force_destroy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamPolicySpec {
    pub name: String,
    pub acl: AclMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyAttachmentSpec {
    pub user_name: String,
    pub policy_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountSpec {
    pub target_user: String,
    pub acl: AclMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub layout: Layout,
    pub user: IamUserSpec,
    pub bucket: BucketSpec,
    pub policy: IamPolicySpec,
    pub attachment: PolicyAttachmentSpec,
    pub service_account: ServiceAccountSpec,
    pub secret: SecretSpec,
}

pub fn declare(config: &Config) -> Declaration {
    let layout = config.layout();
    let base = format!("{}-{}", config.namespace, config.name);

    let (bucket_name, secret_name) = match (&config.release_name, layout) {
        (Some(release), Layout::Release) => {
            (format!("{}-{}", config.namespace, release), format!("{release}-minio"))
        }
        _ => (base.clone(), format!("{base}-secret")),
    };

    let mut secret_labels = BTreeMap::from([
        (labels::CONFIGURATION.to_string(), "true".to_string()),
        (labels::CONFIGURATION_ORIGIN.to_string(), config.name.clone()),
        (labels::CONFIGURATION_TYPE.to_string(), "service".to_string()),
    ]);
    if let Some(release) = &config.release_name {
        secret_labels.insert(labels::INSTANCE.to_string(), release.clone());
        secret_labels.insert(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
        secret_labels.insert(labels::NAME.to_string(), "minio".to_string());
    }

    Declaration {
        layout,
        user: IamUserSpec {
            name: base.clone(),
            force_destroy: true,
        },
        bucket: BucketSpec { name: bucket_name },
        policy: IamPolicySpec {
            name: base.clone(),
            acl: config.acl,
        },
        attachment: PolicyAttachmentSpec {
            user_name: base.clone(),
            policy_name: base.clone(),
        },
        service_account: ServiceAccountSpec {
            target_user: base,
            acl: config.acl,
        },
        secret: SecretSpec {
            name: secret_name,
            namespace: config.namespace.clone(),
            labels: secret_labels,
        },
    }
}
