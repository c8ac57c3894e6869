// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The tool name, used as the server-side apply field manager and the
/// `managed-by` label value
pub const OPERATOR_NAME: &str = "bucketwright";

/// Resource configuration keys
pub mod keys {
    pub const NAME: &str = "Name";
    pub const NAMESPACE: &str = "Namespace";
    pub const RELEASE_NAME: &str = "ReleaseName";
    pub const ACL: &str = "ACL";
}

/// Prefix for environment variables read by bucketwright
pub const ENV_PREFIX: &str = "BUCKETWRIGHT_";

/// Labels placed on the published credentials secret
pub mod labels {
    pub const CONFIGURATION: &str = "epinio.io/configuration";
    pub const CONFIGURATION_ORIGIN: &str = "epinio.io/configuration-origin";
    pub const CONFIGURATION_TYPE: &str = "epinio.io/configuration-type";
    pub const INSTANCE: &str = "app.kubernetes.io/instance";
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const NAME: &str = "app.kubernetes.io/name";
}

/// Keys of the credentials secret payload
pub mod secret_keys {
    pub const ACCESS_KEY: &str = "ACCESS_KEY";
    pub const SECRET_KEY: &str = "SECRET_KEY";
}

/// Logical resource names used in logs and failure reports
pub mod resources {
    pub const IAM_USER: &str = "minio-iam-user";
    pub const BUCKET: &str = "minio-s3-bucket";
    pub const POLICY_DOCUMENT: &str = "policy-document";
    pub const IAM_POLICY: &str = "minio-iam-policy";
    pub const POLICY_ATTACHMENT: &str = "minio-user-policy";
    pub const SERVICE_ACCOUNT: &str = "service-account";
    pub const SECRET: &str = "service-account-secret";
    pub const STALE_SERVICE_ACCOUNTS: &str = "stale-service-accounts";
}

pub const DEFAULT_REGION: &str = "us-east-1";
