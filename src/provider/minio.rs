// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Provider for a MinIO server: buckets through its S3 API, users, policies
//! and service accounts through its admin API.

use super::admin::{AdminClient, HttpTransport};
use super::operations::*;
use super::{Bucket, IamPolicy, IamUser, ObjectStorage, ServiceAccount};
use crate::config::RuntimeSettings;
use crate::constants::{DEFAULT_REGION, ENV_PREFIX, OPERATOR_NAME};
use crate::declare::{BucketSpec, IamUserSpec};
use crate::error::{ConfigError, ProvisionError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as S3Client;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const USER_SECRET_LEN: usize = 40;

pub struct MinioProvider {
    s3: S3Client,
    admin: AdminClient,
    region: String,
}

impl MinioProvider {
    /// Connect to the server at `BUCKETWRIGHT_ENDPOINT` with the admin
    /// credentials from the settings
    pub async fn connect(settings: &RuntimeSettings) -> std::result::Result<Self, ConfigError> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| ConfigError::Missing(format!("{ENV_PREFIX}ENDPOINT")))?;
        let credentials = settings
            .credentials
            .clone()
            .ok_or_else(|| ConfigError::Missing(format!("{ENV_PREFIX}ACCESS_KEY")))?;

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()))
            .credentials_provider(Credentials::new(
                &credentials.access_key,
                &credentials.secret_key,
                None,
                None,
                OPERATOR_NAME,
            ))
            .endpoint_url(endpoint.as_str().trim_end_matches('/'))
            .load()
            .await;

        // MinIO does not serve virtual-hosted buckets by default
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        let admin = AdminClient::new(
            endpoint,
            credentials,
            &settings.region,
            Arc::new(HttpTransport::new()),
        );

        Ok(Self::from_parts(S3Client::from_conf(s3_config), admin, &settings.region))
    }

    pub fn from_parts(s3: S3Client, admin: AdminClient, region: &str) -> Self {
        Self {
            s3,
            admin,
            region: region.to_string(),
        }
    }
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(USER_SECRET_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
impl ObjectStorage for MinioProvider {
    #[instrument(skip(self, spec), fields(user = %spec.name))]
    async fn ensure_user(&self, spec: &IamUserSpec) -> Result<IamUser> {
        if self.admin.user_info(&spec.name).await?.is_some() {
            info!("User {} already exists, adopting it", spec.name);
        } else {
            self.admin.add_user(&spec.name, &generate_secret()).await?;
            info!("Created user {}", spec.name);
        }

        Ok(IamUser {
            name: spec.name.clone(),
        })
    }

    #[instrument(skip(self, spec), fields(bucket = %spec.name))]
    async fn ensure_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        let mut request = self.s3.create_bucket().bucket(&spec.name);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => info!("Created bucket {}", spec.name),
            Err(e) => {
                let err = e.into_service_error();
                if !err.is_bucket_already_owned_by_you() {
                    return Err(ProvisionError::provider(CREATE_BUCKET, DisplayErrorContext(&err)));
                }
                info!("Bucket {} already exists, adopting it", spec.name);
            }
        }

        Ok(Bucket::new(&spec.name))
    }

    #[instrument(skip(self, document))]
    async fn ensure_policy(&self, name: &str, document: &str) -> Result<IamPolicy> {
        self.admin.add_canned_policy(name, document).await?;
        info!("Policy {} set", name);
        Ok(IamPolicy {
            name: name.to_string(),
        })
    }

    #[instrument(skip(self, policy), fields(policy = %policy.name))]
    async fn attach_policy(&self, user: &str, policy: &IamPolicy) -> Result<()> {
        if self.admin.attach_policy(user, &policy.name).await? {
            info!("Attached policy {} to user {}", policy.name, user);
        } else {
            debug!("Policy {} already attached to user {}", policy.name, user);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_service_accounts(&self, user: &str) -> Result<Vec<String>> {
        self.admin.list_service_accounts(user).await
    }

    #[instrument(skip(self, policy))]
    async fn create_service_account(&self, user: &str, policy: &str) -> Result<ServiceAccount> {
        let account = self.admin.add_service_account(user, policy).await?;
        info!("Issued service account {} for user {}", account.access_key, user);
        Ok(account)
    }

    #[instrument(skip(self, policy))]
    async fn update_service_account(&self, access_key: &str, policy: &str) -> Result<()> {
        self.admin.update_service_account(access_key, policy).await?;
        debug!("Refreshed policy of service account {}", access_key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_service_account(&self, access_key: &str) -> Result<()> {
        if self.admin.delete_service_account(access_key).await? {
            info!("Deleted service account {}", access_key);
        } else {
            debug!("Service account {} already gone", access_key);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn detach_policy(&self, user: &str, policy_name: &str) -> Result<()> {
        if self.admin.detach_policy(user, policy_name).await? {
            info!("Detached policy {} from user {}", policy_name, user);
        } else {
            debug!("Policy {} not attached to {}, nothing to detach", policy_name, user);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_policy(&self, name: &str) -> Result<()> {
        if self.admin.remove_canned_policy(name).await? {
            info!("Deleted policy {}", name);
        } else {
            debug!("Policy {} already gone", name);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_bucket(&self, name: &str) -> Result<()> {
        match self.s3.delete_bucket().bucket(name).send().await {
            Ok(_) => info!("Deleted bucket {}", name),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() != Some("NoSuchBucket") {
                    return Err(ProvisionError::provider(DELETE_BUCKET, DisplayErrorContext(&err)));
                }
                debug!("Bucket {} already gone", name);
            }
        }
        Ok(())
    }

    #[instrument(skip(self, spec), fields(user = %spec.name))]
    async fn delete_user(&self, spec: &IamUserSpec) -> Result<()> {
        let Some(info) = self.admin.user_info(&spec.name).await? else {
            debug!("User {} already gone", spec.name);
            return Ok(());
        };

        let policies = info.policies();
        let accounts = self.admin.list_service_accounts(&spec.name).await?;
        if !spec.force_destroy && (!policies.is_empty() || !accounts.is_empty()) {
            return Err(ProvisionError::provider(
                REMOVE_USER,
                format!("user {} still has policies or service accounts", spec.name),
            ));
        }

        for access_key in &accounts {
            self.delete_service_account(access_key).await?;
        }
        for policy in &policies {
            self.detach_policy(&spec.name, policy).await?;
        }

        if self.admin.remove_user(&spec.name).await? {
            info!("Deleted user {}", spec.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;
    use crate::test_utils::MockAdmin;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::create_bucket::{CreateBucketError, CreateBucketOutput};
    use aws_sdk_s3::operation::delete_bucket::{DeleteBucketError, DeleteBucketOutput};
    use aws_sdk_s3::types::error::{BucketAlreadyExists, BucketAlreadyOwnedByYou};
    use aws_smithy_mocks::{mock, mock_client, Rule, RuleMode};
    use url::Url;

    fn admin(mock: &MockAdmin) -> AdminClient {
        AdminClient::new(
            Url::parse("http://minio.minio.svc:9000").unwrap(),
            StaticCredentials {
                access_key: "root".to_string(),
                secret_key: MockAdmin::SECRET.to_string(),
            },
            DEFAULT_REGION,
            Arc::new(mock.clone()),
        )
    }

    fn provider(rules: &[&Rule], mock: &MockAdmin, region: &str) -> MinioProvider {
        let s3 = mock_client!(aws_sdk_s3, RuleMode::MatchAny, rules.iter().copied());
        MinioProvider::from_parts(s3, admin(mock), region)
    }

    /// An S3 client for tests that only talk to the admin API
    fn unused_bucket_rule() -> Rule {
        mock!(S3Client::delete_bucket).then_output(|| DeleteBucketOutput::builder().build())
    }

    fn user(force_destroy: bool) -> IamUserSpec {
        IamUserSpec {
            name: "ns-svc".to_string(),
            force_destroy,
        }
    }

    fn bucket() -> BucketSpec {
        BucketSpec {
            name: "ns-rel".to_string(),
        }
    }

    fn targets(mock: &MockAdmin) -> Vec<String> {
        mock.requests().into_iter().map(|r| r.target).collect()
    }

    #[tokio::test]
    async fn test_bucket_owned_by_us_is_adopted() {
        let rule = mock!(S3Client::create_bucket)
            .match_requests(|req| req.bucket() == Some("ns-rel"))
            .then_error(|| {
                CreateBucketError::BucketAlreadyOwnedByYou(BucketAlreadyOwnedByYou::builder().build())
            });
        let provider = provider(&[&rule], &MockAdmin::new(), DEFAULT_REGION);

        let bucket = provider.ensure_bucket(&bucket()).await.unwrap();

        assert_eq!(bucket.arn, "arn:aws:s3:::ns-rel");
        assert_eq!(rule.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_bucket_owned_by_someone_else_fails() {
        let rule = mock!(S3Client::create_bucket).then_error(|| {
            CreateBucketError::BucketAlreadyExists(BucketAlreadyExists::builder().build())
        });
        let provider = provider(&[&rule], &MockAdmin::new(), DEFAULT_REGION);

        let err = provider.ensure_bucket(&bucket()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Provider { operation, .. } if operation == CREATE_BUCKET));
    }

    #[tokio::test]
    async fn test_bucket_outside_default_region_has_location_constraint() {
        let rule = mock!(S3Client::create_bucket)
            .match_requests(|req| {
                req.create_bucket_configuration()
                    .and_then(|c| c.location_constraint())
                    .map(|l| l.as_str())
                    == Some("eu-west-1")
            })
            .then_output(|| CreateBucketOutput::builder().build());
        let provider = provider(&[&rule], &MockAdmin::new(), "eu-west-1");

        provider.ensure_bucket(&bucket()).await.unwrap();
        assert_eq!(rule.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_bucket_delete_succeeds() {
        let rule = mock!(S3Client::delete_bucket).then_error(|| {
            DeleteBucketError::generic(ErrorMetadata::builder().code("NoSuchBucket").build())
        });
        let provider = provider(&[&rule], &MockAdmin::new(), DEFAULT_REGION);

        provider.delete_bucket("ns-rel").await.unwrap();
        assert_eq!(rule.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_bucket_delete_failure_is_reported() {
        let rule = mock!(S3Client::delete_bucket).then_error(|| {
            DeleteBucketError::generic(ErrorMetadata::builder().code("BucketNotEmpty").build())
        });
        let provider = provider(&[&rule], &MockAdmin::new(), DEFAULT_REGION);

        let err = provider.delete_bucket("ns-rel").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Provider { operation, .. } if operation == DELETE_BUCKET));
    }

    #[tokio::test]
    async fn test_existing_user_is_adopted() {
        let mock = MockAdmin::new().on("GET", "user-info", 200, br#"{"status":"enabled"}"#.to_vec());
        let provider = provider(&[&unused_bucket_rule()], &mock, DEFAULT_REGION);

        provider.ensure_user(&user(true)).await.unwrap();

        assert_eq!(targets(&mock), vec!["GET /minio/admin/v3/user-info?accessKey=ns-svc"]);
    }

    #[tokio::test]
    async fn test_missing_user_is_created_with_generated_secret() {
        let mock = MockAdmin::new()
            .on_error("GET", "user-info", 404, "XMinioAdminNoSuchUser")
            .on("PUT", "add-user", 200, Vec::new());
        let provider = provider(&[&unused_bucket_rule()], &mock, DEFAULT_REGION);

        provider.ensure_user(&user(true)).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].target, "PUT /minio/admin/v3/add-user?accessKey=ns-svc");
        let body = requests[1].opened();
        assert_eq!(body["status"], "enabled");
        assert_eq!(body["secretKey"].as_str().unwrap().len(), USER_SECRET_LEN);
    }

    #[tokio::test]
    async fn test_service_account_is_scoped_by_policy() {
        let mock = MockAdmin::new().on_sealed(
            "PUT",
            "add-service-account",
            &serde_json::json!({"credentials": {"accessKey": "SAKEY", "secretKey": "SASECRET"}}),
        );
        let provider = provider(&[&unused_bucket_rule()], &mock, DEFAULT_REGION);
        let document = crate::policy::document("arn:aws:s3:::ns-rel", crate::policy::AclMode::ReadOnly)
            .unwrap();

        let account = provider.create_service_account("ns-svc", &document).await.unwrap();

        assert_eq!(account.access_key, "SAKEY");
        let body = mock.requests()[0].opened();
        assert_eq!(body["targetUser"], "ns-svc");
        assert_eq!(body["policy"], serde_json::from_str::<serde_json::Value>(&document).unwrap());
    }

    #[tokio::test]
    async fn test_force_destroy_removes_accounts_and_policies_first() {
        let mock = MockAdmin::new()
            .on("GET", "user-info", 200, br#"{"policyName":"ns-svc"}"#.to_vec())
            .on_sealed(
                "GET",
                "list-service-accounts",
                &serde_json::json!({"accounts": [{"accessKey": "SAKEY"}]}),
            )
            .on("DELETE", "delete-service-account", 204, Vec::new())
            .on("POST", "idp/builtin/policy/detach", 200, Vec::new())
            .on("DELETE", "remove-user", 204, Vec::new());
        let provider = provider(&[&unused_bucket_rule()], &mock, DEFAULT_REGION);

        provider.delete_user(&user(true)).await.unwrap();

        assert_eq!(
            targets(&mock),
            vec![
                "GET /minio/admin/v3/user-info?accessKey=ns-svc",
                "GET /minio/admin/v3/list-service-accounts?user=ns-svc",
                "DELETE /minio/admin/v3/delete-service-account?accessKey=SAKEY",
                "POST /minio/admin/v3/idp/builtin/policy/detach",
                "DELETE /minio/admin/v3/remove-user?accessKey=ns-svc",
            ]
        );
        assert_eq!(
            mock.requests()[3].opened(),
            serde_json::json!({"policies": ["ns-svc"], "user": "ns-svc"})
        );
    }

    #[tokio::test]
    async fn test_delete_user_without_force_refuses_attached_user() {
        let mock = MockAdmin::new()
            .on("GET", "user-info", 200, br#"{"policyName":"ns-svc"}"#.to_vec())
            .on_sealed("GET", "list-service-accounts", &serde_json::json!({"accounts": []}));
        let provider = provider(&[&unused_bucket_rule()], &mock, DEFAULT_REGION);

        let err = provider.delete_user(&user(false)).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Provider { operation, .. } if operation == REMOVE_USER));
        assert!(!targets(&mock).iter().any(|t| t.contains("remove-user")));
    }

    #[tokio::test]
    async fn test_delete_of_missing_user_succeeds() {
        let mock = MockAdmin::new();
        let provider = provider(&[&unused_bucket_rule()], &mock, DEFAULT_REGION);

        provider.delete_user(&user(true)).await.unwrap();
        provider.delete_policy("ns-svc").await.unwrap();
        provider.delete_service_account("GHOST").await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_requires_endpoint_and_credentials() {
        let settings = RuntimeSettings::from_lookup(|_| None).unwrap();
        let Err(err) = MinioProvider::connect(&settings).await else {
            panic!("expected missing endpoint");
        };
        assert!(matches!(err, ConfigError::Missing(key) if key == "BUCKETWRIGHT_ENDPOINT"));
    }
}
