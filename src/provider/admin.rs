// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Client for the MinIO admin API: users, canned policies, policy
//! attachments and service accounts.
//!
//! Requests are SigV4-signed with the admin credentials. Bodies that carry
//! secrets travel sealed with the admin secret key (see [`super::crypto`]).

use super::crypto;
use super::operations::*;
use super::ServiceAccount;
use crate::config::StaticCredentials;
use crate::constants::OPERATOR_NAME;
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, SignableBody, SignableRequest, SigningParams, SigningSettings,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use http::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;
use url::Url;

pub const ADMIN_PATH: &str = "/minio/admin/v3";

/// Error codes the admin API answers with
pub mod codes {
    pub const NO_SUCH_USER: &str = "XMinioAdminNoSuchUser";
    pub const NO_SUCH_POLICY: &str = "XMinioAdminNoSuchPolicy";
    pub const NO_SUCH_SERVICE_ACCOUNT: &str = "XMinioAdminServiceAccountNotFound";
    pub const ALREADY_APPLIED: &str = "XMinioAdminPolicyChangeAlreadyApplied";
}

/// Sends a signed request and hands back the raw response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let request = reqwest::Request::try_from(request)
            .map_err(|e| ProvisionError::provider("AdminRequest", e))?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ProvisionError::provider("AdminRequest", e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProvisionError::provider("AdminRequest", e))?;

        Response::builder()
            .status(status)
            .body(body.to_vec())
            .map_err(|e| ProvisionError::provider("AdminRequest", e))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// A response the server produced, successful or not
struct Reply {
    status: StatusCode,
    body: Vec<u8>,
}

impl Reply {
    fn code(&self) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(&self.body)
            .ok()
            .map(|e| e.code)
    }

    /// The server reports that the target does not exist
    fn is_missing(&self, code: &str) -> bool {
        self.status == StatusCode::NOT_FOUND || self.code().as_deref() == Some(code)
    }

    fn into_body(self, operation: &str) -> Result<Vec<u8>> {
        if self.status.is_success() {
            return Ok(self.body);
        }
        let message = match serde_json::from_slice::<ErrorBody>(&self.body) {
            Ok(e) if e.message.is_empty() => format!("{} ({})", e.code, self.status),
            Ok(e) => format!("{}: {} ({})", e.code, e.message, self.status),
            Err(_) => format!("{}: {}", self.status, String::from_utf8_lossy(&self.body)),
        };
        Err(ProvisionError::provider(operation, message))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    /// Comma separated names of the policies attached to the user
    #[serde(rename = "policyName", default)]
    pub policy_name: String,
    #[serde(default)]
    pub status: String,
}

impl UserInfo {
    pub fn policies(&self) -> Vec<String> {
        self.policy_name
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddUserRequest<'a> {
    secret_key: &'a str,
    status: &'a str,
}

#[derive(Serialize)]
struct PolicyAssociation<'a> {
    policies: [&'a str; 1],
    user: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddServiceAccountRequest<'a> {
    policy: serde_json::Value,
    target_user: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateServiceAccountRequest {
    new_policy: serde_json::Value,
}

#[derive(Deserialize)]
struct AddServiceAccountResponse {
    credentials: AccountCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountCredentials {
    access_key: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct ListServiceAccountsResponse {
    #[serde(default)]
    accounts: Vec<AccountEntry>,
}

/// Older servers list bare access keys, newer ones an object per account
#[derive(Deserialize)]
#[serde(untagged)]
enum AccountEntry {
    Key(String),
    Info {
        #[serde(rename = "accessKey")]
        access_key: String,
    },
}

impl AccountEntry {
    fn into_access_key(self) -> String {
        match self {
            AccountEntry::Key(key) | AccountEntry::Info { access_key: key } => key,
        }
    }
}

pub struct AdminClient {
    endpoint: Url,
    credentials: StaticCredentials,
    region: String,
    transport: Arc<dyn Transport>,
}

impl AdminClient {
    pub fn new(
        endpoint: Url,
        credentials: StaticCredentials,
        region: &str,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            endpoint,
            credentials,
            region: region.to_string(),
            transport,
        }
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(&format!("{ADMIN_PATH}/{path}"));
        url.set_query(None);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    fn sign(&self, request: &mut Request<Vec<u8>>) -> Result<()> {
        let identity = Identity::new(
            Credentials::new(
                &self.credentials.access_key,
                &self.credentials.secret_key,
                None,
                None,
                OPERATOR_NAME,
            ),
            None,
        );
        let mut settings = SigningSettings::default();
        settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name("s3")
            .time(SystemTime::now())
            .settings(settings)
            .build()
            .map_err(|e| ProvisionError::provider("SignRequest", e))?
            .into();

        let uri = request.uri().to_string();
        let headers: Vec<(&str, &str)> = request
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str(), v.to_str().ok()?)))
            .collect();
        let signable = SignableRequest::new(
            request.method().as_str(),
            uri,
            headers.into_iter(),
            SignableBody::Bytes(request.body()),
        )
        .map_err(|e| ProvisionError::provider("SignRequest", e))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| ProvisionError::provider("SignRequest", e))?
            .into_parts();
        instructions.apply_to_request_http1x(request);
        Ok(())
    }

    async fn call(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<Reply> {
        let url = self.url(path, query);
        debug!("{} {} {}", operation, method, url.path());

        let mut request = Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(body)
            .map_err(|e| ProvisionError::provider(operation, e))?;
        self.sign(&mut request)?;

        let response = self.transport.send(request).await?;
        let status = response.status();
        Ok(Reply {
            status,
            body: response.into_body(),
        })
    }

    fn seal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        crypto::encrypt(&self.credentials.secret_key, &serde_json::to_vec(value)?)
    }

    fn open<T: DeserializeOwned>(&self, sealed: &[u8]) -> Result<T> {
        let plain = crypto::decrypt(&self.credentials.secret_key, sealed)?;
        Ok(serde_json::from_slice(&plain)?)
    }

    /// `None` when the user does not exist
    pub async fn user_info(&self, user: &str) -> Result<Option<UserInfo>> {
        let reply = self
            .call(USER_INFO, Method::GET, "user-info", &[("accessKey", user)], Vec::new())
            .await?;
        if reply.is_missing(codes::NO_SUCH_USER) {
            return Ok(None);
        }
        let body = reply.into_body(USER_INFO)?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    pub async fn add_user(&self, user: &str, secret_key: &str) -> Result<()> {
        let body = self.seal(&AddUserRequest {
            secret_key,
            status: "enabled",
        })?;
        self.call(ADD_USER, Method::PUT, "add-user", &[("accessKey", user)], body)
            .await?
            .into_body(ADD_USER)?;
        Ok(())
    }

    /// Returns whether the user existed
    pub async fn remove_user(&self, user: &str) -> Result<bool> {
        let reply = self
            .call(REMOVE_USER, Method::DELETE, "remove-user", &[("accessKey", user)], Vec::new())
            .await?;
        if reply.is_missing(codes::NO_SUCH_USER) {
            return Ok(false);
        }
        reply.into_body(REMOVE_USER)?;
        Ok(true)
    }

    /// Create or overwrite a canned policy
    pub async fn add_canned_policy(&self, name: &str, document: &str) -> Result<()> {
        self.call(
            ADD_POLICY,
            Method::PUT,
            "add-canned-policy",
            &[("name", name)],
            document.as_bytes().to_vec(),
        )
        .await?
        .into_body(ADD_POLICY)?;
        Ok(())
    }

    /// Returns whether the policy existed
    pub async fn remove_canned_policy(&self, name: &str) -> Result<bool> {
        let reply = self
            .call(REMOVE_POLICY, Method::DELETE, "remove-canned-policy", &[("name", name)], Vec::new())
            .await?;
        if reply.is_missing(codes::NO_SUCH_POLICY) {
            return Ok(false);
        }
        reply.into_body(REMOVE_POLICY)?;
        Ok(true)
    }

    /// Returns false when the policy was already attached
    pub async fn attach_policy(&self, user: &str, policy: &str) -> Result<bool> {
        self.change_association(ATTACH_POLICY, "idp/builtin/policy/attach", user, policy)
            .await
    }

    /// Returns false when there was nothing to detach
    pub async fn detach_policy(&self, user: &str, policy: &str) -> Result<bool> {
        self.change_association(DETACH_POLICY, "idp/builtin/policy/detach", user, policy)
            .await
    }

    async fn change_association(
        &self,
        operation: &str,
        path: &str,
        user: &str,
        policy: &str,
    ) -> Result<bool> {
        let body = self.seal(&PolicyAssociation {
            policies: [policy],
            user,
        })?;
        let reply = self.call(operation, Method::POST, path, &[], body).await?;
        if reply.code().as_deref() == Some(codes::ALREADY_APPLIED) {
            return Ok(false);
        }
        if operation == DETACH_POLICY && reply.is_missing(codes::NO_SUCH_USER) {
            return Ok(false);
        }
        reply.into_body(operation)?;
        Ok(true)
    }

    /// Issue a service account for `user`, scoped by `policy` as its session
    /// policy
    pub async fn add_service_account(&self, user: &str, policy: &str) -> Result<ServiceAccount> {
        let body = self.seal(&AddServiceAccountRequest {
            policy: serde_json::from_str(policy)?,
            target_user: user,
        })?;
        let sealed = self
            .call(ADD_SERVICE_ACCOUNT, Method::PUT, "add-service-account", &[], body)
            .await?
            .into_body(ADD_SERVICE_ACCOUNT)?;

        let response: AddServiceAccountResponse = self.open(&sealed)?;
        Ok(ServiceAccount {
            access_key: response.credentials.access_key,
            secret_key: response.credentials.secret_key,
        })
    }

    pub async fn update_service_account(&self, access_key: &str, policy: &str) -> Result<()> {
        let body = self.seal(&UpdateServiceAccountRequest {
            new_policy: serde_json::from_str(policy)?,
        })?;
        self.call(
            UPDATE_SERVICE_ACCOUNT,
            Method::POST,
            "update-service-account",
            &[("accessKey", access_key)],
            body,
        )
        .await?
        .into_body(UPDATE_SERVICE_ACCOUNT)?;
        Ok(())
    }

    /// Access keys of the service accounts owned by `user`
    pub async fn list_service_accounts(&self, user: &str) -> Result<Vec<String>> {
        let reply = self
            .call(
                LIST_SERVICE_ACCOUNTS,
                Method::GET,
                "list-service-accounts",
                &[("user", user)],
                Vec::new(),
            )
            .await?;
        if reply.is_missing(codes::NO_SUCH_USER) {
            return Ok(Vec::new());
        }
        let sealed = reply.into_body(LIST_SERVICE_ACCOUNTS)?;
        let response: ListServiceAccountsResponse = self.open(&sealed)?;
        Ok(response
            .accounts
            .into_iter()
            .map(AccountEntry::into_access_key)
            .collect())
    }

    /// Returns whether the service account existed
    pub async fn delete_service_account(&self, access_key: &str) -> Result<bool> {
        let reply = self
            .call(
                DELETE_SERVICE_ACCOUNT,
                Method::DELETE,
                "delete-service-account",
                &[("accessKey", access_key)],
                Vec::new(),
            )
            .await?;
        if reply.is_missing(codes::NO_SUCH_SERVICE_ACCOUNT) {
            return Ok(false);
        }
        reply.into_body(DELETE_SERVICE_ACCOUNT)?;
        Ok(true)
    }
}
