// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Publishing the service account credentials as a namespaced Secret

use crate::constants::{secret_keys, OPERATOR_NAME};
use crate::declare::SecretSpec;
use crate::error::{ProvisionError, Result};
use crate::provider::ServiceAccount;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{DeleteParams, ObjectMeta, Patch, PatchParams},
    Api, Client, ResourceExt,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// The secret as currently stored, if any
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Create or update the secret, returning what the store now holds
    async fn apply(&self, secret: &Secret) -> Result<Secret>;

    /// Remove the secret; absent secrets are not an error
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Build the credentials secret for `spec` carrying `account`'s keys
pub fn render_secret(spec: &SecretSpec, account: &ServiceAccount) -> Result<Secret> {
    if account.access_key.is_empty() || account.secret_key.is_empty() {
        return Err(ProvisionError::InvalidInput(format!(
            "service account for secret {}/{} has an empty key",
            spec.namespace, spec.name
        )));
    }

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(spec.labels.clone()),
            ..Default::default()
        },
        string_data: Some(BTreeMap::from([
            (secret_keys::ACCESS_KEY.to_string(), account.access_key.clone()),
            (secret_keys::SECRET_KEY.to_string(), account.secret_key.clone()),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    })
}

/// The credentials a published secret carries, if it carries a complete pair
pub fn published_credentials(secret: &Secret) -> Option<ServiceAccount> {
    let value = |key: &str| -> Option<String> {
        let from_string = secret.string_data.as_ref().and_then(|d| d.get(key)).cloned();
        let from_data = || {
            secret
                .data
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(|v| String::from_utf8(v.0.clone()).ok())
        };
        from_string.or_else(from_data).filter(|v| !v.is_empty())
    };

    Some(ServiceAccount {
        access_key: value(secret_keys::ACCESS_KEY)?,
        secret_key: value(secret_keys::SECRET_KEY)?,
    })
}

pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(secrets.get_opt(name).await?)
    }

    #[instrument(
        skip(self, secret),
        fields(secret = %format!("{}/{}", secret.namespace().unwrap_or_default(), secret.name_any()))
    )]
    async fn apply(&self, secret: &Secret) -> Result<Secret> {
        let namespace = secret.namespace().ok_or_else(|| {
            ProvisionError::InvalidInput(format!("secret {} has no namespace", secret.name_any()))
        })?;
        let name = secret.name_any();

        // Apply the secret (create or update)
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let pp = PatchParams::apply(OPERATOR_NAME).force();
        let applied = secrets.patch(&name, &pp, &Patch::Apply(secret)).await?;

        info!("Applied secret {}/{}", namespace, name);
        Ok(applied)
    }

    #[instrument(skip(self))]
    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        match secrets.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted secret {}/{}", namespace, name);
                Ok(())
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!("Secret {}/{} already gone", namespace, name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps applied secrets in memory, for previews and tests
#[derive(Debug, Default)]
pub struct RecordingSecretStore {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
}

impl RecordingSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.secrets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.lock().is_empty()
    }
}

#[async_trait]
impl SecretStore for RecordingSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.stored(namespace, name))
    }

    async fn apply(&self, secret: &Secret) -> Result<Secret> {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        self.secrets.lock().insert(key, secret.clone());
        Ok(secret.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.secrets
            .lock()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{credentials_secret_json, not_found_json, secret_json, MockService};

    fn spec() -> SecretSpec {
        SecretSpec {
            name: "rel-minio".to_string(),
            namespace: "ns".to_string(),
            labels: BTreeMap::from([("epinio.io/configuration".to_string(), "true".to_string())]),
        }
    }

    fn account() -> ServiceAccount {
        ServiceAccount {
            access_key: "AKEXAMPLE".to_string(),
            secret_key: "s3cr3t".to_string(),
        }
    }

    #[test]
    fn test_render_secret_payload_has_exactly_two_keys() {
        let secret = render_secret(&spec(), &account()).unwrap();
        let data = secret.string_data.unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data["ACCESS_KEY"], "AKEXAMPLE");
        assert_eq!(data["SECRET_KEY"], "s3cr3t");
    }

    #[test]
    fn test_render_secret_metadata() {
        let secret = render_secret(&spec(), &account()).unwrap();

        assert_eq!(secret.metadata.name.as_deref(), Some("rel-minio"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(secret.metadata.labels, Some(spec().labels));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
    }

    #[test]
    fn test_render_secret_rejects_empty_keys() {
        let empty = ServiceAccount {
            access_key: String::new(),
            secret_key: "s3cr3t".to_string(),
        };
        assert!(matches!(
            render_secret(&spec(), &empty),
            Err(ProvisionError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_kube_store_applies_secret() {
        let client = MockService::new()
            .on_patch(
                "/api/v1/namespaces/ns/secrets/rel-minio",
                200,
                &secret_json("ns", "rel-minio"),
            )
            .into_client();
        let store = KubeSecretStore::new(client);

        let applied = store
            .apply(&render_secret(&spec(), &account()).unwrap())
            .await
            .unwrap();

        assert_eq!(applied.name_any(), "rel-minio");
        assert_eq!(applied.namespace().as_deref(), Some("ns"));
    }

    #[tokio::test]
    async fn test_kube_store_uses_server_side_apply() {
        let mock = MockService::new().on_patch(
            "/api/v1/namespaces/ns/secrets/rel-minio",
            200,
            &secret_json("ns", "rel-minio"),
        );
        let store = KubeSecretStore::new(mock.clone().into_client());

        store
            .apply(&render_secret(&spec(), &account()).unwrap())
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("PATCH /api/v1/namespaces/ns/secrets/rel-minio?"));
        assert!(requests[0].contains("fieldManager=bucketwright"));
        assert!(requests[0].contains("force=true"));
    }

    #[tokio::test]
    async fn test_kube_store_apply_requires_namespace() {
        let store = KubeSecretStore::new(MockService::new().into_client());
        let mut secret = render_secret(&spec(), &account()).unwrap();
        secret.metadata.namespace = None;

        assert!(matches!(
            store.apply(&secret).await,
            Err(ProvisionError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_kube_store_delete_missing_secret_succeeds() {
        let client = MockService::new()
            .on_delete(
                "/api/v1/namespaces/ns/secrets/rel-minio",
                404,
                &not_found_json("secrets", "rel-minio"),
            )
            .into_client();
        let store = KubeSecretStore::new(client);

        store.delete("ns", "rel-minio").await.unwrap();
    }

    #[tokio::test]
    async fn test_kube_store_delete_surfaces_other_errors() {
        let forbidden = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": "secrets \"rel-minio\" is forbidden",
            "reason": "Forbidden",
            "code": 403
        })
        .to_string();
        let client = MockService::new()
            .on_delete("/api/v1/namespaces/ns/secrets/rel-minio", 403, &forbidden)
            .into_client();
        let store = KubeSecretStore::new(client);

        assert!(matches!(
            store.delete("ns", "rel-minio").await,
            Err(ProvisionError::KubeError(_))
        ));
    }

    #[tokio::test]
    async fn test_recording_store_round_trip() {
        let store = RecordingSecretStore::new();
        store
            .apply(&render_secret(&spec(), &account()).unwrap())
            .await
            .unwrap();
        assert!(store.stored("ns", "rel-minio").is_some());

        let fetched = store.get("ns", "rel-minio").await.unwrap().unwrap();
        assert_eq!(published_credentials(&fetched), Some(account()));

        store.delete("ns", "rel-minio").await.unwrap();
        assert!(store.is_empty());
        assert!(store.get("ns", "rel-minio").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kube_store_reads_published_credentials() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/ns/secrets/rel-minio",
                200,
                &credentials_secret_json("ns", "rel-minio", "QUtFWEFNUExF", "czNjcjN0"),
            )
            .into_client();
        let store = KubeSecretStore::new(client);

        let secret = store.get("ns", "rel-minio").await.unwrap().unwrap();
        assert_eq!(published_credentials(&secret), Some(account()));
    }

    #[tokio::test]
    async fn test_kube_store_get_missing_secret() {
        let store = KubeSecretStore::new(MockService::new().into_client());
        assert!(store.get("ns", "rel-minio").await.unwrap().is_none());
    }

    #[test]
    fn test_incomplete_secret_carries_no_credentials() {
        let mut secret = render_secret(&spec(), &account()).unwrap();
        assert_eq!(published_credentials(&secret), Some(account()));

        if let Some(data) = secret.string_data.as_mut() {
            data.remove("SECRET_KEY");
        }
        assert_eq!(published_credentials(&secret), None);
        assert_eq!(published_credentials(&secret_from_json(&secret_json("ns", "x"))), None);
    }

    fn secret_from_json(raw: &str) -> Secret {
        serde_json::from_str(raw).unwrap()
    }
}
