// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes and MinIO admin API responses.

use crate::error::Result as ProvisionResult;
use crate::provider::admin::{Transport, ADMIN_PATH};
use crate::provider::crypto;
use async_trait::async_trait;
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

type Responses = HashMap<(String, String), (u16, String)>;

/// A mock HTTP service that returns predefined responses keyed on method and
/// path, and remembers every request it served.
#[derive(Clone, Default)]
pub struct MockService {
    responses: Arc<Mutex<Responses>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Requests served so far as `METHOD path?query`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "https://kubernetes.default.svc")
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_else(|| path.clone());
        self.requests
            .lock()
            .unwrap()
            .push(format!("{method} {target}"));

        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(&(method, path.clone()))
            .cloned()
            .unwrap_or_else(|| (404, not_found_json("path", &path)));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a mock Secret JSON response
pub fn secret_json(namespace: &str, name: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "test-uid"
        },
        "type": "Opaque"
    })
    .to_string()
}

/// Create a mock Secret JSON response carrying credentials, as the API
/// server returns them (base64 `data`)
pub fn credentials_secret_json(namespace: &str, name: &str, access_key_b64: &str, secret_key_b64: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "test-uid"
        },
        "data": {
            "ACCESS_KEY": access_key_b64,
            "SECRET_KEY": secret_key_b64
        },
        "type": "Opaque"
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

/// A request received by [`MockAdmin`]
#[derive(Debug, Clone)]
pub struct AdminRequest {
    /// `METHOD path?query`
    pub target: String,
    pub authorization: String,
    pub content_sha256: Option<String>,
    pub body: Vec<u8>,
}

impl AdminRequest {
    /// The body unsealed with the admin secret key, as JSON
    pub fn opened(&self) -> serde_json::Value {
        let plain = crypto::decrypt(MockAdmin::SECRET, &self.body).unwrap();
        serde_json::from_slice(&plain).unwrap()
    }
}

/// A stand-in for the MinIO admin API keyed on method and the path below
/// the admin prefix. Unknown routes answer 404.
#[derive(Clone, Default)]
pub struct MockAdmin {
    responses: Arc<Mutex<HashMap<(String, String), (u16, Vec<u8>)>>>,
    requests: Arc<Mutex<Vec<AdminRequest>>>,
}

impl MockAdmin {
    /// Admin secret key the mock seals and unseals payloads with
    pub const SECRET: &'static str = "minio-admin-secret";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: &str, path: &str, status: u16, body: Vec<u8>) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), format!("{ADMIN_PATH}/{path}")),
            (status, body),
        );
        self
    }

    /// Answer with an admin API error carrying `code`
    pub fn on_error(self, method: &str, path: &str, status: u16, code: &str) -> Self {
        let body = serde_json::json!({"Code": code, "Message": format!("{code} raised by mock")});
        self.on(method, path, status, body.to_string().into_bytes())
    }

    /// Answer 200 with `value` sealed under [`MockAdmin::SECRET`]
    pub fn on_sealed(self, method: &str, path: &str, value: &serde_json::Value) -> Self {
        let sealed = crypto::encrypt(Self::SECRET, value.to_string().as_bytes()).unwrap();
        self.on(method, path, 200, sealed)
    }

    pub fn requests(&self) -> Vec<AdminRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockAdmin {
    async fn send(&self, request: Request<Vec<u8>>) -> ProvisionResult<Response<Vec<u8>>> {
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_else(|| path.clone());

        self.requests.lock().unwrap().push(AdminRequest {
            target: format!("{method} {target}"),
            authorization: header("authorization").unwrap_or_default(),
            content_sha256: header("x-amz-content-sha256"),
            body: request.body().clone(),
        });

        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(&(method, path))
            .cloned()
            .unwrap_or_else(|| (404, Vec::new()));

        Ok(Response::builder().status(status).body(body).unwrap())
    }
}
