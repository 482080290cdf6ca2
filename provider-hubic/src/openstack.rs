//! Minimal OpenStack object-store client.
//!
//! One client per storage endpoint. Requests authenticate with the
//! `X-Auth-Token` header; responses come back raw so the caller can decide
//! between classification, the idempotent-delete exception, and the
//! single 401 retry.

use bridge_traits::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_cloud::{Result, StorageError};
use std::sync::Arc;

/// Client for one OpenStack storage endpoint.
pub struct OpenStackClient {
    http_client: Arc<dyn HttpClient>,
    /// Base endpoint URL: scheme, host, port, no account segment
    endpoint: String,
}

impl OpenStackClient {
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }

    /// Percent-encode a container path, segment by segment.
    fn encode_path(path: &str) -> String {
        path.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn object_url(&self, account: &str, container: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            account,
            container,
            Self::encode_path(path)
        )
    }

    async fn send(&self, token: &str, request: HttpRequest) -> Result<HttpResponse> {
        let request = request.header("X-Auth-Token", token);
        self.http_client.execute(request).await.map_err(StorageError::from)
    }

    /// HEAD one object; metadata comes back in the response headers.
    pub async fn head_object(
        &self,
        token: &str,
        account: &str,
        container: &str,
        path: &str,
    ) -> Result<HttpResponse> {
        let url = self.object_url(account, container, path);
        self.send(token, HttpRequest::new(HttpMethod::Head, url)).await
    }

    /// DELETE one object.
    pub async fn delete_object(
        &self,
        token: &str,
        account: &str,
        container: &str,
        path: &str,
    ) -> Result<HttpResponse> {
        let url = self.object_url(account, container, path);
        self.send(token, HttpRequest::new(HttpMethod::Delete, url)).await
    }

    /// List every object under `prefix`, recursively, as JSON.
    pub async fn list_objects(
        &self,
        token: &str,
        account: &str,
        container: &str,
        prefix: &str,
    ) -> Result<HttpResponse> {
        let url = format!(
            "{}/{}/{}?format=json&prefix={}",
            self.endpoint.trim_end_matches('/'),
            account,
            container,
            urlencoding::encode(&format!("{}/", prefix))
        );
        self.send(token, HttpRequest::new(HttpMethod::Get, url)).await
    }
}
