use super::{DaemonClient, DaemonConnectionError, DaemonFailure, DaemonTarget, ServerDetails};
use crate::config::DaemonConfig;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response, header};
use serde_json::{Value, json};
use std::time::Duration;

/// Talks to the daemon's REST API over HTTP. One request per call, no retries.
#[derive(Clone)]
pub struct HttpDaemonClient {
    http: HttpClient,
}

impl HttpDaemonClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &DaemonConfig) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self::new(http))
    }

    fn request(&self, target: &DaemonTarget, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", target.base_url.trim_end_matches('/'), path);
        self.http
            .request(method, url)
            .bearer_auth(&target.token)
            .header(header::ACCEPT, "application/json")
    }

    async fn send(
        &self,
        target: &DaemonTarget,
        request: RequestBuilder,
        fatal: bool,
    ) -> Result<Response, DaemonConnectionError> {
        let response = request.send().await.map_err(|e| {
            DaemonConnectionError::new(&target.node_name, fatal, DaemonFailure::Transport(e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DaemonConnectionError::new(
                &target.node_name,
                fatal,
                DaemonFailure::Status(status),
            ));
        }

        Ok(response)
    }

    async fn execute(
        &self,
        target: &DaemonTarget,
        method: Method,
        path: String,
        body: Option<&Value>,
    ) -> Result<(), DaemonConnectionError> {
        tracing::debug!(node = %target.node_name, uuid = %target.uuid, %method, %path, "daemon request");

        let mut request = self.request(target, method, &path);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(target, request, true).await?;
        Ok(())
    }
}

#[async_trait]
impl DaemonClient for HttpDaemonClient {
    async fn get_details(
        &self,
        target: &DaemonTarget,
    ) -> Result<ServerDetails, DaemonConnectionError> {
        let path = format!("/api/servers/{}", target.uuid);
        tracing::debug!(node = %target.node_name, uuid = %target.uuid, %path, "daemon request");

        let request = self.request(target, Method::GET, &path);
        let response = self.send(target, request, false).await?;

        response.json::<ServerDetails>().await.map_err(|e| {
            DaemonConnectionError::new(&target.node_name, false, DaemonFailure::Transport(e))
        })
    }

    async fn create(
        &self,
        target: &DaemonTarget,
        payload: &Value,
    ) -> Result<(), DaemonConnectionError> {
        self.execute(target, Method::POST, "/api/servers".to_string(), Some(payload))
            .await
    }

    async fn update(
        &self,
        target: &DaemonTarget,
        payload: &Value,
    ) -> Result<(), DaemonConnectionError> {
        let path = format!("/api/servers/{}", target.uuid);
        self.execute(target, Method::PATCH, path, Some(payload)).await
    }

    async fn delete(&self, target: &DaemonTarget) -> Result<(), DaemonConnectionError> {
        let path = format!("/api/servers/{}", target.uuid);
        self.execute(target, Method::DELETE, path, None).await
    }

    async fn reinstall(&self, target: &DaemonTarget) -> Result<(), DaemonConnectionError> {
        let path = format!("/api/servers/{}/reinstall", target.uuid);
        self.execute(target, Method::POST, path, None).await
    }

    async fn suspend(
        &self,
        target: &DaemonTarget,
        unsuspend: bool,
    ) -> Result<(), DaemonConnectionError> {
        let path = format!("/api/servers/{}", target.uuid);
        let body = json!({ "suspended": !unsuspend });
        self.execute(target, Method::PATCH, path, Some(&body)).await
    }

    async fn request_archive(&self, target: &DaemonTarget) -> Result<(), DaemonConnectionError> {
        let path = format!("/api/servers/{}/archive", target.uuid);
        self.execute(target, Method::POST, path, None).await
    }

    async fn revoke_tokens(
        &self,
        target: &DaemonTarget,
        jtis: &[String],
    ) -> Result<(), DaemonConnectionError> {
        let path = format!("/api/servers/{}/ws/deny", target.uuid);
        let body = json!({ "jtis": jtis });
        self.execute(target, Method::POST, path, Some(&body)).await
    }
}
