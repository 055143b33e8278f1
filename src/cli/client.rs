use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::cli::config::{current_server, load_environment_config};

/// Thin HTTP client for the API: adds the bearer token and tenant header,
/// unwraps the `{success, data}` envelope and turns failures into errors.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    tenant: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, tenant: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            tenant,
        }
    }

    /// Current server with the stored token; `DOCFLOW_TOKEN` overrides it
    pub fn from_environment() -> anyhow::Result<Self> {
        let (_, server) = current_server()?;
        let env_config = load_environment_config()?;
        let token = std::env::var("DOCFLOW_TOKEN").ok().or(env_config.token);
        Ok(Self::new(server.url(), token, env_config.current_tenant))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: Option<&B>) -> anyhow::Result<Value> {
        self.send(Method::POST, path, body).await
    }

    pub async fn patch<B: Serialize>(&self, path: &str, body: &B) -> anyhow::Result<Value> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn put(&self, path: &str) -> anyhow::Result<Value> {
        self.send(Method::PUT, path, None::<&()>).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        self.send(Method::DELETE, path, None::<&()>).await
    }

    async fn send<B: Serialize>(&self, method: Method, path: &str, body: Option<&B>) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(tenant) = &self.tenant {
            request = request.header("x-tenant", tenant);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Request to {} failed: {}", url, e))?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        unwrap_envelope(status, payload)
    }
}

/// `data` of a success envelope, or an error carrying the API message and code
pub fn unwrap_envelope(status: StatusCode, payload: Value) -> anyhow::Result<Value> {
    if status.is_success() && payload["success"] != Value::Bool(false) {
        return Ok(payload.get("data").cloned().unwrap_or(payload));
    }

    let message = payload["error"].as_str().unwrap_or("request failed");
    let mut text = match payload["code"].as_str() {
        Some(code) => format!("{} ({}, HTTP {})", message, code, status.as_u16()),
        None => format!("{} (HTTP {})", message, status.as_u16()),
    };

    if let Some(errors) = payload["validation_errors"].as_array() {
        for error in errors {
            text.push_str(&format!(
                "\n  {}: {}",
                error["field"].as_str().unwrap_or("?"),
                error["message"].as_str().unwrap_or("")
            ));
        }
    }

    Err(anyhow::anyhow!(text))
}
