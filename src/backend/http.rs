use async_trait::async_trait;
use reqwest::{Client, Method as HttpMethod};
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

use super::{Backend, BackendError};
use crate::config::HttpBackendConfig;
use crate::formation::{Formation, HeaderFormation};
use crate::protocol::{Method, Request, Response};

/// Backend that sends requests over HTTP with `reqwest`.
pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_config(HttpBackendConfig::default())
    }

    pub fn with_config(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self { client, config })
    }

    /// `host` + `path` + `?query`, with exactly one slash between host and path.
    pub fn url_for(request: &Request) -> String {
        let host = request.host.trim_end_matches('/');
        let mut url = if request.path.is_empty() || request.path.starts_with('/') {
            format!("{}{}", host, request.path)
        } else {
            format!("{}/{}", host, request.path)
        };

        if !request.query.is_empty() {
            url.push('?');
            url.push_str(&request.query.to_canonical_string());
        }
        url
    }
}

fn to_http_method(method: Method) -> HttpMethod {
    match method {
        Method::Get => HttpMethod::GET,
        Method::Post => HttpMethod::POST,
        Method::Put => HttpMethod::PUT,
        Method::Delete => HttpMethod::DELETE,
        Method::Patch => HttpMethod::PATCH,
        Method::Head => HttpMethod::HEAD,
        Method::Options => HttpMethod::OPTIONS,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[tracing::instrument(name = "http_request", skip_all, fields(method = %request.method))]
    async fn send(&self, request: &Request) -> Result<Response, BackendError> {
        let start_time = Instant::now();
        let url = Self::url_for(request);

        let mut builder = self.client.request(to_http_method(request.method), &url);

        for (name, value) in &self.config.default_headers {
            if request.headers.get(name).is_none() {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        for (name, value) in request.headers.pairs() {
            builder = builder.header(name, value);
        }

        if request.method.allows_body() && !request.payload.is_null() {
            builder = builder.json(&request.payload);
        }

        let resp = builder.send().await?;
        let status_code = resp.status().as_u16();

        let mut headers = HeaderFormation::new();
        for (name, value) in resp.headers() {
            match value.to_str() {
                Ok(text) => {
                    if let Err(e) = headers.set(name.as_str(), text) {
                        debug!(header = %name, error = %e, "Skipping response header");
                    }
                }
                Err(_) => debug!(header = %name, "Skipping non-ASCII response header"),
            }
        }

        let raw_body = resp.text().await.map_err(|e| BackendError::Body(e.to_string()))?;
        let body = if raw_body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&raw_body).unwrap_or(Value::String(raw_body))
        };

        let duration_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(%url, status = status_code, duration_ms, "HTTP request finished");

        Ok(Response {
            status_code,
            body,
            headers,
        })
    }
}
