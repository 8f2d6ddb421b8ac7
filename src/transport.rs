use std::time::Duration;

use async_trait::async_trait;
use openidconnect::{HttpRequest, HttpResponse};
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::EnrichError;

/// A response as the transport handed it over.
///
/// Some hosts decode JSON bodies before the workflow sees them, others hand
/// over raw bytes. Nothing outside this module should care which.
#[derive(Debug, Clone)]
pub enum TransportResponse {
    Parsed { status_code: StatusCode, data: Value },
    Raw(HttpResponse),
}

/// The one shape every caller inspects.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalResponse {
    pub status_code: StatusCode,
    pub body: Value,
}

impl CanonicalResponse {
    pub fn from_transport(response: TransportResponse) -> Result<Self, serde_json::Error> {
        match response {
            TransportResponse::Parsed { status_code, data } => Ok(Self {
                status_code,
                body: data,
            }),
            TransportResponse::Raw(raw) => Ok(Self {
                status_code: raw.status_code,
                body: serde_json::from_slice(&raw.body)?,
            }),
        }
    }
}

/// Sends one request, once. Retries and timeouts are the host's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<TransportResponse, EnrichError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Every call is bounded by `request_timeout`, so a stalled identity
    /// provider costs at most that long per request.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> reqwest::Result<Self> {
        let builder = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout);

        // Following redirects would let the identity domain bounce our bearer
        // token somewhere else.
        let builder = builder.redirect(reqwest::redirect::Policy::none());

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<TransportResponse, EnrichError> {
        let client = &self.client;

        let request = client
            .request(request.method, request.url.as_str())
            .headers(request.headers)
            .body(request.body)
            .build()?;

        let response = client.execute(request).await?;

        let status_code = response.status();
        let headers = response.headers().to_owned();
        let chunks = response.bytes().await?;
        Ok(TransportResponse::Raw(HttpResponse {
            status_code,
            headers,
            body: chunks.to_vec(),
        }))
    }
}
