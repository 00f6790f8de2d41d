//! ipstack geolocation provider.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::domain::{AppError, ExternalServiceError, GeoLocationProvider, IpDetails};

use crate::infra::exchange::DEFAULT_HTTP_TIMEOUT;

/// Default ipstack API base URL
pub const DEFAULT_IPSTACK_URL: &str = "http://api.ipstack.com";

#[derive(Debug, Clone)]
pub struct IpStackClient {
    http_client: Client,
    base_url: String,
    access_key: SecretString,
}

impl IpStackClient {
    /// Create a client; `base_url` defaults to the public ipstack API
    pub fn new(access_key: SecretString, base_url: Option<String>) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| ExternalServiceError::Configuration(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_IPSTACK_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            access_key,
        })
    }
}

#[async_trait]
impl GeoLocationProvider for IpStackClient {
    #[instrument(skip(self))]
    async fn lookup(&self, ip: &str) -> Result<IpDetails, AppError> {
        let url = format!("{}/{}", self.base_url, ip);
        debug!(url = %url, "Calling ipstack");

        let response = self
            .http_client
            .get(&url)
            .query(&[("access_key", self.access_key.expose_secret())])
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!(error = %e, "ipstack request failed");
                ExternalServiceError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "ipstack returned error");
            return Err(ExternalServiceError::ApiError {
                status_code: status.as_u16(),
                message: body,
            }
            .into());
        }

        let body: Value = response.json().await.map_err(|e| {
            let e = e.without_url();
            error!(error = %e, "Failed to parse ipstack response");
            ExternalServiceError::ParseError(e.to_string())
        })?;

        // ipstack reports failures with a 200 and `{"success": false, "error": {...}}`
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let error = body.get("error");
            let status_code = error
                .and_then(|e| e.get("code"))
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(status.as_u16());
            let message = error
                .and_then(|e| e.get("info").or_else(|| e.get("type")))
                .and_then(Value::as_str)
                .unwrap_or("ipstack lookup failed")
                .to_string();
            return Err(ExternalServiceError::ApiError {
                status_code,
                message,
            }
            .into());
        }

        match body {
            Value::Object(map) => Ok(IpDetails(map)),
            other => Err(ExternalServiceError::ParseError(format!(
                "expected a JSON object, got {other}"
            ))
            .into()),
        }
    }
}
