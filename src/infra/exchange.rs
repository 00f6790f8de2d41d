//! HTTP exchange-rate source.
//!
//! The response body is parsed losslessly and handed to a [`ResponseSelector`]
//! that picks the `{code: rate}` pairs out of the provider's payload shape.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, error, instrument};

use crate::domain::precision::parse_lossless;
use crate::domain::{AppError, ExchangeRateSource, ExternalServiceError};

/// CoinGecko simple price endpoint for Nexa
pub const DEFAULT_PRIMARY_RATE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=nexacoin&vs_currencies=usd,eur,gbp,jpy";

/// USD-based FX table used for extended currencies
pub const DEFAULT_EXTENDED_RATE_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Default request timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Picks `{code: rate}` pairs out of a parsed response body
pub type ResponseSelector = Arc<dyn Fn(&Value) -> Option<BTreeMap<String, String>> + Send + Sync>;

/// Selector for CoinGecko `simple/price` payloads: `{"<coin_id>": {"usd": 0.1, ...}}`
pub fn coingecko_simple_price(coin_id: impl Into<String>) -> ResponseSelector {
    let coin_id = coin_id.into();
    Arc::new(move |body: &Value| body.get(&coin_id).and_then(Value::as_object).and_then(rate_pairs))
}

/// Selector for FX payloads shaped `{"rates": {"EUR": 0.9, ...}}`
pub fn fx_rates_object() -> ResponseSelector {
    Arc::new(|body: &Value| body.get("rates").and_then(Value::as_object).and_then(rate_pairs))
}

/// [`fx_rates_object`] restricted to `codes` (case-insensitive)
pub fn fx_rates_for<I, S>(codes: I) -> ResponseSelector
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let wanted: HashSet<String> = codes
        .into_iter()
        .map(|code| code.as_ref().to_lowercase())
        .collect();
    Arc::new(move |body: &Value| {
        let rates = body.get("rates").and_then(Value::as_object).and_then(rate_pairs)?;
        let picked: BTreeMap<String, String> = rates
            .into_iter()
            .filter(|(code, _)| wanted.contains(code))
            .collect();
        (!picked.is_empty()).then_some(picked)
    })
}

/// Numbers keep their source digits; strings pass through. Anything else is dropped.
fn rate_pairs(object: &Map<String, Value>) -> Option<BTreeMap<String, String>> {
    let pairs: BTreeMap<String, String> = object
        .iter()
        .filter_map(|(code, value)| {
            let rate = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.trim().to_string(),
                _ => return None,
            };
            Some((code.to_lowercase(), rate))
        })
        .collect();

    (!pairs.is_empty()).then_some(pairs)
}

/// Exchange-rate source backed by a JSON HTTP endpoint
#[derive(Clone)]
pub struct HttpExchangeRateSource {
    name: String,
    url: String,
    http_client: Client,
    selector: ResponseSelector,
}

impl fmt::Debug for HttpExchangeRateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExchangeRateSource")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl HttpExchangeRateSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        selector: ResponseSelector,
    ) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| ExternalServiceError::Configuration(e.to_string()))?;

        Ok(Self::with_client(name, url, selector, http_client))
    }

    /// Build with an existing client (shared connection pool, custom timeout)
    pub fn with_client(
        name: impl Into<String>,
        url: impl Into<String>,
        selector: ResponseSelector,
        http_client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            http_client,
            selector,
        }
    }

    /// CoinGecko primary source
    pub fn coingecko(url: impl Into<String>, coin_id: impl Into<String>) -> Result<Self, AppError> {
        Self::new("coingecko", url, coingecko_simple_price(coin_id))
    }

    /// USD-relative FX source limited to the given currency codes
    pub fn fx_rates<I, S>(url: impl Into<String>, codes: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new("fx-rates", url, fx_rates_for(codes))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ExchangeRateSource for HttpExchangeRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn fetch_rates(&self) -> Result<Option<BTreeMap<String, String>>, AppError> {
        debug!(url = %self.url, "Fetching exchange rates");

        let response = self.http_client.get(&self.url).send().await.map_err(|e| {
            let e = e.without_url();
            error!(error = %e, "Exchange rate request failed");
            ExternalServiceError::Network(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExternalServiceError::Network(e.without_url().to_string()))?;

        if !status.is_success() {
            error!(status = %status, body = %body, "Exchange rate provider returned error");
            return Err(ExternalServiceError::ApiError {
                status_code: status.as_u16(),
                message: body,
            }
            .into());
        }

        let value = parse_lossless(&body)
            .map_err(|e| ExternalServiceError::ParseError(e.to_string()))?;

        Ok((self.selector)(&value))
    }
}
