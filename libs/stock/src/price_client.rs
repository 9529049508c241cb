use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_QUOTE_API: &str = "https://stock-price-checker-proxy.freecodecamp.rocks";

/// Source of the latest traded price for a symbol.
///
/// `None` is the only not-found signal. Implementations fold transport
/// failures and unusable payloads into it instead of returning errors.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn lookup_price(&self, symbol: &str) -> Option<f64>;
}

#[derive(Clone)]
pub struct PriceClient {
    client: Client,
    base_api: Url,
}

impl PriceClient {
    pub fn new(base_api: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_api = Url::parse(base_api)?;

        if base_api.cannot_be_a_base() {
            return Err(anyhow!("quote api url cannot be a base: {base_api}"));
        }

        Ok(Self { client, base_api })
    }

    /// Create a PriceClient from environment variables.
    /// QUOTE_API_BASE_URL and QUOTE_TIMEOUT_SECS are optional.
    pub fn from_env() -> Result<Self> {
        let base_api =
            std::env::var("QUOTE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_QUOTE_API.to_string());
        let timeout = match std::env::var("QUOTE_TIMEOUT_SECS") {
            Ok(v) => v.parse()?,
            Err(_) => 5,
        };

        Self::new(&base_api, Duration::from_secs(timeout))
    }

    fn quote_url(&self, symbol: &str) -> Result<Url> {
        let mut url = self.base_api.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("quote api url cannot be a base"))?
            .pop_if_empty()
            .extend(["v1", "stock", symbol, "quote"]);
        Ok(url)
    }

    /// Fetch the latest price. `Ok(None)` when upstream does not know the symbol.
    pub async fn fetch_quote(&self, symbol: &str) -> Result<Option<f64>, Error> {
        let url = self.quote_url(symbol)?;

        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(parse_quote(&body))
    }
}

#[async_trait]
impl QuoteSource for PriceClient {
    async fn lookup_price(&self, symbol: &str) -> Option<f64> {
        match self.fetch_quote(symbol).await {
            Ok(Some(price)) => {
                debug!(symbol, price, "quote fetched");
                Some(price)
            }
            Ok(None) => {
                debug!(symbol, "quote not found");
                None
            }
            Err(e) => {
                warn!(symbol, error = ?e, "quote lookup failed");
                None
            }
        }
    }
}

//
// Match the IEX-style quote payload served by the proxy
//
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "latestPrice")]
    latest_price: Option<f64>,
}

/// Extract a positive `latestPrice` from an upstream body.
///
/// The proxy answers unknown symbols with a bare JSON string such as
/// `"Unknown symbol"`, which fails to decode here and yields `None`.
pub(crate) fn parse_quote(body: &str) -> Option<f64> {
    let quote: QuoteResponse = serde_json::from_str(body).ok()?;
    quote
        .latest_price
        .filter(|price| price.is_finite() && *price > 0.0)
}
