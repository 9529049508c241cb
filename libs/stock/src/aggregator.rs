use std::sync::Arc;

use futures::future::join;
use serde::Serialize;
use tracing::{debug, info, info_span, instrument, warn};
use tracing_futures::Instrument;

use crate::anonymize::anonymize;
use crate::error::{Result, StockError};
use crate::ledger::{LikeLedger, normalize};
use crate::price_client::QuoteSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockData {
    pub stock: String,
    pub price: f64,
    pub likes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelativeStockData {
    pub stock: String,
    pub price: f64,
    pub rel_likes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StockDataBody {
    Single(StockData),
    Pair([RelativeStockData; 2]),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockResponse {
    #[serde(rename = "stockData")]
    pub stock_data: StockDataBody,
}

/// Answers price + like queries for one stock, or compares two.
///
/// Holds no state of its own; all persistence goes through the ledger.
#[derive(Clone)]
pub struct Aggregator {
    quotes: Arc<dyn QuoteSource>,
    ledger: Arc<dyn LikeLedger>,
}

impl Aggregator {
    pub fn new(quotes: Arc<dyn QuoteSource>, ledger: Arc<dyn LikeLedger>) -> Self {
        Self { quotes, ledger }
    }

    /// Look up prices and likes for one or two symbols.
    ///
    /// With `wants_like`, the caller's anonymized address likes every
    /// requested symbol. Nothing is written to the ledger unless every
    /// symbol has a price.
    #[instrument(
        name = "handle_request",
        skip(self, symbols, caller_address),
        fields(symbols = symbols.len(), like = wants_like)
    )]
    pub async fn handle_request(
        &self,
        symbols: &[String],
        wants_like: bool,
        caller_address: &str,
    ) -> Result<StockResponse> {
        let requested = validate_symbols(symbols)?;
        let token = anonymize(caller_address);

        let stock_data = match requested {
            Requested::One(stock) => {
                let Some(price) = self.price(&stock).await else {
                    warn!(symbol = %stock, "symbol lookup failed");
                    return Err(StockError::InvalidSymbol(vec![stock]));
                };
                let likes = self.likes(&stock, &token, wants_like).await?;
                debug!(likes, "resolved likes");

                StockDataBody::Single(StockData {
                    stock,
                    price,
                    likes,
                })
            }
            Requested::Two(first, second) => {
                let (first_price, second_price) =
                    join(self.price(&first), self.price(&second)).await;

                let (first_price, second_price) = match (first_price, second_price) {
                    (Some(a), Some(b)) => (a, b),
                    (a, b) => {
                        let missing: Vec<String> = [(&first, a), (&second, b)]
                            .into_iter()
                            .filter(|(_, price)| price.is_none())
                            .map(|(symbol, _)| symbol.clone())
                            .collect();
                        warn!(missing = ?missing, "symbol lookup failed");
                        return Err(StockError::InvalidSymbol(missing));
                    }
                };

                let (first_likes, second_likes) = join(
                    self.likes(&first, &token, wants_like),
                    self.likes(&second, &token, wants_like),
                )
                .await;
                let (first_likes, second_likes) = (first_likes?, second_likes?);
                debug!(first_likes, second_likes, "resolved likes");

                let diff = relative_likes(first_likes, second_likes)?;
                StockDataBody::Pair([
                    RelativeStockData {
                        stock: first,
                        price: first_price,
                        rel_likes: diff,
                    },
                    RelativeStockData {
                        stock: second,
                        price: second_price,
                        rel_likes: -diff,
                    },
                ])
            }
        };

        info!("request served");
        Ok(StockResponse { stock_data })
    }

    async fn price(&self, symbol: &str) -> Option<f64> {
        let span = info_span!("quote", symbol = %symbol);
        self.quotes.lookup_price(symbol).instrument(span).await
    }

    async fn likes(&self, symbol: &str, token: &str, wants_like: bool) -> Result<u64> {
        let span = info_span!("likes", symbol = %symbol);
        if wants_like {
            self.ledger.register_like(symbol, token).instrument(span).await
        } else {
            self.ledger.like_count(symbol).instrument(span).await
        }
    }
}

/// Normalized symbols of one request.
#[derive(Debug, PartialEq, Eq)]
enum Requested {
    One(String),
    Two(String, String),
}

/// Normalize and check the requested symbols.
///
/// Accepts one or two non-blank symbols. Comparing a stock with itself is
/// rejected rather than answered with zero relative likes.
fn validate_symbols(symbols: &[String]) -> Result<Requested> {
    let normalized: Vec<String> = symbols.iter().map(|s| normalize(s)).collect();

    if normalized.iter().any(|s| s.is_empty()) {
        return Err(StockError::InvalidRequest("stock symbol is empty".into()));
    }

    match <[String; 2]>::try_from(normalized) {
        Ok([first, second]) if first == second => Err(StockError::InvalidRequest(format!(
            "cannot compare {first} with itself"
        ))),
        Ok([first, second]) => Ok(Requested::Two(first, second)),
        Err(mut rest) if rest.len() == 1 => Ok(Requested::One(rest.remove(0))),
        Err(rest) => Err(StockError::InvalidRequest(format!(
            "expected 1 or 2 stock symbols, got {}",
            rest.len()
        ))),
    }
}

/// `first - second` as a signed count.
fn relative_likes(first: u64, second: u64) -> Result<i64> {
    i64::try_from(i128::from(first) - i128::from(second))
        .map_err(|_| StockError::LikeCountOutOfRange)
}
