//! HTTP handlers.
//!
//! Routes:
//! - GET /api/stock-prices?stock=X[&stock=Y][&like=true]
//! - GET /health

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
};
use serde::Serialize;
use stock::{StockError, StockResponse};
use tracing::{debug, warn};

use crate::{AppState, config::parse_flag};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiResponse {
    Stock(StockResponse),
    Error { error: String },
}

impl From<StockError> for ApiResponse {
    fn from(err: StockError) -> Self {
        ApiResponse::Error {
            error: err.to_string(),
        }
    }
}

/// Parsed query of the stock prices endpoint.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StockQuery {
    pub symbols: Vec<String>,
    pub like: bool,
}

impl StockQuery {
    /// `stock` may repeat (also as `stock[]`); `like` is read once.
    pub fn parse(query: &str) -> Self {
        let mut parsed = StockQuery::default();
        let mut like = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "stock" | "stock[]" => parsed.symbols.push(value.into_owned()),
                "like" if like.is_none() => like = Some(parse_flag(&value)),
                _ => {}
            }
        }

        parsed.like = like.unwrap_or(false);
        parsed
    }
}

/// Network address of the caller, without the port.
///
/// Uses the first `X-Forwarded-For` hop when the proxy is trusted, else the
/// socket peer.
fn caller_address(request: &Request, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(addr) = forwarded {
            return Some(addr.to_string());
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

pub async fn stock_prices(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Json<ApiResponse> {
    let query = StockQuery::parse(request.uri().query().unwrap_or_default());
    debug!(symbols = ?query.symbols, like = query.like, "stock-prices query");

    let Some(address) = caller_address(&request, state.trust_proxy) else {
        warn!("caller address unavailable");
        return Json(
            StockError::InvalidRequest("caller address unavailable".into()).into(),
        );
    };

    let result = state
        .aggregator
        .handle_request(&query.symbols, query.like, &address)
        .await;

    Json(match result {
        Ok(response) => ApiResponse::Stock(response),
        Err(err) => err.into(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use stock::{Aggregator, LikeLedger, MemoryLedger, QuoteSource};
    use tower::ServiceExt;

    use super::*;
    use crate::create_router;

    struct FixedQuotes(HashMap<&'static str, f64>);

    #[async_trait]
    impl QuoteSource for FixedQuotes {
        async fn lookup_price(&self, symbol: &str) -> Option<f64> {
            self.0.get(symbol).copied()
        }
    }

    fn app(trust_proxy: bool) -> (Router, Arc<MemoryLedger>) {
        let quotes = FixedQuotes(HashMap::from([
            ("GOOG", 139.74),
            ("TSLA", 251.05),
            ("MSFT", 370.1),
            ("AAPL", 189.3),
            ("AMZN", 144.2),
        ]));
        let ledger = Arc::new(MemoryLedger::new());
        let state = AppState {
            aggregator: Aggregator::new(Arc::new(quotes), ledger.clone()),
            trust_proxy,
            version: "test".into(),
        };
        (create_router(state), ledger)
    }

    async fn get(app: &Router, uri: &str, peer: &str) -> (StatusCode, Value) {
        let peer: SocketAddr = peer.parse().unwrap();
        let request = Request::builder()
            .uri(uri)
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[test]
    fn parses_repeated_stock_and_like() {
        let q = StockQuery::parse("stock=goog&stock=msft&like=true");
        assert_eq!(q.symbols, vec!["goog", "msft"]);
        assert!(q.like);

        let q = StockQuery::parse("stock%5B%5D=a&stock%5B%5D=b&like=false");
        assert_eq!(q.symbols, vec!["a", "b"]);
        assert!(!q.like);

        assert_eq!(StockQuery::parse(""), StockQuery::default());
        assert!(!StockQuery::parse("stock=goog&like=yes").like);
    }

    #[tokio::test]
    async fn single_stock_view() {
        let (app, _) = app(false);
        let (status, body) = get(&app, "/api/stock-prices?stock=goog", "10.0.0.1:5000").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"stockData": {"stock": "GOOG", "price": 139.74, "likes": 0}})
        );
    }

    #[tokio::test]
    async fn like_counts_once_per_address() {
        let (app, _) = app(false);
        let uri = "/api/stock-prices?stock=tsla&like=true";

        let (_, body) = get(&app, uri, "10.0.0.1:5000").await;
        assert_eq!(body["stockData"]["likes"], 1);

        // new connection from the same host
        let (_, body) = get(&app, uri, "10.0.0.1:6001").await;
        assert_eq!(body["stockData"]["likes"], 1);

        let (_, body) = get(&app, uri, "10.0.0.2:5000").await;
        assert_eq!(body["stockData"]["likes"], 2);
    }

    #[tokio::test]
    async fn two_stocks_with_like() {
        let (app, ledger) = app(false);
        ledger.register_like("AMZN", "other").await.unwrap();

        let (status, body) = get(
            &app,
            "/api/stock-prices?stock=aapl&stock=amzn&like=true",
            "10.0.0.3:5000",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let data = body["stockData"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["stock"], "AAPL");
        assert_eq!(data[1]["stock"], "AMZN");
        assert_eq!(data[0]["rel_likes"], -1);
        assert_eq!(data[1]["rel_likes"], 1);
        assert_eq!(ledger.like_count("AAPL").await.unwrap(), 1);
        assert_eq!(ledger.like_count("AMZN").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn errors_are_reported_in_body() {
        let (app, ledger) = app(false);

        for uri in [
            "/api/stock-prices",
            "/api/stock-prices?stock=a&stock=b&stock=c",
            "/api/stock-prices?stock=goog&stock=GOOG",
        ] {
            let (status, body) = get(&app, uri, "10.0.0.1:5000").await;
            assert_eq!(status, StatusCode::OK);
            assert!(
                body["error"].as_str().unwrap().starts_with("invalid request"),
                "{uri}: {body}"
            );
        }

        let (status, body) = get(
            &app,
            "/api/stock-prices?stock=goog&stock=zzzz&like=true",
            "10.0.0.1:5000",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"error": "invalid symbol: ZZZZ"}));
        assert!(ledger.symbols().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_peer_address_is_rejected() {
        let (app, ledger) = app(false);
        let request = Request::builder()
            .uri("/api/stock-prices?stock=tsla&like=true")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert!(body["error"].is_string());
        assert_eq!(ledger.like_count("TSLA").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn forwarded_for_is_used_only_when_trusted() {
        let send = |app: Router, forwarded: &'static str| async move {
            let request = Request::builder()
                .uri("/api/stock-prices?stock=msft&like=true")
                .header("x-forwarded-for", forwarded)
                .extension(ConnectInfo("10.0.0.254:443".parse::<SocketAddr>().unwrap()))
                .body(Body::empty())
                .unwrap();
            app.oneshot(request).await.unwrap()
        };

        let (trusted, ledger) = app(true);
        send(trusted.clone(), "198.51.100.1, 10.0.0.254").await;
        send(trusted.clone(), "198.51.100.2").await;
        assert_eq!(ledger.like_count("MSFT").await.unwrap(), 2);

        let (untrusted, ledger) = app(false);
        send(untrusted.clone(), "198.51.100.1").await;
        send(untrusted.clone(), "198.51.100.2").await;
        assert_eq!(ledger.like_count("MSFT").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn health_and_fallback() {
        let (app, _) = app(false);

        let (status, body) = get(&app, "/health", "10.0.0.1:5000").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "version": "test"}));

        let (status, _) = get(&app, "/nope", "10.0.0.1:5000").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
