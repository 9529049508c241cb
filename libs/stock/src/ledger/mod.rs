mod memory;
mod redis;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use memory::MemoryLedger;
pub use redis::RedisLedger;

/// Like state for one ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLikeRecord {
    pub symbol: String,
    pub like_count: u64,
    pub liked_tokens: HashSet<String>,
}

/// Persistent per-symbol like records with at-most-one-like-per-token semantics.
///
/// Every method normalizes the symbol itself, so callers may pass raw input.
/// `register_like` must be atomic per symbol: concurrent likes from distinct
/// tokens all land, and concurrent likes from one token count once.
#[async_trait]
pub trait LikeLedger: Send + Sync {
    /// Read-only lookup. Never creates a record.
    async fn get_record(&self, symbol: &str) -> Result<Option<StockLikeRecord>>;

    /// Register a like from `token` and return the resulting count.
    ///
    /// Creates the record with a count of 1 when the symbol is unseen. A token
    /// that already liked the symbol leaves the record untouched.
    async fn register_like(&self, symbol: &str, token: &str) -> Result<u64>;

    /// Current count, or 0 when no record exists.
    async fn like_count(&self, symbol: &str) -> Result<u64>;

    /// All symbols that have a record.
    async fn symbols(&self) -> Result<Vec<String>>;

    /// Drop every record. Administrative reset, not used on the request path.
    async fn clear(&self) -> Result<()>;
}

pub fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
