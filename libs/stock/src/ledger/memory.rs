use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{LikeLedger, StockLikeRecord, normalize};
use crate::error::Result;

/// In-process ledger.
///
/// Each record is mutated under its map entry lock, which serializes likes
/// for one symbol while other symbols proceed on other shards.
#[derive(Default)]
pub struct MemoryLedger {
    records: DashMap<String, StockLikeRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LikeLedger for MemoryLedger {
    async fn get_record(&self, symbol: &str) -> Result<Option<StockLikeRecord>> {
        Ok(self
            .records
            .get(&normalize(symbol))
            .map(|r| r.value().clone()))
    }

    async fn register_like(&self, symbol: &str, token: &str) -> Result<u64> {
        let symbol = normalize(symbol);

        let mut record = self
            .records
            .entry(symbol.clone())
            .or_insert_with(|| StockLikeRecord {
                symbol: symbol.clone(),
                like_count: 0,
                liked_tokens: HashSet::new(),
            });

        if record.liked_tokens.insert(token.to_string()) {
            record.like_count += 1;
            debug!(symbol = %symbol, likes = record.like_count, "like registered");
        } else {
            debug!(symbol = %symbol, "token already liked symbol");
        }

        Ok(record.like_count)
    }

    async fn like_count(&self, symbol: &str) -> Result<u64> {
        Ok(self
            .records
            .get(&normalize(symbol))
            .map(|r| r.like_count)
            .unwrap_or(0))
    }

    async fn symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        symbols.sort();
        Ok(symbols)
    }

    async fn clear(&self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}
