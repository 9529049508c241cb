use std::{collections::HashSet, time::Duration};

use anyhow::Error;
use async_trait::async_trait;
use fred::interfaces::LuaInterface;
use fred::prelude::*;
use fred::types::Value;
use tracing::{debug, error, warn};

use super::{LikeLedger, StockLikeRecord, normalize};
use crate::error::{Result, StockError};

// KEYS: likes counter, likers set. ARGV: token.
const REGISTER_LIKE: &str = r#"
if redis.call('SADD', KEYS[2], ARGV[1]) == 1 then
  return redis.call('INCR', KEYS[1])
end
return tonumber(redis.call('GET', KEYS[1]) or '0')
"#;

// KEYS: likes counter, likers set. Empty reply when the symbol is unseen.
const READ_RECORD: &str = r#"
local count = redis.call('GET', KEYS[1])
if not count then
  return {}
end
return {count, redis.call('SMEMBERS', KEYS[2])}
"#;

/// Ledger backed by Redis.
///
/// Per symbol it keeps a counter and a set of tokens under one hash tag, so
/// both live in the same cluster slot. A Lua script adds the token and
/// increments the counter in one server-side step, so same-symbol likes are
/// serialized by Redis itself. The symbol index is a separate key and is
/// always written before the record and removed before it.
#[derive(Clone)]
pub struct RedisLedger {
    client: Client,
    key_prefix: String,
}

impl RedisLedger {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> anyhow::Result<Self> {
        let config = Config::from_url(redis_url)?;

        let client = Builder::from_config(config)
            .with_connection_config(|config| {
                config.connection_timeout = Duration::from_secs(5);
                config.tcp = TcpConfig {
                    nodelay: Some(true),
                    ..Default::default()
                };
            })
            .build()?;

        client.on_error(|(error, server)| async move {
            error!(?server, ?error, "redis connection error");
            Ok(())
        });

        client.connect();
        client.wait_for_connect().await?;

        Ok(Self {
            client,
            key_prefix: key.into(),
        })
    }

    /// Connect using environment variables.
    /// Expects REDIS_URL; REDIS_KEY_PREFIX defaults to "stockprices".
    pub async fn from_env() -> anyhow::Result<Self> {
        use std::env;

        let redis_url = env::var("REDIS_URL")
            .map_err(|_| Error::msg("REDIS_URL environment variable not set"))?;
        let key_prefix = env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "stockprices".into());

        Self::connect(&redis_url, key_prefix).await
    }

    /// Close the connection.
    pub async fn quit(&self) -> anyhow::Result<()> {
        self.client.quit().await?;
        Ok(())
    }

    fn likes_key(&self, symbol: &str) -> String {
        record_key(&self.key_prefix, symbol, "likes")
    }

    fn likers_key(&self, symbol: &str) -> String {
        record_key(&self.key_prefix, symbol, "likers")
    }

    fn symbols_key(&self) -> String {
        format!("{}:symbols", self.key_prefix)
    }
}

/// `prefix:{SYMBOL}:field`. The braces make Redis Cluster hash only the symbol.
fn record_key(prefix: &str, symbol: &str, field: &str) -> String {
    format!("{prefix}:{{{symbol}}}:{field}")
}

fn unavailable(op: &'static str) -> impl FnOnce(fred::error::Error) -> StockError {
    move |e| {
        warn!(op, error = ?e, "ledger storage failed");
        StockError::StorageUnavailable
    }
}

#[async_trait]
impl LikeLedger for RedisLedger {
    async fn get_record(&self, symbol: &str) -> Result<Option<StockLikeRecord>> {
        let symbol = normalize(symbol);
        let keys = vec![self.likes_key(&symbol), self.likers_key(&symbol)];

        let reply: Vec<Value> = self
            .client
            .eval(READ_RECORD, keys, Vec::<String>::new())
            .await
            .map_err(unavailable("get_record"))?;

        let mut reply = reply.into_iter();
        let (Some(count), Some(tokens)) = (reply.next(), reply.next()) else {
            return Ok(None);
        };

        let like_count: u64 = count.convert().map_err(unavailable("get_record"))?;
        let liked_tokens: HashSet<String> = tokens.convert().map_err(unavailable("get_record"))?;

        Ok(Some(StockLikeRecord {
            symbol,
            like_count,
            liked_tokens,
        }))
    }

    async fn register_like(&self, symbol: &str, token: &str) -> Result<u64> {
        let symbol = normalize(symbol);

        let _: i64 = self
            .client
            .sadd(self.symbols_key(), symbol.as_str())
            .await
            .map_err(unavailable("register_like"))?;

        let keys = vec![self.likes_key(&symbol), self.likers_key(&symbol)];
        let likes: i64 = self
            .client
            .eval(REGISTER_LIKE, keys, vec![token.to_string()])
            .await
            .map_err(unavailable("register_like"))?;

        debug!(symbol = %symbol, likes, "register_like");
        u64::try_from(likes).map_err(|_| {
            warn!(symbol = %symbol, likes, "negative like counter");
            StockError::StorageUnavailable
        })
    }

    async fn like_count(&self, symbol: &str) -> Result<u64> {
        let count: Option<u64> = self
            .client
            .get(self.likes_key(&normalize(symbol)))
            .await
            .map_err(unavailable("like_count"))?;

        Ok(count.unwrap_or(0))
    }

    async fn symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self
            .client
            .smembers(self.symbols_key())
            .await
            .map_err(unavailable("symbols"))?;
        symbols.sort();
        Ok(symbols)
    }

    /// Unindex each symbol before deleting its keys. `register_like` indexes
    /// before writing, so a like racing with `clear` never leaves unindexed keys.
    async fn clear(&self) -> Result<()> {
        let symbols = self.symbols().await?;

        for symbol in &symbols {
            let _: i64 = self
                .client
                .srem(self.symbols_key(), symbol.as_str())
                .await
                .map_err(unavailable("clear"))?;

            let _: i64 = self
                .client
                .del(vec![self.likes_key(symbol), self.likers_key(symbol)])
                .await
                .map_err(unavailable("clear"))?;
        }

        debug!(removed = symbols.len(), "ledger cleared");
        Ok(())
    }
}
