mod aggregator;
mod anonymize;
mod error;
mod price_client;

pub mod ledger;

pub use aggregator::{Aggregator, RelativeStockData, StockData, StockDataBody, StockResponse};
pub use anonymize::anonymize;
pub use error::{Result, StockError};
pub use ledger::{LikeLedger, MemoryLedger, RedisLedger, StockLikeRecord};
pub use price_client::{DEFAULT_QUOTE_API, PriceClient, QuoteSource};
