use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Wrong number of symbols, a blank symbol, or a stock compared to itself.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The quote source had no price for these symbols.
    #[error("invalid symbol: {}", .0.join(", "))]
    InvalidSymbol(Vec<String>),

    /// The like ledger could not complete a read or write.
    #[error("like storage is unavailable, please retry later")]
    StorageUnavailable,

    /// A like count too large to report as a signed difference.
    #[error("like count out of range")]
    LikeCountOutOfRange,
}

pub type Result<T> = std::result::Result<T, StockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_symbol_names_every_offender() {
        let err = StockError::InvalidSymbol(vec!["FOO".into(), "BAR".into()]);
        assert_eq!(err.to_string(), "invalid symbol: FOO, BAR");
    }

    #[test]
    fn storage_message_is_generic() {
        let msg = StockError::StorageUnavailable.to_string();
        assert!(!msg.contains("redis"));
    }
}
