use std::{env::var, net::SocketAddr};

use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub ledger: LedgerBackend,
    pub trust_proxy: bool,
    pub version: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut bind_addr: SocketAddr = var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;
        if let Ok(port) = var("PORT") {
            bind_addr.set_port(port.parse()?);
        }

        let ledger = match var("LEDGER_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "redis" => LedgerBackend::Redis,
            "memory" => LedgerBackend::Memory,
            other => bail!("unknown LEDGER_BACKEND: {other}"),
        };

        Ok(Self {
            bind_addr,
            ledger,
            trust_proxy: var("TRUST_PROXY").is_ok_and(|v| parse_flag(&v)),
            version: var("APP_VERSION").unwrap_or_else(|_| "Unknown".to_string()),
        })
    }
}

/// Explicit affirmatives only; anything else is false.
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}
