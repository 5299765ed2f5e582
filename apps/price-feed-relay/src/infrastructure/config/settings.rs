//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use std::time::Duration;

use crate::application::services::SchedulerConfig;
use crate::domain::symbols::{SymbolError, TrackedSymbols};
use crate::infrastructure::binance::{DEFAULT_STREAM_BASE_URL, FeedClientConfig};

/// Symbols tracked when `PRICE_FEED_SYMBOLS` is unset.
pub const DEFAULT_SYMBOLS: [&str; 23] = [
    "BTC", "ETH", "SOL", "DOGE", "BNB", "AAVE", "TRX", "XRP", "LTC", "TON", "SUI", "ICP", "ETC",
    "PEPE", "POL", "ATOM", "ARB", "OP", "INJ", "IOTA", "TWT", "ADA", "CAKE",
];

/// Default schema name used for registration.
pub const DEFAULT_SCHEMA_NAME: &str = "somnixPriceFeeds";

/// Signing credential for ledger writes (32-byte secret seed).
///
/// The secret stays in process: the ledger client derives a signer from it
/// and only signatures and the public key go on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    /// Parse a 64-digit hex key, with or without a `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the key is not 64 hex digits.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let invalid = || ConfigError::InvalidValue {
            var: "PRIVATE_KEY".to_string(),
            reason: "expected 64 hex digits".to_string(),
        };
        let bytes = hex::decode(digits).map_err(|_| invalid())?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| invalid())?;
        Ok(Self(seed))
    }

    /// Raw secret seed.
    #[must_use]
    pub const fn secret_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}

/// Trade stream settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Tracked symbols, in schema order.
    pub symbols: TrackedSymbols,
    /// Quote asset of every instrument.
    pub quote_asset: String,
    /// Combined-stream base URL.
    pub ws_base_url: String,
    /// Delay before reconnecting.
    pub reconnect_delay: Duration,
    /// Read idle timeout (`None` = disabled).
    pub idle_timeout: Option<Duration>,
}

impl FeedSettings {
    /// Client configuration for these settings.
    #[must_use]
    pub fn client_config(&self) -> FeedClientConfig {
        FeedClientConfig {
            reconnect_delay: self.reconnect_delay,
            idle_timeout: self.idle_timeout,
            ..FeedClientConfig::new(&self.ws_base_url, &self.symbols, &self.quote_asset)
        }
    }
}

/// Ledger client settings.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Name the schema is registered under.
    pub schema_name: String,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Interval between receipt lookups.
    pub receipt_poll_interval: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            schema_name: DEFAULT_SCHEMA_NAME.to_string(),
            http_timeout: Duration::from_secs(10),
            receipt_poll_interval: Duration::from_millis(500),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Ledger RPC endpoint.
    pub rpc_url: String,
    /// Signing credential for writes.
    pub signing_key: SigningKey,
    /// Health listener port.
    pub port: u16,
    /// Trade stream settings.
    pub feed: FeedSettings,
    /// Publish loop timing.
    pub publish: SchedulerConfig,
    /// Ledger client settings.
    pub ledger: LedgerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty, or if
    /// the signing key or symbol list is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let rpc_url = env.required("RPC_URL")?;
        let signing_key = SigningKey::parse(&env.required("PRIVATE_KEY")?)?;

        let symbols = match env.get("PRICE_FEED_SYMBOLS") {
            Some(list) => TrackedSymbols::new(list.split(',').filter(|s| !s.trim().is_empty())),
            None => TrackedSymbols::new(DEFAULT_SYMBOLS),
        }
        .map_err(ConfigError::Symbols)?;

        let idle_secs = env.parse_or("PRICE_FEED_IDLE_TIMEOUT_SECS", 60_u64);

        let feed = FeedSettings {
            symbols,
            quote_asset: env
                .get("PRICE_FEED_QUOTE_ASSET")
                .map_or_else(|| "USDT".to_string(), |q| q.to_ascii_uppercase()),
            ws_base_url: env
                .get("PRICE_FEED_WS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_STREAM_BASE_URL.to_string()),
            reconnect_delay: Duration::from_millis(
                env.parse_or("PRICE_FEED_RECONNECT_DELAY_MS", 1500),
            ),
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
        };

        let defaults = SchedulerConfig::default();
        let publish = SchedulerConfig {
            interval: env.secs_or("PUBLISH_INTERVAL_SECS", defaults.interval),
            initial_delay: env.secs_or("PUBLISH_INITIAL_DELAY_SECS", defaults.initial_delay),
            receipt_timeout: env.secs_or("PUBLISH_RECEIPT_TIMEOUT_SECS", defaults.receipt_timeout),
        };

        let ledger_defaults = LedgerSettings::default();
        let ledger = LedgerSettings {
            schema_name: env
                .get("LEDGER_SCHEMA_NAME")
                .unwrap_or(ledger_defaults.schema_name),
            http_timeout: env.secs_or("LEDGER_HTTP_TIMEOUT_SECS", ledger_defaults.http_timeout),
            receipt_poll_interval: env
                .parse::<u64>("LEDGER_RECEIPT_POLL_MS")
                .map_or(ledger_defaults.receipt_poll_interval, Duration::from_millis),
        };

        Ok(Self {
            rpc_url,
            signing_key,
            port: env.parse_or("PORT", 5000),
            feed,
            publish,
            ledger,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("environment variable {var} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },
    /// The symbol list is invalid.
    #[error("invalid PRICE_FEED_SYMBOLS: {0}")]
    Symbols(#[source] SymbolError),
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value.trim().to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.parse(key).unwrap_or(default)
    }

    fn secs_or(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    const KEY: &str = "0xABCDEFabcdef0123456789012345678901234567890123456789012345678901";

    fn config(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| map.get(key).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![("RPC_URL", "https://rpc.example"), ("PRIVATE_KEY", KEY)]
    }

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let config = config(&required()).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.feed.symbols.len(), 23);
        assert_eq!(config.feed.symbols.as_slice()[0].as_str(), "BTC");
        assert_eq!(config.feed.symbols.as_slice()[22].as_str(), "CAKE");
        assert_eq!(config.feed.quote_asset, "USDT");
        assert_eq!(config.feed.reconnect_delay, Duration::from_millis(1500));
        assert_eq!(config.feed.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.publish.interval, Duration::from_secs(5));
        assert_eq!(config.publish.initial_delay, Duration::from_secs(5));
        assert_eq!(config.ledger.schema_name, DEFAULT_SCHEMA_NAME);
    }

    #[test_case("RPC_URL" ; "rpc url")]
    #[test_case("PRIVATE_KEY" ; "private key")]
    fn missing_required_var_is_fatal(var: &str) {
        let vars: Vec<_> = required().into_iter().filter(|(k, _)| *k != var).collect();
        assert!(matches!(config(&vars), Err(ConfigError::MissingEnvVar(v)) if v == var));
    }

    #[test]
    fn empty_rpc_url_is_rejected() {
        let err = config(&[("RPC_URL", "  "), ("PRIVATE_KEY", KEY)]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test_case("1234" ; "too short")]
    #[test_case("0xzz23456789012345678901234567890123456789012345678901234567890123" ; "not hex")]
    fn invalid_private_key_is_rejected(key: &str) {
        let err = config(&[("RPC_URL", "https://rpc.example"), ("PRIVATE_KEY", key)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn signing_key_is_normalised_and_redacted() {
        let key = SigningKey::parse(KEY).unwrap();
        assert_eq!(
            hex::encode(key.secret_bytes()),
            KEY[2..].to_ascii_lowercase()
        );
        assert_eq!(key, SigningKey::parse(&KEY[2..].to_ascii_uppercase()).unwrap());
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("abcdef"));
    }

    #[test]
    fn overrides_are_applied() {
        let mut vars = required();
        vars.extend([
            ("PORT", "8080"),
            ("PRICE_FEED_SYMBOLS", "eth, btc,"),
            ("PRICE_FEED_QUOTE_ASSET", "fdusd"),
            ("PRICE_FEED_IDLE_TIMEOUT_SECS", "0"),
            ("PUBLISH_INTERVAL_SECS", "10"),
            ("LEDGER_RECEIPT_POLL_MS", "250"),
        ]);
        let config = config(&vars).unwrap();

        assert_eq!(config.port, 8080);
        let names: Vec<_> = config.feed.symbols.iter().map(|s| s.as_str().to_string()).collect();
        assert_eq!(names, vec!["ETH", "BTC"]);
        assert_eq!(config.feed.quote_asset, "FDUSD");
        assert_eq!(config.feed.idle_timeout, None);
        assert_eq!(config.publish.interval, Duration::from_secs(10));
        assert_eq!(config.ledger.receipt_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let mut vars = required();
        vars.push(("PORT", "not-a-port"));
        assert_eq!(config(&vars).unwrap().port, 5000);
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let mut vars = required();
        vars.push(("PRICE_FEED_SYMBOLS", "BTC,btc"));
        assert!(matches!(config(&vars), Err(ConfigError::Symbols(_))));
    }

    #[test]
    fn client_config_uses_feed_settings() {
        let config = config(&required()).unwrap();
        let client = config.feed.client_config();
        assert!(client.url.starts_with("wss://data-stream.binance.vision/stream?streams=btcusdt@trade/"));
        assert_eq!(client.reconnect_delay, Duration::from_millis(1500));
    }
}
