use crate::datasource::binance::DEFAULT_BASE_URL;
use crate::datasource::pagination::DEFAULT_PAGE_LIMIT;
use crate::domain::{Asset, Symbol};
use crate::engine::{PnlMode, ReversalPolicy};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Clone)]
pub struct Config {
    pub database_path: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_url: String,
    pub quote_asset: Asset,
    /// Local hour at which a trading day starts.
    pub day_anchor_hour: u32,
    pub utc_offset_minutes: i32,
    /// Days of fill history used to reconstruct positions.
    pub lookback_days: u32,
    pub page_limit: usize,
    pub pnl_mode: PnlMode,
    pub reversal_policy: ReversalPolicy,
    /// Refuse to persist when a fatal-class anomaly occurred.
    pub strict_mode: bool,
    /// Instruments to fetch; empty means discover them from the income ledger.
    pub symbols: Vec<Symbol>,
    /// Trading day to report; None means the most recently completed day.
    pub report_date: Option<NaiveDate>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("api_url", &self.api_url)
            .field("quote_asset", &self.quote_asset)
            .field("day_anchor_hour", &self.day_anchor_hour)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("lookback_days", &self.lookback_days)
            .field("page_limit", &self.page_limit)
            .field("pnl_mode", &self.pnl_mode)
            .field("reversal_policy", &self.reversal_policy)
            .field("strict_mode", &self.strict_mode)
            .field("symbols", &self.symbols)
            .field("report_date", &self.report_date)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = required(&env_map, "DATABASE_PATH")?;
        let api_key = required(&env_map, "EXCHANGE_API_KEY")?;
        let api_secret = required(&env_map, "EXCHANGE_API_SECRET")?;

        let api_url = env_map
            .get("EXCHANGE_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let quote_asset = Asset::new(
            env_map
                .get("QUOTE_ASSET")
                .map(|s| s.as_str())
                .unwrap_or("USDT"),
        );

        let day_anchor_hour = parse_or(&env_map, "DAY_ANCHOR_HOUR", 9u32, "must be an hour 0-23")?;
        if day_anchor_hour > 23 {
            return Err(invalid("DAY_ANCHOR_HOUR", "must be an hour 0-23"));
        }

        let utc_offset_minutes = parse_or(
            &env_map,
            "UTC_OFFSET_MINUTES",
            0i32,
            "must be minutes in -720..=840",
        )?;
        if !(-720..=840).contains(&utc_offset_minutes) {
            return Err(invalid("UTC_OFFSET_MINUTES", "must be minutes in -720..=840"));
        }

        let lookback_days = parse_or(&env_map, "LOOKBACK_DAYS", 7u32, "must be a positive integer")?;
        if lookback_days == 0 {
            return Err(invalid("LOOKBACK_DAYS", "must be a positive integer"));
        }

        let page_limit = parse_or(
            &env_map,
            "PAGE_LIMIT",
            DEFAULT_PAGE_LIMIT,
            "must be an integer in 1..=1000",
        )?;
        if !(1..=1000).contains(&page_limit) {
            return Err(invalid("PAGE_LIMIT", "must be an integer in 1..=1000"));
        }

        let pnl_mode = parse_or(&env_map, "PNL_MODE", PnlMode::Gross, "must be gross or net")?;
        let reversal_policy = parse_or(
            &env_map,
            "REVERSAL_POLICY",
            ReversalPolicy::Accumulate,
            "must be accumulate or split",
        )?;

        let strict_mode = match env_map
            .get("STRICT_MODE")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("0") | Some("false") | Some("no") => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "STRICT_MODE".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let symbols = env_map
            .get("SYMBOLS")
            .map(|s| {
                s.split(',')
                    .map(Symbol::new)
                    .filter(|sym| !sym.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let report_date = match env_map.get("REPORT_DATE") {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .map_err(|_| invalid("REPORT_DATE", "must be a YYYY-MM-DD date"))?,
            ),
            None => None,
        };

        Ok(Config {
            database_path,
            api_key,
            api_secret,
            api_url,
            quote_asset,
            day_anchor_hour,
            utc_offset_minutes,
            lookback_days,
            page_limit,
            pnl_mode,
            reversal_policy,
            strict_mode,
            symbols,
            report_date,
        })
    }

    /// Defaults for everything but the required values; used by tests and embedders.
    pub fn with_database(database_path: impl Into<String>) -> Self {
        Config {
            database_path: database_path.into(),
            api_key: String::new(),
            api_secret: String::new(),
            api_url: DEFAULT_BASE_URL.to_string(),
            quote_asset: Asset::new("USDT"),
            day_anchor_hour: 9,
            utc_offset_minutes: 0,
            lookback_days: 7,
            page_limit: DEFAULT_PAGE_LIMIT,
            pnl_mode: PnlMode::Gross,
            reversal_policy: ReversalPolicy::Accumulate,
            strict_mode: false,
            symbols: Vec::new(),
            report_date: None,
        }
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expectation: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| invalid(key, expectation)),
        None => Ok(default),
    }
}

fn invalid(key: &str, expectation: &str) -> ConfigError {
    ConfigError::InvalidValue(key.to_string(), expectation.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert("EXCHANGE_API_KEY".to_string(), "key".to_string());
        map.insert("EXCHANGE_API_SECRET".to_string(), "secret".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.api_url, "https://fapi.binance.com");
        assert_eq!(config.quote_asset, Asset::new("USDT"));
        assert_eq!(config.day_anchor_hour, 9);
        assert_eq!(config.utc_offset_minutes, 0);
        assert_eq!(config.lookback_days, 7);
        assert_eq!(config.page_limit, 1000);
        assert_eq!(config.pnl_mode, PnlMode::Gross);
        assert_eq!(config.reversal_policy, ReversalPolicy::Accumulate);
        assert!(!config.strict_mode);
        assert!(config.symbols.is_empty());
        assert_eq!(config.report_date, None);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_api_secret() {
        let mut env_map = setup_required_env();
        env_map.remove("EXCHANGE_API_SECRET");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "EXCHANGE_API_SECRET"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_anchor_hour() {
        let mut env_map = setup_required_env();
        env_map.insert("DAY_ANCHOR_HOUR".to_string(), "24".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DAY_ANCHOR_HOUR"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_page_limit() {
        let mut env_map = setup_required_env();
        env_map.insert("PAGE_LIMIT".to_string(), "5000".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PAGE_LIMIT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_pnl_mode() {
        let mut env_map = setup_required_env();
        env_map.insert("PNL_MODE".to_string(), "invalid".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PNL_MODE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_parses_overrides() {
        let mut env_map = setup_required_env();
        env_map.insert("PNL_MODE".to_string(), "net".to_string());
        env_map.insert("REVERSAL_POLICY".to_string(), "split".to_string());
        env_map.insert("STRICT_MODE".to_string(), "TRUE".to_string());
        env_map.insert("SYMBOLS".to_string(), "btcusdt, ETHUSDT,,".to_string());
        env_map.insert("UTC_OFFSET_MINUTES".to_string(), "540".to_string());
        env_map.insert("REPORT_DATE".to_string(), "2025-01-15".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.pnl_mode, PnlMode::Net);
        assert_eq!(config.reversal_policy, ReversalPolicy::Split);
        assert!(config.strict_mode);
        assert_eq!(
            config.symbols,
            vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")]
        );
        assert_eq!(config.utc_offset_minutes, 540);
        assert_eq!(config.report_date, NaiveDate::from_ymd_opt(2025, 1, 15));
    }

    #[test]
    fn test_invalid_strict_mode_and_date() {
        let mut env_map = setup_required_env();
        env_map.insert("STRICT_MODE".to_string(), "maybe".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "STRICT_MODE"
        ));

        let mut env_map = setup_required_env();
        env_map.insert("REPORT_DATE".to_string(), "15/01/2025".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "REPORT_DATE"
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert!(!format!("{:?}", config).contains("secret"));
    }
}
