//! Collector configuration, loaded once from TOML and passed down immutably.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! production setup: collection from 2025-02-01 to today against the live
//! NSE/BSE endpoints.

use chrono::NaiveDate;
use marketstat_core::data::{RetryPolicy, SessionProfile, DEFAULT_USER_AGENT};
use marketstat_core::domain::{Exchange, TradingCalendar, BSE_HOLIDAYS, NSE_HOLIDAYS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectorConfig {
    /// First date to collect (inclusive).
    pub start_date: NaiveDate,
    /// Last date to collect (inclusive). Defaults to today.
    pub end_date: Option<NaiveDate>,
    /// Directory holding the per-source `<id>_cache.json` files.
    pub cache_dir: PathBuf,
    /// Consolidated CSV path.
    pub output: PathBuf,
    /// Persist a source's cache after this many newly collected dates.
    pub checkpoint_every: usize,
    /// Collect only these source ids (all when absent).
    pub sources: Option<Vec<String>>,
    pub http: HttpConfig,
    pub nse: ExchangeConfig,
    pub bse: ExchangeConfig,
    pub endpoints: Endpoints,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1).expect("valid default start date"),
            end_date: None,
            cache_dir: PathBuf::from("."),
            output: PathBuf::from("nse_fo_aggregated_data.csv"),
            checkpoint_every: 10,
            sources: None,
            http: HttpConfig::default(),
            nse: ExchangeConfig::default(),
            bse: ExchangeConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

/// Retry, pacing and identity settings shared by all sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub session_refresh_every: u32,
    pub request_pause_ms: u64,
    pub seed_timeout_secs: u64,
    pub seed_pause_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 4,
            retry_base_delay_secs: 5,
            session_refresh_every: 20,
            request_pause_ms: 500,
            seed_timeout_secs: 20,
            seed_pause_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(self.retry_base_delay_secs),
            session_refresh_every: self.session_refresh_every,
            request_pause: Duration::from_millis(self.request_pause_ms),
        }
    }
}

/// Per-exchange overrides. Unset fields fall back to the built-in values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeConfig {
    pub home_url: Option<String>,
    pub referer: Option<String>,
    /// Holiday dates as `DDMMYYYY`.
    pub holidays: Option<Vec<String>>,
}

/// URL templates, one per source.
///
/// Placeholders: `{DDMMYYYY}`, `{DDMMYY}`, `{YYYYMMDD}` for the requested
/// date; `{MON}`, `{YYYY}`, `{YY}` for its month; `{FROM}`/`{TO}` for the
/// month's first day and its last day (capped at today), as `DD-MM-YYYY`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub nse_fo: String,
    pub bse_fo: String,
    pub nse_cat: String,
    pub nse_eq_cat: String,
    pub nse_mrg: String,
    pub nse_part: String,
    pub nse_reg_investors: String,
    pub bse_reg_investors: String,
    pub nse_mfss: String,
    pub nse_market_turnover: String,
    pub nse_tbg_cm: String,
    pub nse_tbg_fo: String,
    pub nse_tbg_commodity: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        const ARCHIVES: &str = "https://nsearchives.nseindia.com";
        const API: &str = "https://www.nseindia.com/api";
        Self {
            nse_fo: format!("{ARCHIVES}/archives/fo/mkt/fo{{DDMMYYYY}}.zip"),
            bse_fo: "https://www.bseindia.com/download/Bhavcopy/Derivative/MS_{YYYYMMDD}-01.csv"
                .into(),
            nse_cat: format!("{ARCHIVES}/archives/fo/cat/fo_cat_turnover_{{DDMMYY}}.xls"),
            nse_eq_cat: format!("{ARCHIVES}/archives/equities/cat/cat_turnover_{{DDMMYY}}.xls"),
            nse_mrg: format!("{ARCHIVES}/content/equities/mrg_trading_{{DDMMYY}}.zip"),
            nse_part: format!("{ARCHIVES}/content/nsccl/fao_participant_vol_{{DDMMYYYY}}.csv"),
            nse_reg_investors: format!("{API}/NextApi/apiClient?functionName=getMarketStatistics"),
            bse_reg_investors: "https://api.bseindia.com/BseIndiaAPI/api/MarketStat2/w".into(),
            nse_mfss: format!(
                "{API}/historicalOR/mfssTradeStatisticsData?from={{FROM}}&to={{TO}}"
            ),
            nse_market_turnover: format!("{API}/NextApi/apiClient?functionName=getMarketTurnover"),
            nse_tbg_cm: format!("{API}/historicalOR/cm/tbg/daily?month={{MON}}&year={{YY}}"),
            nse_tbg_fo: format!("{API}/historicalOR/fo/tbg/daily?month={{MON}}&year={{YYYY}}"),
            nse_tbg_commodity: format!(
                "{API}/historicalOR/comder/tbg/daily?month={{MON}}&year={{YYYY}}"
            ),
        }
    }
}

impl CollectorConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `path` if given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(ConfigError::Invalid(format!(
                    "end_date {end} is before start_date {}",
                    self.start_date
                )));
            }
        }
        if self.checkpoint_every == 0 {
            return Err(ConfigError::Invalid("checkpoint_every must be at least 1".into()));
        }
        if self.http.max_attempts == 0 {
            return Err(ConfigError::Invalid("http.max_attempts must be at least 1".into()));
        }
        for exchange in [Exchange::Nse, Exchange::Bse] {
            self.calendar(exchange)?;
        }
        Ok(())
    }

    /// Last date to collect: `end_date`, or `today`.
    pub fn end_or(&self, today: NaiveDate) -> NaiveDate {
        self.end_date.unwrap_or(today)
    }

    fn exchange(&self, exchange: Exchange) -> &ExchangeConfig {
        match exchange {
            Exchange::Nse => &self.nse,
            Exchange::Bse => &self.bse,
        }
    }

    pub fn home_url(&self, exchange: Exchange) -> &str {
        self.exchange(exchange)
            .home_url
            .as_deref()
            .unwrap_or(match exchange {
                Exchange::Nse => "https://www.nseindia.com",
                Exchange::Bse => "https://www.bseindia.com",
            })
    }

    pub fn referer(&self, exchange: Exchange) -> &str {
        self.exchange(exchange)
            .referer
            .as_deref()
            .unwrap_or(match exchange {
                Exchange::Nse => "https://www.nseindia.com",
                Exchange::Bse => "https://www.bseindia.com/markets/Derivatives/DerivativesHome.aspx",
            })
    }

    /// Trading calendar for `exchange`, from configured or built-in holidays.
    pub fn calendar(&self, exchange: Exchange) -> Result<TradingCalendar, ConfigError> {
        let result = match &self.exchange(exchange).holidays {
            Some(keys) => TradingCalendar::from_keys(exchange, keys.as_slice()),
            None => match exchange {
                Exchange::Nse => TradingCalendar::from_keys(exchange, NSE_HOLIDAYS),
                Exchange::Bse => TradingCalendar::from_keys(exchange, BSE_HOLIDAYS),
            },
        };
        result.map_err(|e| ConfigError::Invalid(format!("{exchange} holidays: {e}")))
    }

    /// Session settings for one source's fetcher.
    pub fn session_profile(&self, label: &str, exchange: Exchange, api: bool) -> SessionProfile {
        let ua = &self.http.user_agent;
        let referer = self.referer(exchange);
        SessionProfile {
            label: label.to_string(),
            home_url: self.home_url(exchange).to_string(),
            headers: if api {
                SessionProfile::api_headers(ua, referer)
            } else {
                SessionProfile::browser_headers(ua, referer)
            },
            timeout: Duration::from_secs(self.http.timeout_secs),
            seed_timeout: Duration::from_secs(self.http.seed_timeout_secs),
            seed_pause: Duration::from_millis(self.http.seed_pause_ms),
        }
    }

    /// Whether `source_id` passes the `sources` allow-list.
    pub fn wants(&self, source_id: &str) -> bool {
        self.sources
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == source_id))
    }

    pub fn cache_path(&self, source_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{source_id}_cache.json"))
    }
}
