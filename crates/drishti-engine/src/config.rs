//! Engine configuration: TOML file with environment overrides for broker
//! credentials.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use drishti_broker::BrokerConfig;
use drishti_signal::PipelineConfig;

/// One traded symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    pub security_id: u32,
    pub exchange_segment: String,
    /// Contract lot size (e.g. NIFTY 65).
    pub lot_size: u32,
    /// Listed strike spacing (NIFTY 50, SENSEX 100).
    pub strike_step: f64,
    /// Underlying scrip id for the option-chain endpoint.
    pub underlying_scrip: u32,
    pub underlying_seg: String,
    /// Chain expiry (ISO date). When absent the chain fetch is skipped and
    /// option features run stale.
    #[serde(default)]
    pub expiry: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_ws_host")]
    pub ws_host: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub access_token: String,
    /// Epoch seconds UTC.
    #[serde(default)]
    pub token_expiry: Option<i64>,
}

fn default_base_url() -> String {
    "https://api.dhan.co/v2".to_string()
}

fn default_ws_host() -> String {
    "api-feed.dhan.co".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Base capital for position sizing.
    pub capital: f64,
    /// Lots at multiplier 1.0.
    #[serde(default = "default_base_lots")]
    pub base_lots: u32,
    pub max_per_trade_loss: f64,
    pub max_daily_loss: f64,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_confidence_ceiling")]
    pub confidence_ceiling: f64,
    /// Session window, "HH:MM" IST.
    #[serde(default = "default_market_open")]
    pub market_open: String,
    #[serde(default = "default_market_close")]
    pub market_close: String,
    #[serde(default = "default_cadence")]
    pub cadence_seconds: u64,
    #[serde(default = "default_cadence")]
    pub level_validity_seconds: u64,
    #[serde(default = "default_retention")]
    pub retention_days: u32,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Gradient-boosted model artifact (JSON). Absent ⇒ pipeline emits
    /// WAIT audits until one is provided.
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Years to option expiry used for premium fallbacks.
    #[serde(default = "default_tte_years")]
    pub time_to_expiry_years: f64,
    pub broker: BrokerSection,
    pub symbols: Vec<SymbolConfig>,
}

fn default_base_lots() -> u32 {
    1
}
fn default_confidence_floor() -> f64 {
    60.0
}
fn default_confidence_ceiling() -> f64 {
    75.0
}
fn default_market_open() -> String {
    "09:15".to_string()
}
fn default_market_close() -> String {
    "15:30".to_string()
}
fn default_cadence() -> u64 {
    900
}
fn default_retention() -> u32 {
    30
}
fn default_db_path() -> String {
    "data/metrics.db".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_risk_free_rate() -> f64 {
    0.065
}
fn default_tte_years() -> f64 {
    2.0 / 365.0
}

impl EngineConfig {
    /// Load from a TOML file, then let `DHAN_*` environment variables
    /// override the broker credentials.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("read config {}", path.as_ref().display()))?;
        let mut cfg: EngineConfig = toml::from_str(&text).context("parse config")?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        let overrides = [
            ("DHAN_CLIENT_ID", &mut self.broker.client_id),
            ("DHAN_API_KEY", &mut self.broker.api_key),
            ("DHAN_API_SECRET", &mut self.broker.api_secret),
            ("DHAN_ACCESS_TOKEN", &mut self.broker.access_token),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *slot = value;
                }
            }
        }
        if let Ok(value) = std::env::var("DHAN_TOKEN_EXPIRY") {
            if let Ok(expiry) = value.parse() {
                self.broker.token_expiry = Some(expiry);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(anyhow!("config lists no symbols"));
        }
        parse_hhmm(&self.market_open)?;
        parse_hhmm(&self.market_close)?;
        if self.confidence_floor > self.confidence_ceiling {
            return Err(anyhow!("confidence_floor exceeds confidence_ceiling"));
        }
        Ok(())
    }

    /// Session open in minutes after IST midnight.
    pub fn market_open_min(&self) -> i64 {
        parse_hhmm(&self.market_open).expect("validated at load")
    }

    pub fn market_close_min(&self) -> i64 {
        parse_hhmm(&self.market_close).expect("validated at load")
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            base_url: self.broker.base_url.clone(),
            ws_host: self.broker.ws_host.clone(),
            client_id: self.broker.client_id.clone(),
            api_key: self.broker.api_key.clone(),
            api_secret: self.broker.api_secret.clone(),
            access_token: self.broker.access_token.clone(),
            token_expiry: self.broker.token_expiry,
        }
    }

    pub fn pipeline_config(&self, symbol: &SymbolConfig) -> PipelineConfig {
        PipelineConfig {
            symbol: symbol.name.clone(),
            lot_size: symbol.lot_size,
            base_lots: self.base_lots,
            max_per_trade_loss: self.max_per_trade_loss,
            max_daily_loss: self.max_daily_loss,
            confidence_floor: self.confidence_floor,
            confidence_ceiling: self.confidence_ceiling,
            strike_step: symbol.strike_step,
            risk_free_rate: self.risk_free_rate,
            time_to_expiry_years: self.time_to_expiry_years,
        }
    }
}

fn parse_hhmm(s: &str) -> Result<i64> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("expected HH:MM, got {s}"))?;
    let h: i64 = h.parse().with_context(|| format!("bad hour in {s}"))?;
    let m: i64 = m.parse().with_context(|| format!("bad minute in {s}"))?;
    if !(0..24).contains(&h) || !(0..60).contains(&m) {
        return Err(anyhow!("out-of-range time {s}"));
    }
    Ok(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        capital = 100000.0
        max_per_trade_loss = 1000.0
        max_daily_loss = 3000.0
        base_lots = 2

        [broker]
        client_id = "C123"
        api_key = "key"
        api_secret = "secret"
        access_token = "tok"

        [[symbols]]
        name = "NIFTY"
        security_id = 13
        exchange_segment = "IDX_I"
        lot_size = 65
        strike_step = 50.0
        underlying_scrip = 13
        underlying_seg = "IDX_I"
        expiry = "2026-08-06"

        [[symbols]]
        name = "SENSEX"
        security_id = 51
        exchange_segment = "IDX_I"
        lot_size = 20
        strike_step = 100.0
        underlying_scrip = 51
        underlying_seg = "IDX_I"
    "#;

    #[test]
    fn sample_config_parses_with_defaults() {
        let mut cfg: EngineConfig = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.cadence_seconds, 900);
        assert_eq!(cfg.level_validity_seconds, 900);
        assert_eq!(cfg.retention_days, 30);
        assert_eq!(cfg.confidence_floor, 60.0);
        assert_eq!(cfg.market_open_min(), 9 * 60 + 15);
        assert_eq!(cfg.market_close_min(), 15 * 60 + 30);
        assert_eq!(cfg.symbols.len(), 2);
        assert!(cfg.symbols[1].expiry.is_none());
    }

    #[test]
    fn pipeline_config_uses_symbol_fields() {
        let cfg: EngineConfig = toml::from_str(SAMPLE).unwrap();
        let p = cfg.pipeline_config(&cfg.symbols[1]);
        assert_eq!(p.symbol, "SENSEX");
        assert_eq!(p.lot_size, 20);
        assert_eq!(p.strike_step, 100.0);
        assert_eq!(p.base_lots, 2);
    }

    #[test]
    fn hhmm_parsing_rejects_garbage() {
        assert!(parse_hhmm("09:15").is_ok());
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("0915").is_err());
    }
}
