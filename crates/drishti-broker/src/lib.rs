//! # Drishti Broker
//!
//! REST connector for the market-data service: historical intraday candles,
//! option chain, and the access-token lifecycle.
//!
//! Auth: bearer token in the `access-token` header plus `client-id`. Tokens
//! live ~24 h; the client refreshes proactively one hour before expiry and
//! reactively (once) on a 401.
//!
//! Retries: up to 3 attempts with 1 s / 2 s / 4 s backoff on 5xx and
//! timeouts; exhaustion surfaces `DataUnavailable` and the cadence that
//! asked simply skips.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tracing::{info, warn};

use drishti_models::{Candle, ChainSnapshot, EngineError};
use types::{
    ChainRequest, ChainResponse, IntradayRequest, IntradayResponse, TokenRequest, TokenResponse,
};

/// Broker endpoints and credentials.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub base_url: String,
    pub ws_host: String,
    pub client_id: String,
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    /// Epoch seconds UTC; None when unknown.
    pub token_expiry: Option<i64>,
}

impl BrokerConfig {
    /// Refresh proactively inside this window before expiry.
    const REFRESH_MARGIN_SECS: i64 = 3_600;

    pub fn token_needs_refresh(&self, now: i64) -> bool {
        match self.token_expiry {
            Some(expiry) => now >= expiry - Self::REFRESH_MARGIN_SECS,
            None => false,
        }
    }
}

/// Shared credential state, readable by the websocket feed for its URL.
#[derive(Debug)]
pub struct Credentials {
    inner: RwLock<BrokerConfig>,
}

impl Credentials {
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(config),
        })
    }

    pub async fn snapshot(&self) -> BrokerConfig {
        self.inner.read().await.clone()
    }

    /// Websocket URL with auth carried in query parameters, the feed's wire
    /// convention (not headers).
    pub async fn ws_url(&self) -> String {
        let cfg = self.inner.read().await;
        format!(
            "wss://{}?version=2&token={}&clientId={}&authType=2",
            cfg.ws_host, cfg.access_token, cfg.client_id
        )
    }

    async fn store_token(&self, token: String, expiry: i64) {
        let mut cfg = self.inner.write().await;
        cfg.access_token = token;
        cfg.token_expiry = Some(expiry);
    }
}

/// REST client. Cheap to clone; the HTTP pool and credentials are shared.
#[derive(Clone)]
pub struct BrokerClient {
    http: reqwest::Client,
    credentials: Arc<Credentials>,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAYS_MS: [u64; 3] = [1_000, 2_000, 4_000];

impl BrokerClient {
    pub fn new(credentials: Arc<Credentials>) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::DataUnavailable(format!("http client: {e}")))?;
        Ok(Self { http, credentials })
    }

    pub fn credentials(&self) -> Arc<Credentials> {
        self.credentials.clone()
    }

    /// Historical intraday candles for one security.
    pub async fn historical_candles(
        &self,
        security_id: &str,
        exchange_segment: &str,
        interval_minutes: u32,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<Candle>, EngineError> {
        let body = IntradayRequest {
            security_id: security_id.to_string(),
            exchange_segment: exchange_segment.to_string(),
            instrument: "INDEX".to_string(),
            interval: interval_minutes,
            from_date: from_date.to_string(),
            to_date: to_date.to_string(),
        };
        let response: IntradayResponse = self.post_json("/charts/intraday", &body).await?;
        let candles = response.into_candles();
        info!(security_id, count = candles.len(), "historical candles fetched");
        Ok(candles)
    }

    /// Current option chain for an underlying and expiry.
    pub async fn option_chain(
        &self,
        underlying: &str,
        underlying_scrip: u32,
        underlying_seg: &str,
        expiry: &str,
    ) -> Result<ChainSnapshot, EngineError> {
        let body = ChainRequest {
            underlying_scrip,
            underlying_seg: underlying_seg.to_string(),
            expiry: expiry.to_string(),
        };
        let response: ChainResponse = self.post_json("/optionchain", &body).await?;
        Ok(response.into_snapshot(underlying, expiry, Utc::now().timestamp()))
    }

    /// Refresh the access token using the long-lived API credentials.
    pub async fn refresh_token(&self) -> Result<(), EngineError> {
        let cfg = self.credentials.snapshot().await;
        let body = TokenRequest {
            client_id: cfg.client_id.clone(),
            api_key: cfg.api_key.clone(),
            api_secret: cfg.api_secret.clone(),
        };

        let url = format!("{}/auth/token", cfg.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::AuthFailed(format!("token refresh: {e}")))?;

        if !resp.status().is_success() {
            return Err(EngineError::AuthFailed(format!(
                "token refresh returned {}",
                resp.status()
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::AuthFailed(format!("token refresh body: {e}")))?;
        self.credentials
            .store_token(token.access_token, token.expires_at)
            .await;
        info!(expires_at = token.expires_at, "access token refreshed");
        Ok(())
    }

    /// Refresh proactively when inside the expiry margin.
    pub async fn ensure_fresh_token(&self) -> Result<(), EngineError> {
        let cfg = self.credentials.snapshot().await;
        if cfg.token_needs_refresh(Utc::now().timestamp()) {
            self.refresh_token().await?;
        }
        Ok(())
    }

    /// POST with retries on transient failures and one refresh-then-retry
    /// on 401.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, EngineError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let mut refreshed = false;
        let mut last_error = String::new();

        for attempt in 0..=RETRY_DELAYS_MS.len() {
            let cfg = self.credentials.snapshot().await;
            let url = format!("{}{}", cfg.base_url, path);

            let result = self
                .http
                .post(&url)
                .header("access-token", &cfg.access_token)
                .header("client-id", &cfg.client_id)
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json()
                        .await
                        .map_err(|e| EngineError::DataUnavailable(format!("{path}: {e}")));
                }
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED && !refreshed => {
                    warn!(path, "401 from broker, refreshing token");
                    self.refresh_token().await?;
                    refreshed = true;
                    // One immediate retry without consuming a backoff slot.
                    continue;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last_error = format!("{path}: server returned {}", resp.status());
                }
                Ok(resp) => {
                    return Err(EngineError::DataUnavailable(format!(
                        "{path}: broker returned {}",
                        resp.status()
                    )));
                }
                Err(e) => {
                    last_error = format!("{path}: {e}");
                }
            }

            if attempt < RETRY_DELAYS_MS.len() {
                let delay = RETRY_DELAYS_MS[attempt];
                warn!(path, attempt, delay_ms = delay, error = %last_error, "broker call retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(EngineError::DataUnavailable(last_error))
    }
}
