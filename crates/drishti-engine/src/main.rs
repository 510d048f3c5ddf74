//! Engine entry point: load configuration, seed buffers from broker
//! history, and run the four long-lived tasks (tick ingestor, per-symbol
//! cadence schedulers and outcome watchers, dashboard server).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use drishti_broker::{BrokerClient, Credentials};
use drishti_engine::{
    bootstrap, config::EngineConfig, observability, CadenceScheduler, OutcomeWatcher,
};
use drishti_feed::{FeedConfig, Instrument, TickIngestor};
use drishti_models::CandleBuffer;
use drishti_server::{ApiState, SymbolHandle};
use drishti_signal::{GradientBoosted, PipelineState, Predictor, SignalPipeline};
use drishti_store::MetricsRepository;

/// Buffer capacity: covers five trading days of 5-minute bars with room
/// for the live day.
const BUFFER_CAPACITY: usize = 512;

#[derive(Debug, Parser)]
#[command(name = "drishti-engine", about = "Intraday signal engine for Indian index options")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "configs/engine.toml")]
    config: String,

    /// Override the dashboard server port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = EngineConfig::load(&args.config)?;
    let _guards = observability::init_tracing("drishti-engine");

    let session_id = Uuid::new_v4();
    info!(%session_id, symbols = cfg.symbols.len(), "engine starting");

    let credentials = Credentials::new(cfg.broker_config());
    let broker = BrokerClient::new(credentials)?;
    if let Err(e) = broker.ensure_fresh_token().await {
        warn!(error = %e, "startup token refresh failed, continuing with configured token");
    }

    if let Some(parent) = std::path::Path::new(&cfg.db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let repo = Arc::new(MetricsRepository::open(&cfg.db_path).context("open metrics repository")?);

    // Model artifact: immutable after load, shared across symbols.
    let model = match &cfg.model_path {
        Some(path) => match GradientBoosted::from_json_file(path) {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                error!(error = %e, path, "model load failed, pipeline will emit WAIT");
                None
            }
        },
        None => {
            warn!("no model_path configured, pipeline will emit WAIT");
            None
        }
    };

    let (outcome_tx, _) = broadcast::channel(256);
    let mut feed_buffers = HashMap::new();
    let mut api_symbols = HashMap::new();
    let mut instruments = Vec::new();
    let mut per_symbol = Vec::new();

    for symbol in &cfg.symbols {
        let buffer = Arc::new(RwLock::new(CandleBuffer::new(BUFFER_CAPACITY)));
        match bootstrap::seed_buffer(&broker, symbol, &buffer).await {
            Ok(bars) if bars >= drishti_features::MIN_WINDOW => {}
            Ok(bars) => warn!(symbol = %symbol.name, bars, "thin history, waiting for live bars"),
            Err(e) => warn!(symbol = %symbol.name, error = %e, "history bootstrap failed"),
        }

        let state = Arc::new(RwLock::new(PipelineState::default()));
        let predictor = match &model {
            Some(m) => Predictor::with_shared(m.clone()),
            None => Predictor::new(),
        };
        let pipeline = SignalPipeline::new(cfg.pipeline_config(symbol), predictor, repo.clone());

        feed_buffers.insert(symbol.security_id, buffer.clone());
        instruments.push(Instrument {
            exchange_segment: symbol.exchange_segment.clone(),
            security_id: symbol.security_id.to_string(),
        });
        api_symbols.insert(
            symbol.name.clone(),
            SymbolHandle {
                security_id: symbol.security_id,
                buffer: buffer.clone(),
                state: state.clone(),
            },
        );
        per_symbol.push((symbol.clone(), buffer, state, pipeline));
    }

    let feed_config = FeedConfig {
        idle_timeout_secs: 60,
        market_open_min: cfg.market_open_min(),
        market_close_min: cfg.market_close_min(),
    };
    let ingestor = TickIngestor::new(broker.clone(), feed_config, instruments, feed_buffers);
    let latest_tick = ingestor.latest_tick();

    for (symbol, buffer, state, pipeline) in per_symbol {
        let scheduler = CadenceScheduler::new(
            pipeline,
            state.clone(),
            repo.clone(),
            buffer,
            broker.clone(),
            symbol.clone(),
            cfg.cadence_seconds,
            cfg.level_validity_seconds as i64,
            cfg.market_open_min(),
            cfg.market_close_min(),
            cfg.retention_days,
        );
        tokio::spawn(scheduler.run());

        let watcher = OutcomeWatcher::new(
            state,
            repo.clone(),
            symbol.security_id,
            symbol.lot_size,
            outcome_tx.clone(),
        );
        let ticks = ingestor.subscribe_ticks();
        tokio::spawn(watcher.run(ticks));
    }

    tokio::spawn(async move { ingestor.run().await });

    let api_state = ApiState {
        symbols: api_symbols,
        repo,
        latest_tick,
        outcome_tx,
    };
    let port = args.port.unwrap_or(cfg.server_port);
    drishti_server::serve(api_state, &cfg.server_host, port).await
}
