//! Shared server state: per-symbol buffers and pipeline state, the metrics
//! repository, and the stream channels.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, watch};

use drishti_models::{CandleBuffer, OutcomeEvent, Tick};
use drishti_signal::PipelineState;
use drishti_store::MetricsRepository;

/// Read-side handle for one configured symbol.
#[derive(Clone)]
pub struct SymbolHandle {
    pub security_id: u32,
    pub buffer: Arc<RwLock<CandleBuffer>>,
    pub state: Arc<RwLock<PipelineState>>,
}

/// State shared with every handler.
#[derive(Clone)]
pub struct ApiState {
    pub symbols: HashMap<String, SymbolHandle>,
    pub repo: Arc<MetricsRepository>,
    /// Latest tick, sampled by stream subscribers on their own throttle.
    pub latest_tick: watch::Receiver<Option<Tick>>,
    /// Outcome notifications from the watcher task.
    pub outcome_tx: broadcast::Sender<OutcomeEvent>,
}

impl ApiState {
    pub fn symbol(&self, name: &str) -> Option<&SymbolHandle> {
        self.symbols.get(name)
    }
}
