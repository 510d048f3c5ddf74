//! # Drishti Signal
//!
//! The signal-generation pipeline: market-condition classification, setup
//! quality, the deterministic parameter matrix, the gradient-boosted
//! predictor, the five-stage filter chain, and the trading-level generator,
//! orchestrated into one synchronous cadence evaluation.

pub mod condition;
pub mod filters;
pub mod levels;
pub mod params;
pub mod pipeline;
pub mod predictor;
pub mod quality;
pub mod state;

pub use condition::classify;
pub use filters::{FilterConfig, FilterContext};
pub use levels::LevelConfig;
pub use pipeline::{Evaluation, PipelineConfig, SignalPipeline, StructureRow};
pub use predictor::{GradientBoosted, Predictor};
pub use state::{adaptive_threshold, PipelineState};
