//! # Drishti Engine
//!
//! Runner wiring for the signal engine: configuration, tracing, historical
//! bootstrap, the cadence scheduler, and the outcome watcher.

pub mod bootstrap;
pub mod config;
pub mod observability;
pub mod scheduler;
pub mod watcher;

pub use config::{EngineConfig, SymbolConfig};
pub use scheduler::CadenceScheduler;
pub use watcher::OutcomeWatcher;
