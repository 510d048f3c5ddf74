//! # Drishti Feed
//!
//! Live market-feed controller: websocket tick ingestion, binary ticker
//! parsing, 5-minute candle aggregation into shared buffers, and fanout to
//! the outcome watcher and the dashboard stream.

pub mod ingestor;
pub mod ticks;

pub use ingestor::{FeedConfig, FeedStatus, TickIngestor};
pub use ticks::{Instrument, SubscribeRequest};
