//! Bar-stream engine: merge, registry, event stream, feed facade.
//!
//! Single-threaded and pull-based. The only blocking work happens while
//! subscribing (a possible remote fetch); once the merged tape is built,
//! pulling events is pure in-memory work.

pub mod feed;
pub mod merge;
pub mod registry;
pub mod stream;

pub use feed::{BarFeed, SubscribeOutcome};
pub use merge::{tape_order, MergeEngine, MergedSequence, Window};
pub use registry::TickerRegistry;
pub use stream::{BarEventStream, StreamItem, StreamState};

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("cannot compute adjusted-close return for {ticker} at {time}: previous adjusted close is zero")]
    ZeroDivisionInReturn { ticker: String, time: DateTime<Utc> },

    #[error("event for unsubscribed ticker '{ticker}'")]
    UnknownTicker { ticker: String },
}
