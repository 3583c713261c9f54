//! Domain types for the bar stream

pub mod bar;
pub mod event;
pub mod granularity;
pub mod ticker;

pub use bar::NormalizedBar;
pub use event::BarEvent;
pub use granularity::Granularity;
pub use ticker::TickerState;
