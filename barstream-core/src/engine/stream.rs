//! BarEventStream — pull-based replay of the merged tape.
//!
//! ```text
//!   Running ──(sequence empty)──► Exhausted
//!      │ next_event(): row → BarEvent, registry.update, return Bar
//!      └────────────────────────  Exhausted: EndOfStream forever, no side effects
//! ```

use super::merge::{MergeEngine, MergedSequence, Window};
use super::registry::TickerRegistry;
use super::EngineError;
use crate::domain::{BarEvent, NormalizedBar};
use tracing::{debug, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Running,
    Exhausted,
}

/// Result of one pull.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Bar(BarEvent),
    EndOfStream,
}

impl StreamItem {
    pub fn into_event(self) -> Option<BarEvent> {
        match self {
            StreamItem::Bar(ev) => Some(ev),
            StreamItem::EndOfStream => None,
        }
    }
}

pub struct BarEventStream {
    sequence: MergedSequence,
    state: StreamState,
    period: i64,
    emitted: u64,
    span: Span,
}

impl BarEventStream {
    /// Build the merged tape eagerly from the tables passed in.
    ///
    /// The stream owns its rows: tables registered later never reach it.
    pub fn new<'a, I>(tables: I, window: Window, period: i64, span: Span) -> Self
    where
        I: IntoIterator<Item = &'a [NormalizedBar]>,
    {
        let sequence = MergeEngine::build(tables, window);
        debug!(parent: &span, rows = sequence.remaining(), period, "built merged tape");
        Self {
            sequence,
            state: StreamState::Running,
            period,
            emitted: 0,
            span,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == StreamState::Exhausted
    }

    /// Events delivered so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Rows left on the tape.
    pub fn remaining(&self) -> usize {
        self.sequence.remaining()
    }

    /// Pull the next bar and apply it to `registry`.
    ///
    /// If the registry rejects the update the row is still consumed and the
    /// error is returned instead of the event.
    pub fn next_event(&mut self, registry: &mut TickerRegistry) -> Result<StreamItem, EngineError> {
        if self.state == StreamState::Exhausted {
            return Ok(StreamItem::EndOfStream);
        }

        let Some((index, row)) = self.sequence.next() else {
            self.state = StreamState::Exhausted;
            debug!(parent: &self.span, emitted = self.emitted, "stream exhausted");
            return Ok(StreamItem::EndOfStream);
        };

        let event = BarEvent::from_row(index, self.period, row);
        registry.update(&event)?;
        self.emitted += 1;
        Ok(StreamItem::Bar(event))
    }
}
