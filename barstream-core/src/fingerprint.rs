//! Stream fingerprinting — a BLAKE3 digest over the exact event sequence.
//!
//! Two replays of the same subscriptions over the same cache must produce the
//! same digest; any change in order or content changes it.

use crate::domain::BarEvent;

#[derive(Debug, Clone, Default)]
pub struct StreamDigest {
    hasher: blake3::Hasher,
    events: u64,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: &BarEvent) {
        self.hasher.update(&event.canonical_bytes());
        self.events += 1;
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    /// Hex digest of everything seen so far.
    pub fn hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }

    /// Digest of a whole event slice.
    pub fn of(events: &[BarEvent]) -> String {
        let mut digest = Self::new();
        for ev in events {
            digest.update(ev);
        }
        digest.hex()
    }
}
