use std::collections::HashSet;
use std::time::Duration;

use geo_common::point::Point;
use tokio::time::Instant;

/// The seen-set is cleared once it holds more timestamps than this.
pub const MAX_SEEN_TIMESTAMPS: usize = 100;

/// What the deduplicator remembers about earlier points.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupState {
    /// Source timestamps seen recently. Used with streaming sources, which may report the same fix
    /// more than once.
    SeenTimestamps(HashSet<i64>),
    /// Coordinates of the last accepted point. Used with polled sources, which report the last
    /// known position whether or not it changed.
    LastPosition(Option<(f64, f64)>),
}

/// Decides whether a point is novel enough to emit.
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicator {
    state: DedupState,
}

impl Deduplicator {
    pub fn seen_timestamps() -> Self {
        Self {
            state: DedupState::SeenTimestamps(HashSet::new()),
        }
    }

    pub fn last_position() -> Self {
        Self {
            state: DedupState::LastPosition(None),
        }
    }

    #[cfg(test)]
    fn state(&self) -> &DedupState {
        &self.state
    }

    /// Check a point for novelty, remembering it if it is novel.
    pub fn should_emit(&mut self, point: &Point) -> bool {
        match &mut self.state {
            DedupState::SeenTimestamps(seen) => {
                let novel = seen.insert(point.timestamp);
                // Bounds memory: the whole set goes, this is not an LRU.
                if seen.len() > MAX_SEEN_TIMESTAMPS {
                    seen.clear();
                }
                novel
            }
            DedupState::LastPosition(last) => {
                let coordinates = point.coordinates();
                if *last == Some(coordinates) {
                    return false;
                }
                *last = Some(coordinates);
                true
            }
        }
    }
}

/// Limits how often points are emitted, independently of deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimit {
    /// Drop points until `interval` has passed since the last emission.
    Gate {
        interval: Duration,
        last_emission: Instant,
    },
    /// Sleep `interval` between acquisitions; every point passes.
    Pace(Duration),
}

impl RateLimit {
    /// A gate that counts the first interval from now.
    pub fn gate(interval: Duration) -> Self {
        RateLimit::Gate {
            interval,
            last_emission: Instant::now(),
        }
    }

    pub fn pace(interval: Duration) -> Self {
        RateLimit::Pace(interval)
    }

    pub fn is_open(&self) -> bool {
        match self {
            RateLimit::Gate {
                interval,
                last_emission,
            } => last_emission.elapsed() >= *interval,
            RateLimit::Pace(_) => true,
        }
    }

    pub fn record_emission(&mut self) {
        if let RateLimit::Gate { last_emission, .. } = self {
            *last_emission = Instant::now();
        }
    }

    /// How long to sleep after each acquisition.
    pub fn pause(&self) -> Option<Duration> {
        match self {
            RateLimit::Gate { .. } => None,
            RateLimit::Pace(interval) => Some(*interval),
        }
    }
}
