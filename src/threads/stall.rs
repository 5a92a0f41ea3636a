//! Stall detection for infinitely scrolling feeds.
//!
//! Pages differ in what changes when more posts load: some grow the document,
//! some only move the scroll offset, some animate either one without loading
//! anything. The heuristic is therefore pluggable.

use serde::{Deserialize, Serialize};

/// One measurement of the page taken after a scroll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageProbe {
    pub height: u64,
    pub offset: u64,
    pub end_marker: bool,
}

/// Decides whether the page advanced between two probes.
pub trait StallStrategy: Send {
    fn advanced(&mut self, previous: &PageProbe, current: &PageProbe) -> bool;
}

/// Progress means the document height changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeightStall;

impl StallStrategy for HeightStall {
    fn advanced(&mut self, previous: &PageProbe, current: &PageProbe) -> bool {
        previous.height != current.height
    }
}

/// Progress means the viewport moved.
#[derive(Debug, Default, Clone, Copy)]
pub struct OffsetStall;

impl StallStrategy for OffsetStall {
    fn advanced(&mut self, previous: &PageProbe, current: &PageProbe) -> bool {
        previous.offset != current.offset
    }
}

/// Progress means either the height or the offset changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeightOrOffsetStall;

impl StallStrategy for HeightOrOffsetStall {
    fn advanced(&mut self, previous: &PageProbe, current: &PageProbe) -> bool {
        previous.height != current.height || previous.offset != current.offset
    }
}

/// Configurable choice of [`StallStrategy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallKind {
    Height,
    Offset,
    #[default]
    HeightOrOffset,
}

impl StallKind {
    pub fn strategy(self) -> Box<dyn StallStrategy> {
        match self {
            StallKind::Height => Box::new(HeightStall),
            StallKind::Offset => Box::new(OffsetStall),
            StallKind::HeightOrOffset => Box::new(HeightOrOffsetStall),
        }
    }
}

/// Scroll bookkeeping of one collection run.
#[derive(Debug, Clone, Default)]
pub struct ScrollState {
    pub last: PageProbe,
    pub no_change: usize,
    pub iterations: usize,
}

impl ScrollState {
    pub fn new(initial: PageProbe) -> Self {
        Self {
            last: initial,
            no_change: 0,
            iterations: 0,
        }
    }

    /// Records one iteration and returns whether the page advanced.
    pub fn record(&mut self, strategy: &mut dyn StallStrategy, probe: PageProbe) -> bool {
        self.iterations += 1;
        let advanced = strategy.advanced(&self.last, &probe);
        if advanced {
            self.no_change = 0;
        } else {
            self.no_change += 1;
        }
        self.last = probe;
        advanced
    }

    /// Records an iteration whose probe could not be taken.
    pub fn record_failure(&mut self) {
        self.iterations += 1;
        self.no_change += 1;
    }

    pub fn stalled(&self, max_stall_count: usize) -> bool {
        self.no_change >= max_stall_count
    }
}
