//! Incremental scroll collection.
//!
//! Each iteration reads the post blocks currently rendered, records media
//! URLs whose normalized key has not been seen, scrolls, waits and probes the
//! page. Collection ends once the page stops advancing for
//! `max_stall_count` consecutive iterations, when an end-of-feed marker shows
//! up in an iteration that found nothing new, or at the iteration ceiling.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::threads::page::{DomContract, PageDriver, PageError, PageResult};
use crate::threads::stall::{PageProbe, ScrollState, StallKind, StallStrategy};
use crate::threads::tui::collection_spinner;
use crate::threads::urls::normalize_url;
use crate::threads::{MediaItem, MediaKinds};

/// Error types for the collector
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Invalid collector config: {0}")]
    InvalidConfig(String),
}

/// Result type for collector operations
pub type CollectResult<T> = Result<T, CollectError>;

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Wait between a scroll and the next probe.
    pub pause: Duration,
    /// Random spread applied to `pause`, as a fraction in `[0, 1)`.
    pub jitter: f64,
    /// Consecutive non-advancing iterations before stopping.
    pub max_stall_count: usize,
    /// Hard ceiling on iterations, for pages that never settle.
    pub max_iterations: usize,
    pub media_kinds: MediaKinds,
    pub stall: StallKind,
    pub dom: DomContract,
    pub show_progress: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            pause: Duration::from_millis(1500),
            jitter: 0.25,
            max_stall_count: 5,
            max_iterations: 2000,
            media_kinds: MediaKinds::ALL,
            stall: StallKind::default(),
            dom: DomContract::default(),
            show_progress: true,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> CollectResult<()> {
        if self.pause.is_zero() {
            return Err(CollectError::InvalidConfig("pause must be greater than zero".to_string()));
        }
        if self.max_stall_count == 0 {
            return Err(CollectError::InvalidConfig(
                "max_stall_count must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(CollectError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(CollectError::InvalidConfig(format!(
                "jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        Ok(())
    }
}

/// Media gathered so far in one run.
#[derive(Debug, Default)]
struct Harvest {
    seen: HashSet<String>,
    items: Vec<MediaItem>,
    next_group: u32,
}

impl Harvest {
    /// Records the unseen sources of one block under a single group ordinal.
    ///
    /// The ordinal is consumed only when the block yields something new.
    fn offer(&mut self, sources: Vec<String>) -> usize {
        let group = self.next_group;
        let mut added = 0;
        for url in sources {
            if url.is_empty() {
                continue;
            }
            let key = normalize_url(&url);
            if self.seen.insert(key) {
                self.items.push(MediaItem::new(url, Some(group)));
                added += 1;
            }
        }
        if added > 0 {
            self.next_group += 1;
        }
        added
    }
}

/// Scrolls a profile feed and collects its media.
pub struct Collector {
    config: CollectorConfig,
    strategy: Box<dyn StallStrategy>,
}

impl Collector {
    /// Create a collector using the strategy named in the config
    pub fn new(config: CollectorConfig) -> CollectResult<Self> {
        let strategy = config.stall.strategy();
        Self::with_strategy(config, strategy)
    }

    /// Create a collector with a custom stall strategy
    pub fn with_strategy(
        config: CollectorConfig,
        strategy: Box<dyn StallStrategy>,
    ) -> CollectResult<Self> {
        config.validate()?;
        Ok(Self { config, strategy })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Collects every unique media URL of the profile open in `page`.
    ///
    /// Never fails: unreadable blocks are skipped and failed probes count as
    /// stalled iterations.
    #[instrument(skip_all, fields(max_stall_count = self.config.max_stall_count))]
    pub async fn collect_all_media<P: PageDriver>(&mut self, page: &mut P) -> Vec<MediaItem> {
        let spinner = collection_spinner(self.config.show_progress);
        let mut harvest = Harvest::default();

        let initial = match self.probe(page).await {
            Ok(probe) => probe,
            Err(e) => {
                warn!("Initial page probe failed: {}", e);
                PageProbe::default()
            }
        };
        let mut state = ScrollState::new(initial);

        loop {
            let found = if self.config.media_kinds.any() {
                self.harvest_visible(page, &mut harvest).await
            } else {
                0
            };

            if let Err(e) = page.scroll_to_bottom().await {
                warn!("Scroll failed: {}", e);
            }
            sleep(self.jittered_pause()).await;

            match self.probe(page).await {
                Ok(probe) => {
                    let end_marker = probe.end_marker;
                    let advanced = state.record(self.strategy.as_mut(), probe);
                    debug!(
                        iteration = state.iterations,
                        found,
                        advanced,
                        height = probe.height,
                        offset = probe.offset,
                        no_change = state.no_change,
                        "Scroll iteration finished"
                    );
                    if end_marker && found == 0 {
                        info!("End of feed reached after {} iterations", state.iterations);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Page probe failed: {}", e);
                    state.record_failure();
                }
            }

            spinner.set_message(format!("Collected {} media", harvest.items.len()));

            if state.stalled(self.config.max_stall_count) {
                debug!("No progress for {} iterations, stopping", state.no_change);
                break;
            }
            if state.iterations >= self.config.max_iterations {
                warn!(
                    "Stopping after {} iterations without the feed settling",
                    state.iterations
                );
                break;
            }
        }

        spinner.finish_with_message(format!("Collected {} media", harvest.items.len()));
        harvest.items
    }

    /// Reads all visible blocks and returns how many new items they added.
    async fn harvest_visible<P: PageDriver>(&self, page: &mut P, harvest: &mut Harvest) -> usize {
        let blocks = match page.find_elements(&self.config.dom.post_block_selector).await {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("Could not enumerate post blocks: {}", e);
                return 0;
            }
        };

        let mut added = 0;
        for block in &blocks {
            match self.block_sources(page, block).await {
                Ok(sources) => added += harvest.offer(sources),
                Err(PageError::StaleElement(detail)) => {
                    debug!("Skipping stale post block: {}", detail);
                }
                Err(e) => warn!("Skipping unreadable post block: {}", e),
            }
        }
        added
    }

    /// Image sources then video sources of one block, in DOM order.
    async fn block_sources<P: PageDriver>(&self, page: &mut P, block: &P::Element) -> PageResult<Vec<String>> {
        let dom = &self.config.dom;
        let kinds = self.config.media_kinds;
        let mut sources = Vec::new();

        let selectors = [
            (kinds.images, dom.image_selector.as_str()),
            (kinds.videos, dom.video_selector.as_str()),
        ];
        for (enabled, selector) in selectors {
            if !enabled {
                continue;
            }
            for element in page.find_within(block, selector).await? {
                if let Some(src) = page.attribute(&element, &dom.source_attribute).await? {
                    sources.push(src);
                }
            }
        }
        Ok(sources)
    }

    async fn probe<P: PageDriver>(&self, page: &mut P) -> PageResult<PageProbe> {
        let height = page.scroll_height().await?;
        let offset = page.scroll_offset().await?;
        let end_marker = if self.config.dom.end_markers.is_empty() {
            false
        } else {
            match page.page_text().await {
                Ok(text) => self.config.dom.shows_end_marker(&text),
                Err(e) => {
                    debug!("Could not read page text: {}", e);
                    false
                }
            }
        };
        Ok(PageProbe {
            height,
            offset,
            end_marker,
        })
    }

    fn jittered_pause(&self) -> Duration {
        let jitter = self.config.jitter;
        if jitter <= 0.0 {
            return self.config.pause;
        }
        let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        self.config.pause.mul_f64(factor)
    }
}

/// Collects media with default jitter, strategy and DOM contract.
pub async fn collect_all_media<P: PageDriver>(
    page: &mut P,
    pause: Duration,
    max_stall_count: usize,
    media_kinds: MediaKinds,
) -> CollectResult<Vec<MediaItem>> {
    let config = CollectorConfig {
        pause,
        max_stall_count,
        media_kinds,
        ..CollectorConfig::default()
    };
    let mut collector = Collector::new(config)?;
    Ok(collector.collect_all_media(page).await)
}
