use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::PageNavigator;
use crate::config::Config;
use crate::error::Result;

/// Pagination knobs, taken from the selector and pacing config.
#[derive(Debug, Clone)]
pub struct GrowthSettings {
    pub card_selector: String,
    pub primary_trigger: String,
    pub fallback_trigger: String,
    pub trigger_labels: Vec<String>,
    pub settle_after_trigger: Duration,
    pub settle_after_scroll: Duration,
    /// Consecutive no-growth iterations before the feed counts as exhausted.
    pub stall_threshold: u32,
    pub max_iterations: u32,
}

impl GrowthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            card_selector: config.selectors.card.clone(),
            primary_trigger: config.selectors.load_more_primary.clone(),
            fallback_trigger: config.selectors.load_more_fallback.clone(),
            trigger_labels: config.selectors.load_more_labels.clone(),
            settle_after_trigger: config.pacing.after_trigger,
            settle_after_scroll: config.pacing.after_scroll,
            stall_threshold: config.pacing.stall_threshold,
            max_iterations: config.pacing.max_iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// The feed stopped growing; it holds fewer items than requested.
    Exhausted,
    IterationCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthOutcome {
    pub rendered: usize,
    pub iterations: u32,
    pub reason: StopReason,
}

/// Wait for asynchronous content. Zero durations return immediately.
pub async fn settle(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Keeps the search page stocked with rendered cards, combining the
/// "load more" control with infinite scroll on every iteration.
pub struct ResultGrowthController<'a> {
    navigator: &'a dyn PageNavigator,
    settings: &'a GrowthSettings,
}

impl<'a> ResultGrowthController<'a> {
    pub fn new(navigator: &'a dyn PageNavigator, settings: &'a GrowthSettings) -> Self {
        Self { navigator, settings }
    }

    pub async fn expand(&self, target_count: usize) -> Result<GrowthOutcome> {
        let mut last_count = 0;
        let mut stalled = 0;
        let mut iterations = 0;

        loop {
            iterations += 1;

            if self.trigger_load_more().await {
                settle(self.settings.settle_after_trigger).await;
            }

            self.navigator.scroll_to_bottom().await?;
            settle(self.settings.settle_after_scroll).await;

            let current = self.navigator.count_cards(&self.settings.card_selector).await?;
            debug!("Iteration {}: {} listing cards rendered", iterations, current);

            if current >= target_count {
                info!("Reached {} results (>= {})", current, target_count);
                return Ok(GrowthOutcome { rendered: current, iterations, reason: StopReason::TargetReached });
            }

            if current == last_count {
                stalled += 1;
                if stalled >= self.settings.stall_threshold {
                    info!("No more results after scrolling, {} cards rendered", current);
                    return Ok(GrowthOutcome { rendered: current, iterations, reason: StopReason::Exhausted });
                }
            } else {
                stalled = 0;
            }
            last_count = current;

            if iterations >= self.settings.max_iterations {
                warn!("Stopped paginating after {} iterations with {} cards", iterations, current);
                return Ok(GrowthOutcome { rendered: current, iterations, reason: StopReason::IterationCap });
            }
        }
    }

    /// Fire the primary control, else the first fallback control whose text
    /// contains a known label. Not finding one is normal.
    async fn trigger_load_more(&self) -> bool {
        match self.navigator.trigger_control(&self.settings.primary_trigger).await {
            Ok(true) => {
                debug!("Clicked the 'load more' control by id");
                return true;
            }
            Ok(false) => {}
            Err(e) => warn!("Primary 'load more' control failed: {}", e),
        }

        let texts = match self.navigator.control_texts(&self.settings.fallback_trigger).await {
            Ok(texts) => texts,
            Err(e) => {
                warn!("Could not scan fallback 'load more' controls: {}", e);
                return false;
            }
        };

        let matched = texts.iter().position(|text| {
            text.as_deref()
                .map_or(false, |t| self.settings.trigger_labels.iter().any(|label| t.contains(label.as_str())))
        });

        let Some(index) = matched else {
            return false;
        };

        match self.navigator.trigger_control_at(&self.settings.fallback_trigger, index).await {
            Ok(clicked) => {
                if clicked {
                    debug!("Clicked fallback 'load more' control: {:?}", texts[index]);
                }
                clicked
            }
            Err(e) => {
                warn!("Fallback 'load more' control failed: {}", e);
                false
            }
        }
    }
}
