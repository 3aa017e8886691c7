use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SelectorConfig;
use crate::error::Result;

/// Snapshot of one rendered listing card, read straight off the page.
///
/// Every field is optional: the page decides what is present and the
/// extractor decides what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCard {
    /// Absolute link to the detail page.
    pub href: Option<String>,
    /// `title` attribute of the card element.
    pub title_attr: Option<String>,
    /// Inner text of the title sub-element.
    pub title_text: Option<String>,
    /// Displayed price text, currency included.
    pub price_text: Option<String>,
    pub image_src: Option<String>,
}

/// Selectors used to read listing cards.
#[derive(Debug, Clone, PartialEq)]
pub struct CardSelectors {
    pub card: String,
    pub title: String,
    pub price: String,
    pub image: String,
}

impl From<&SelectorConfig> for CardSelectors {
    fn from(config: &SelectorConfig) -> Self {
        Self {
            card: config.card.clone(),
            title: config.title.clone(),
            price: config.price.clone(),
            image: config.image.clone(),
        }
    }
}

/// The single rendering surface a run drives.
///
/// Implementations hide whatever traversal a control needs (shadow roots,
/// nested frames); callers only deal in selectors.
#[async_trait]
pub trait PageNavigator: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn cards(&self, selectors: &CardSelectors) -> Result<Vec<RawCard>>;

    async fn count_cards(&self, card_selector: &str) -> Result<usize>;

    /// Activate the first control matching `selector`. `Ok(false)` when absent.
    async fn trigger_control(&self, selector: &str) -> Result<bool>;

    /// Accessible text of every control matching `selector`, in document order.
    async fn control_texts(&self, selector: &str) -> Result<Vec<Option<String>>>;

    /// Activate the `index`-th control matching `selector`.
    async fn trigger_control_at(&self, selector: &str, index: usize) -> Result<bool>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    /// PNG screenshot of the current page.
    async fn capture(&self) -> Result<Vec<u8>>;

    /// Wait up to `timeout` for the consent banner and dismiss it.
    /// `Ok(false)` means no banner showed up.
    async fn dismiss_consent(&self, selector: &str, timeout: Duration) -> Result<bool>;

    async fn close(&self) -> Result<()>;
}
