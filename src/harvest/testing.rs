//! Scripted stand-ins for the browser and notification channel.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::browser::{CardSelectors, PageNavigator, RawCard};
use crate::config::Config;
use crate::error::{HarvestError, Result};
use crate::notify::{Attachments, Notifier};
use crate::parser::ListingRecord;

/// Config with zero pacing and every output path under `root`.
pub fn test_config(root: &Path, terms: &[&str]) -> Config {
    let mut config = Config::default();
    config.search.terms = terms.iter().map(|t| t.to_string()).collect();
    config.pacing.after_trigger = Duration::ZERO;
    config.pacing.after_scroll = Duration::ZERO;
    config.pacing.after_consent = Duration::ZERO;
    config.pacing.consent_timeout = Duration::ZERO;
    config.output.data_dir = root.to_path_buf();
    config.output.seen_file = root.join("seen_listings.txt");
    config.output.csv_dir = root.join("csv");
    config.output.screenshots_dir = root.join("screenshots");
    config.output.images_dir = root.join("images");
    config.output.save_images = false;
    config
}

pub fn card(id: &str, title: &str, price: &str) -> RawCard {
    RawCard {
        href: Some(format!("https://es.wallapop.com/item/{}", id)),
        title_attr: Some(title.to_string()),
        title_text: None,
        price_text: Some(price.to_string()),
        image_src: Some(format!("https://cdn.example.com/{}.jpg", id)),
    }
}

/// Page whose behavior is fixed up front. Every call is logged.
///
/// Without scripted counts, `count_cards` reports the number of cards
/// scripted for the current search term.
#[derive(Default)]
pub struct ScriptedNavigator {
    counts: Mutex<VecDeque<usize>>,
    primary_trigger: bool,
    failing_triggers: bool,
    fallback_texts: Vec<Option<String>>,
    consent_banner: bool,
    cards_by_term: HashMap<String, Vec<RawCard>>,
    failing_terms: HashSet<String>,
    current_term: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(self, counts: Vec<usize>) -> Self {
        *self.counts.lock().unwrap() = counts.into();
        self
    }

    pub fn with_primary_trigger(mut self) -> Self {
        self.primary_trigger = true;
        self
    }

    pub fn with_failing_triggers(mut self) -> Self {
        self.failing_triggers = true;
        self
    }

    pub fn with_fallback_texts(mut self, texts: Vec<Option<String>>) -> Self {
        self.fallback_texts = texts;
        self
    }

    pub fn with_consent_banner(mut self) -> Self {
        self.consent_banner = true;
        self
    }

    pub fn with_cards(mut self, term: &str, cards: Vec<RawCard>) -> Self {
        self.cards_by_term.insert(term.to_string(), cards);
        self
    }

    /// Navigation to this term's search page times out.
    pub fn failing_for(mut self, term: &str) -> Self {
        self.failing_terms.insert(term.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn current_cards(&self) -> Vec<RawCard> {
        let term = self.current_term.lock().unwrap().clone();
        term.and_then(|t| self.cards_by_term.get(&t).cloned()).unwrap_or_default()
    }
}

#[async_trait]
impl PageNavigator for ScriptedNavigator {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate:{}", url));
        let parsed = Url::parse(url)?;
        let term = parsed
            .query_pairs()
            .find(|(key, _)| key == "keywords")
            .map(|(_, value)| value.into_owned());

        if let Some(term) = &term {
            if self.failing_terms.contains(term) {
                return Err(HarvestError::Timeout(format!("navigation to {} exceeded 30s", url)).into());
            }
        }
        *self.current_term.lock().unwrap() = term;
        Ok(())
    }

    async fn cards(&self, selectors: &CardSelectors) -> Result<Vec<RawCard>> {
        self.record(format!("cards:{}", selectors.card));
        Ok(self.current_cards())
    }

    async fn count_cards(&self, card_selector: &str) -> Result<usize> {
        self.record(format!("count:{}", card_selector));
        let scripted = {
            let mut counts = self.counts.lock().unwrap();
            if counts.len() > 1 {
                counts.pop_front()
            } else {
                counts.front().copied()
            }
        };
        Ok(scripted.unwrap_or_else(|| self.current_cards().len()))
    }

    async fn trigger_control(&self, selector: &str) -> Result<bool> {
        self.record(format!("trigger:{}", selector));
        if self.failing_triggers {
            return Err(HarvestError::BrowserError("element detached".to_string()).into());
        }
        Ok(self.primary_trigger)
    }

    async fn control_texts(&self, selector: &str) -> Result<Vec<Option<String>>> {
        self.record(format!("texts:{}", selector));
        if self.failing_triggers {
            return Err(HarvestError::BrowserError("element detached".to_string()).into());
        }
        Ok(self.fallback_texts.clone())
    }

    async fn trigger_control_at(&self, selector: &str, index: usize) -> Result<bool> {
        self.record(format!("trigger_at:{}:{}", selector, index));
        Ok(index < self.fallback_texts.len())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.record("scroll".to_string());
        Ok(())
    }

    async fn capture(&self) -> Result<Vec<u8>> {
        self.record("capture".to_string());
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn dismiss_consent(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        self.record(format!("consent:{}", selector));
        Ok(self.consent_banner)
    }

    async fn close(&self) -> Result<()> {
        self.record("close".to_string());
        Ok(())
    }
}

/// Notifier that keeps every batch it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<String>, Attachments)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of each delivered batch, with its attachments.
    pub fn sent(&self) -> Vec<(Vec<String>, Attachments)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, records: &[ListingRecord], attachments: &Attachments) -> Result<()> {
        let ids = records.iter().map(|r| r.id.clone()).collect();
        self.sent.lock().unwrap().push((ids, attachments.clone()));
        Ok(())
    }
}
