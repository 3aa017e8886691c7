use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::browser::RawCard;
use crate::error::HarvestError;
use crate::parser::listing::ListingRecord;
use crate::parser::price::normalize_price;
use crate::storage::SeenSet;

/// Per-pass counters, mostly for the session log line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionStats {
    pub examined: usize,
    pub accepted: usize,
    pub already_seen: usize,
    pub missing_link: usize,
    pub missing_title: usize,
    pub bad_price: usize,
    pub failed: usize,
}

/// Turns rendered cards into new, normalized listing records
pub struct ListingExtractor {
    stats: ExtractionStats,
}

impl ListingExtractor {
    pub fn new() -> Self {
        Self {
            stats: ExtractionStats::default(),
        }
    }

    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    /// Extract records for cards whose id is not in `seen`, looking at no
    /// more than `limit` cards in rendered order.
    pub fn extract(
        &mut self,
        cards: &[RawCard],
        seen: &SeenSet,
        limit: usize,
        want_images: bool,
    ) -> Vec<ListingRecord> {
        self.extract_at(cards, seen, limit, want_images, Utc::now())
    }

    /// Same as [`extract`](Self::extract) with an explicit capture time.
    pub fn extract_at(
        &mut self,
        cards: &[RawCard],
        seen: &SeenSet,
        limit: usize,
        want_images: bool,
        extracted_at: DateTime<Utc>,
    ) -> Vec<ListingRecord> {
        self.stats = ExtractionStats::default();
        let mut records = Vec::new();
        let mut accepted_ids = HashSet::new();

        for (index, card) in cards.iter().take(limit).enumerate() {
            self.stats.examined += 1;
            match self.extract_card(card, seen, &accepted_ids, want_images, extracted_at) {
                Ok(Some(record)) => {
                    accepted_ids.insert(record.id.clone());
                    info!("NEW LISTING: {} - {}€", record.title, record.price);
                    self.stats.accepted += 1;
                    records.push(record);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Error processing listing card #{}: {}", index, e);
                    self.stats.failed += 1;
                }
            }
        }

        debug!("Extraction pass finished: {:?}", self.stats);
        records
    }

    // handle one card; Ok(None) is a skip, Err is a malformed card
    fn extract_card(
        &mut self,
        card: &RawCard,
        seen: &SeenSet,
        accepted_ids: &HashSet<String>,
        want_images: bool,
        extracted_at: DateTime<Utc>,
    ) -> Result<Option<ListingRecord>, HarvestError> {
        let link = match card.href.as_deref() {
            Some(link) => link,
            None => {
                debug!("Card without link, skipping");
                self.stats.missing_link += 1;
                return Ok(None);
            }
        };

        let id = listing_id(link)?;
        if seen.contains(&id) {
            self.stats.already_seen += 1;
            return Ok(None);
        }
        // re-rendered card earlier in this pass
        if accepted_ids.contains(&id) {
            debug!("Listing {} rendered twice, keeping the first", id);
            self.stats.already_seen += 1;
            return Ok(None);
        }

        let title = match non_blank(card.title_attr.as_deref()).or_else(|| non_blank(card.title_text.as_deref())) {
            Some(title) => title,
            None => {
                warn!("Listing {} has no title, skipping", id);
                self.stats.missing_title += 1;
                return Ok(None);
            }
        };

        let price_text = card
            .price_text
            .as_deref()
            .ok_or_else(|| HarvestError::ParseError(format!("price element missing for listing {}", id)))?;

        let price = match normalize_price(price_text) {
            Some(price) => price,
            None => {
                debug!("Unparsable price '{}' for listing {}, skipping", price_text, id);
                self.stats.bad_price += 1;
                return Ok(None);
            }
        };

        let mut record = ListingRecord::new(id, title, price, link.to_string(), extracted_at);

        if want_images {
            match card.image_src.clone() {
                Some(src) => record = record.with_image_url(Some(src)),
                None => warn!("Image not found for listing: {}", record.title),
            }
        }

        if !record.is_valid() {
            return Err(HarvestError::ParseError(format!("listing {} failed validation", record.id)));
        }

        Ok(Some(record))
    }
}

impl Default for ListingExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Stable listing id: the trailing path segment of its absolute link.
pub fn listing_id(link: &str) -> Result<String, HarvestError> {
    let url = Url::parse(link)?;
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .ok_or_else(|| HarvestError::ParseError(format!("no id segment in link '{}'", link)))
}
