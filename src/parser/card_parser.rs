use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::browser::{CardSelectors, RawCard};
use crate::error::HarvestError;

/// html parser for pulling listing cards out of a rendered search page
pub struct CardParser {
    card_selector: Selector,
    title_selector: Selector,
    price_selector: Selector,
    image_selector: Selector,
}

impl CardParser {
    // set up a parser with css selectors ready
    pub fn new(selectors: &CardSelectors) -> Result<Self, HarvestError> {
        Ok(Self {
            card_selector: Self::compile("card", &selectors.card)?,
            title_selector: Self::compile("title", &selectors.title)?,
            price_selector: Self::compile("price", &selectors.price)?,
            image_selector: Self::compile("image", &selectors.image)?,
        })
    }

    fn compile(name: &str, css: &str) -> Result<Selector, HarvestError> {
        Selector::parse(css)
            .map_err(|e| HarvestError::ParseError(format!("Invalid {} selector '{}': {:?}", name, css, e)))
    }

    /// Read every card in document order. Relative links are resolved
    /// against `base_url` when one is known.
    pub fn parse_cards(&self, html: &str, base_url: Option<&Url>) -> Vec<RawCard> {
        let document = Html::parse_document(html);
        let cards: Vec<RawCard> = document
            .select(&self.card_selector)
            .map(|card| self.parse_single_card(&card, base_url))
            .collect();

        debug!("Parsed {} listing cards from HTML", cards.len());
        cards
    }

    fn parse_single_card(&self, element: &ElementRef, base_url: Option<&Url>) -> RawCard {
        let href = element
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| resolve_link(h, base_url));

        let title_attr = element.value().attr("title").and_then(non_blank);

        let title_text = element
            .select(&self.title_selector)
            .next()
            .and_then(|title| non_blank(&title.text().collect::<String>()));

        let price_text = element
            .select(&self.price_selector)
            .next()
            .map(|price| price.text().collect::<String>().trim().to_string());

        let image_src = element
            .select(&self.image_selector)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(non_blank)
            .map(|src| resolve_link(&src, base_url));

        RawCard {
            href,
            title_attr,
            title_text,
            price_text,
            image_src,
        }
    }
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// leave the link untouched when it cannot be resolved, the extractor rejects it
fn resolve_link(href: &str, base_url: Option<&Url>) -> String {
    match base_url {
        Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}
