use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

use crate::config::{Coordinates, SearchConfig};
use crate::error::{HarvestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    NotStarted,
    Navigated,
    CookiesResolved,
    Expanded,
    Extracted,
    Exported,
    Notified,
    Done,
    Failed,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::NotStarted => 0,
            SessionState::Navigated => 1,
            SessionState::CookiesResolved => 2,
            SessionState::Expanded => 3,
            SessionState::Extracted => 4,
            SessionState::Exported => 5,
            SessionState::Notified => 6,
            SessionState::Done => 7,
            SessionState::Failed => 8,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One search term processed end to end.
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub term: String,
    pub min_price: f64,
    pub max_price: f64,
    pub coordinates: Option<Coordinates>,
    pub radius_km: u32,
    pub max_results: usize,
    base_url: String,
    order_by: String,
    state: SessionState,
    failure: Option<String>,
}

impl SearchSession {
    pub fn new(term: &str, search: &SearchConfig) -> Self {
        Self {
            term: term.to_string(),
            min_price: search.min_price,
            max_price: search.max_price,
            coordinates: search.resolve_location(),
            radius_km: search.radius_km,
            max_results: search.max_results,
            base_url: search.base_url.clone(),
            order_by: search.order_by.clone(),
            state: SessionState::NotStarted,
            failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Move forward to `next`. Steps may be skipped, never revisited, and
    /// nothing leaves a terminal state.
    pub fn advance(&mut self, next: SessionState) {
        if self.state.is_terminal() {
            warn!("Session '{}' is already {}, ignoring {}", self.term, self.state, next);
            return;
        }
        if next == SessionState::Failed || next.rank() <= self.state.rank() {
            warn!("Session '{}' cannot move from {} to {}", self.term, self.state, next);
            return;
        }
        debug!("Session '{}': {} -> {}", self.term, self.state, next);
        self.state = next;
    }

    pub fn fail(&mut self, reason: String) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Failed;
        self.failure = Some(reason);
    }

    /// Search URL with keywords, price window, optional distance filter
    /// and ordering. Distance is sent in meters.
    pub fn search_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| HarvestError::ConfigError(format!("Invalid base URL '{}': {}", self.base_url, e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("keywords", &self.term)
                .append_pair("min_sale_price", &self.min_price.to_string())
                .append_pair("max_sale_price", &self.max_price.to_string());

            if let Some(coords) = self.coordinates {
                query
                    .append_pair("latitude", &coords.latitude.to_string())
                    .append_pair("longitude", &coords.longitude.to_string())
                    .append_pair("distance", &(u64::from(self.radius_km) * 1000).to_string());
            }

            query.append_pair("order_by", &self.order_by);
        }

        Ok(url.to_string())
    }
}
