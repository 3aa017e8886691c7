use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format used for the capture time in exported tables.
pub const EXTRACTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One normalized marketplace listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub link: String,
    pub extracted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Local copy of the image, set once it has been downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl ListingRecord {
    pub fn new(id: String, title: String, price: f64, link: String, extracted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            price,
            link,
            extracted_at,
            image_url: None,
            image_path: None,
        }
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    // a record is only usable with an id, a title and a sane price
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.title.trim().is_empty() && self.price.is_finite() && self.price >= 0.0
    }

    /// Field name/value pairs in canonical column order; absent optional
    /// fields are reported as `None` so exporters can compute the column set.
    pub fn fields(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("id", Some(self.id.clone())),
            ("title", Some(self.title.clone())),
            ("price", Some(self.price.to_string())),
            ("link", Some(self.link.clone())),
            ("extracted_at", Some(self.extracted_at.format(EXTRACTED_AT_FORMAT).to_string())),
            ("image_url", self.image_url.clone()),
            ("image_path", self.image_path.clone()),
        ]
    }
}
