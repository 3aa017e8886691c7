pub mod card_parser;
pub mod extractor;
pub mod listing;
pub mod price;

pub use card_parser::CardParser;
pub use extractor::{listing_id, ExtractionStats, ListingExtractor};
pub use listing::ListingRecord;
pub use price::normalize_price;
