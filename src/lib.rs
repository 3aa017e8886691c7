pub mod browser;
pub mod config;
pub mod error;
pub mod harvest;
pub mod notify;
pub mod parser;
pub mod storage;

pub use error::{Result, HarvestError};
pub use config::Config;
pub use browser::ChromiumNavigator;
pub use harvest::{RunSummary, SearchOrchestrator};
