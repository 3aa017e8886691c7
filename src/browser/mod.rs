pub mod manager;
pub mod navigator;
pub mod stealth;


pub use manager::ChromiumNavigator;
pub use navigator::{CardSelectors, PageNavigator, RawCard};
pub use stealth::{choose_user_agent, UserAgentGenerator};
