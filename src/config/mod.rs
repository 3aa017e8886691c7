use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, HarvestError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub search: SearchConfig,
    pub browser: BrowserConfig,
    pub selectors: SelectorConfig,
    pub pacing: PacingConfig,
    pub output: OutputConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub terms: Vec<String>,
    /// Single-term form kept for older config files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    pub min_price: f64,
    pub max_price: f64,
    pub location: Option<String>,
    pub radius_km: u32,
    pub max_results: usize,
    pub base_url: String,
    pub order_by: String,
    pub locations: BTreeMap<String, Coordinates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub randomize_user_agent: bool,
    pub window_width: u32,
    pub window_height: u32,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    pub launch_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectorConfig {
    pub card: String,
    pub title: String,
    pub price: String,
    pub image: String,
    pub load_more_primary: String,
    pub load_more_fallback: String,
    pub load_more_labels: Vec<String>,
    pub consent_button: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PacingConfig {
    #[serde(with = "humantime_serde")]
    pub after_trigger: Duration,
    #[serde(with = "humantime_serde")]
    pub after_scroll: Duration,
    #[serde(with = "humantime_serde")]
    pub after_consent: Duration,
    #[serde(with = "humantime_serde")]
    pub consent_timeout: Duration,
    pub stall_threshold: u32,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    pub seen_file: PathBuf,
    pub csv_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    pub images_dir: PathBuf,
    pub save_images: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub sender_name: String,
}

impl SearchConfig {
    /// Configured terms, falling back to the single `term` entry.
    pub fn effective_terms(&self) -> Vec<String> {
        if !self.terms.is_empty() {
            return self.terms.clone();
        }
        self.term.iter().cloned().collect()
    }

    pub fn resolve_location(&self) -> Option<Coordinates> {
        let name = self.location.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        let coords = self.locations.get(&name.to_lowercase()).copied();
        if coords.is_none() {
            warn!("Unknown location '{}', searching without a distance filter", name);
        }
        coords
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut locations = BTreeMap::new();
        locations.insert("madrid".to_string(), Coordinates { latitude: 40.4168, longitude: -3.7038 });
        locations.insert("barcelona".to_string(), Coordinates { latitude: 41.3851, longitude: 2.1734 });

        Self {
            search: SearchConfig {
                terms: vec!["mountain bike".to_string()],
                term: None,
                min_price: 200.0,
                max_price: 750.0,
                location: Some("madrid".to_string()),
                radius_km: 50,
                max_results: 40,
                base_url: "https://es.wallapop.com/app/search".to_string(),
                order_by: "newest".to_string(),
                locations,
            },
            browser: BrowserConfig {
                headless: true,
                user_agent: Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string()),
                randomize_user_agent: false,
                window_width: 1920,
                window_height: 1080,
                navigation_timeout: Duration::from_secs(30),
                launch_attempts: 3,
            },
            selectors: SelectorConfig {
                card: "a.ItemCardList__item".to_string(),
                title: ".ItemCard__title".to_string(),
                price: ".ItemCard__price".to_string(),
                image: "img".to_string(),
                load_more_primary: "#btn-load-more".to_string(),
                load_more_fallback: "walla-button".to_string(),
                load_more_labels: vec![
                    "Cargar más".to_string(),
                    "Ver más productos".to_string(),
                    "Ver más".to_string(),
                    "Ver más resultados".to_string(),
                ],
                consent_button: "#onetrust-accept-btn-handler".to_string(),
            },
            pacing: PacingConfig {
                after_trigger: Duration::from_secs(2),
                after_scroll: Duration::from_secs(2),
                after_consent: Duration::from_secs(2),
                consent_timeout: Duration::from_secs(10),
                stall_threshold: 2,
                max_iterations: 50,
            },
            output: OutputConfig {
                data_dir: PathBuf::from("./data"),
                seen_file: PathBuf::from("./data/seen_listings.txt"),
                csv_dir: PathBuf::from("./data/csv"),
                screenshots_dir: PathBuf::from("./data/screenshots"),
                images_dir: PathBuf::from("./data/images"),
                save_images: true,
            },
            notify: NotifyConfig {
                enabled: true,
                webhook_url: None,
                sender_name: "Listing Harvester".to_string(),
            },
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        // check if config file exists, create default if not
        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| HarvestError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| HarvestError::ConfigError(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        // checking search terms
        let terms = config.search.effective_terms();
        if terms.is_empty() {
            return Err(HarvestError::ConfigError("At least one search term is required".to_string()).into());
        }
        for term in &terms {
            if term.trim().is_empty() {
                return Err(HarvestError::ConfigError("Search term cannot be empty".to_string()).into());
            }
        }

        // checking price bounds
        let search = &config.search;
        if !search.min_price.is_finite() || !search.max_price.is_finite() {
            return Err(HarvestError::ConfigError("Price bounds must be finite numbers".to_string()).into());
        }
        if search.min_price < 0.0 || search.max_price < 0.0 {
            return Err(HarvestError::ConfigError("Price bounds cannot be negative".to_string()).into());
        }
        if search.min_price > search.max_price {
            return Err(HarvestError::ConfigError(format!(
                "min_price ({}) cannot exceed max_price ({})",
                search.min_price, search.max_price
            )).into());
        }
        if search.max_results == 0 {
            return Err(HarvestError::ConfigError("max_results must be greater than 0".to_string()).into());
        }
        url::Url::parse(&search.base_url)
            .map_err(|e| HarvestError::ConfigError(format!("Invalid base_url '{}': {}", search.base_url, e)))?;

        // checking selectors
        let selectors = &config.selectors;
        let required = [
            ("card", &selectors.card),
            ("title", &selectors.title),
            ("price", &selectors.price),
            ("image", &selectors.image),
            ("load_more_primary", &selectors.load_more_primary),
            ("load_more_fallback", &selectors.load_more_fallback),
            ("consent_button", &selectors.consent_button),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(HarvestError::ConfigError(format!("Selector '{}' cannot be empty", name)).into());
            }
        }
        if selectors.load_more_labels.is_empty() {
            return Err(HarvestError::ConfigError("load_more_labels needs at least one label".to_string()).into());
        }
        // a blank label would match every fallback control
        if selectors.load_more_labels.iter().any(|l| l.trim().is_empty()) {
            return Err(HarvestError::ConfigError("load_more_labels cannot contain blank labels".to_string()).into());
        }

        // checking pacing
        if config.pacing.stall_threshold == 0 {
            return Err(HarvestError::ConfigError("stall_threshold must be greater than 0".to_string()).into());
        }
        if config.pacing.max_iterations == 0 {
            return Err(HarvestError::ConfigError("max_iterations must be greater than 0".to_string()).into());
        }
        if config.browser.launch_attempts == 0 {
            return Err(HarvestError::ConfigError("launch_attempts must be greater than 0".to_string()).into());
        }

        if let Some(ref webhook_url) = config.notify.webhook_url {
            if !webhook_url.starts_with("http://") && !webhook_url.starts_with("https://") {
                return Err(HarvestError::ConfigError("webhook_url must start with http:// or https://".to_string()).into());
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| HarvestError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| HarvestError::ConfigError(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    /// Create a default configuration file
    async fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config)
            .map_err(|e| HarvestError::ConfigError(format!("Failed to serialize default config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| HarvestError::ConfigError(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| HarvestError::ConfigError(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}, edit it to change the searches", self.config_path);
        Ok(())
    }
}
