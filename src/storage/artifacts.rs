use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, HarvestError};

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid label pattern"));

/// Replace each run of non-alphanumeric characters with a single `_`.
pub fn clean_label(label: &str) -> String {
    NON_ALPHANUMERIC.replace_all(label, "_").into_owned()
}

/// Title reduced to alphanumerics, spaces and underscores, at most 30 chars.
pub fn safe_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect();
    kept.trim_end().chars().take(30).collect()
}

/// Where screenshots and downloaded images end up.
pub struct ArtifactStore {
    screenshots_dir: PathBuf,
    images_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(screenshots_dir: PathBuf, images_dir: PathBuf) -> Self {
        Self {
            screenshots_dir,
            images_dir,
        }
    }

    pub fn save_capture(&self, label: &str, png: &[u8]) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let path = self
            .screenshots_dir
            .join(format!("search_{}_{}_screenshot.png", clean_label(label), timestamp));
        Self::write(&path, png)?;
        info!("Screenshot saved to {:?}", path);
        Ok(path)
    }

    pub fn save_diagnostic(&self, label: &str, png: &[u8]) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let path = self
            .screenshots_dir
            .join(format!("error_{}_{}.png", clean_label(label), timestamp));
        Self::write(&path, png)?;
        info!("Diagnostic screenshot saved to {:?}", path);
        Ok(path)
    }

    pub fn save_image(&self, id: &str, title: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self
            .images_dir
            .join(format!("{}_{}.jpg", id, safe_title(title)));
        Self::write(&path, bytes)?;
        Ok(path)
    }

    fn write(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| HarvestError::StorageError(format!("Failed to create directory: {}", e)))?;
        }
        fs::write(path, bytes)
            .map_err(|e| HarvestError::StorageError(format!("Failed to write {:?}: {}", path, e)))?;
        Ok(())
    }
}
