pub mod webhook;

use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::parser::ListingRecord;

pub use webhook::WebhookNotifier;

/// Files sent along with a notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    pub table: Option<PathBuf>,
    pub capture: Option<PathBuf>,
}

impl Attachments {
    /// Attachment paths that exist on disk.
    pub fn existing(&self) -> Vec<&Path> {
        [self.table.as_deref(), self.capture.as_deref()]
            .into_iter()
            .flatten()
            .filter(|path| path.exists())
            .collect()
    }
}

/// Composed alert, independent of the delivery channel.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub subject: String,
    pub lines: Vec<String>,
    pub attachments: Vec<PathBuf>,
}

impl NotificationMessage {
    pub fn compose(sender: &str, records: &[ListingRecord], attachments: &Attachments) -> Self {
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        let subject = format!(
            "{}: {} - {} new listing(s) for '{}'",
            sender,
            Local::now().format("%Y-%m-%d %H:%M"),
            records.len(),
            titles.join(", ")
        );

        let lines = records
            .iter()
            .map(|r| format!("{} - {}€ - {}", r.title, r.price, r.link))
            .collect();

        Self {
            subject,
            lines,
            attachments: attachments.existing().into_iter().map(Path::to_path_buf).collect(),
        }
    }

    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

/// Delivers a batch of new listings. An empty batch is a logged no-op.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, records: &[ListingRecord], attachments: &Attachments) -> Result<()>;
}

/// Writes the composed message to the log instead of delivering it.
pub struct LogNotifier {
    sender: String,
}

impl LogNotifier {
    pub fn new(sender: String) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, records: &[ListingRecord], attachments: &Attachments) -> Result<()> {
        if records.is_empty() {
            info!("No new listings found. No notification will be sent.");
            return Ok(());
        }

        let message = NotificationMessage::compose(&self.sender, records, attachments);
        info!("{}\n{}", message.subject, message.body());
        for attachment in &message.attachments {
            info!("  attachment: {:?}", attachment);
        }
        Ok(())
    }
}
