use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Result, HarvestError};
use crate::notify::{Attachments, NotificationMessage, Notifier};
use crate::parser::ListingRecord;

// discord caps
const MAX_CONTENT_CHARS: usize = 2000;
const MAX_EMBEDS: usize = 10;
const MAX_ATTEMPTS: u32 = 3;

/// Discord-compatible webhook delivery with file attachments.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    sender: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, sender: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HarvestError::NotifyError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            webhook_url,
            sender,
        })
    }

    fn create_payload(&self, message: &NotificationMessage, records: &[ListingRecord]) -> Value {
        let content: String = message.subject.chars().take(MAX_CONTENT_CHARS).collect();

        let embeds: Vec<Value> = records
            .iter()
            .take(MAX_EMBEDS)
            .map(|record| {
                json!({
                    "title": record.title,
                    "url": record.link,
                    "color": 0x13C1AC,
                    "fields": [
                        {
                            "name": "Price",
                            "value": format!("**{}€**", record.price),
                            "inline": true
                        }
                    ],
                    "timestamp": record.extracted_at.to_rfc3339(),
                })
            })
            .collect();

        json!({
            "username": self.sender,
            "content": content,
            "embeds": embeds,
        })
    }

    fn read_attachments(paths: &[PathBuf]) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "attachment".to_string());
            match std::fs::read(path) {
                Ok(bytes) => files.push((name, bytes)),
                Err(e) => warn!("Could not read attachment {:?}: {}", path, e),
            }
        }
        files
    }

    fn build_form(payload: &Value, files: &[(String, Vec<u8>)]) -> Form {
        let mut form = Form::new().text("payload_json", payload.to_string());
        for (index, (name, bytes)) in files.iter().enumerate() {
            let part = Part::bytes(bytes.clone()).file_name(name.clone());
            form = form.part(format!("files[{}]", index), part);
        }
        form
    }

    async fn send_webhook(&self, payload: Value, files: Vec<(String, Vec<u8>)>) -> Result<()> {
        for attempt in 1..=MAX_ATTEMPTS {
            // multipart forms are single-use, rebuild per attempt
            let form = Self::build_form(&payload, &files);

            let response = self
                .client
                .post(&self.webhook_url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| HarvestError::NotifyError(format!("Failed to send webhook: {}", e)))?;

            if response.status().is_success() {
                debug!("Webhook delivered on attempt {}", attempt);
                return Ok(());
            }

            if response.status().as_u16() == 429 && attempt < MAX_ATTEMPTS {
                warn!("Webhook rate limited, waiting before retry {}", attempt + 1);
                sleep(Duration::from_secs(2)).await;
                continue;
            }

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HarvestError::NotifyError(format!(
                "Webhook failed with status {}: {}",
                status, body
            )).into());
        }

        Err(HarvestError::NotifyError("Webhook still rate limited after retries".to_string()).into())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, records: &[ListingRecord], attachments: &Attachments) -> Result<()> {
        if records.is_empty() {
            info!("No new listings found. No notification will be sent.");
            return Ok(());
        }

        let message = NotificationMessage::compose(&self.sender, records, attachments);
        let payload = self.create_payload(&message, records);
        let files = Self::read_attachments(&message.attachments);

        info!("Sending webhook notification for {} listing(s)", records.len());
        self.send_webhook(payload, files).await?;
        info!("Alert notification sent successfully");
        Ok(())
    }
}
