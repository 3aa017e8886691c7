use async_trait::async_trait;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{Result, HarvestError};
use crate::parser::ListingRecord;
use crate::storage::artifacts::clean_label;

/// Writes a batch of records to a tabular artifact and returns its path.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn write_table(&self, records: &[ListingRecord], label: &str) -> Result<PathBuf>;
}

/// CSV table whose columns are the fields present in at least one record.
pub struct CsvExporter {
    output_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn escape_csv_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    /// Union of populated fields across `records`, in canonical field order.
    pub fn columns(records: &[ListingRecord]) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = Vec::new();
        for record in records {
            for (name, value) in record.fields() {
                if value.is_some() && !columns.contains(&name) {
                    columns.push(name);
                }
            }
        }

        // keep canonical order regardless of which record introduced a column
        let canonical: Vec<&'static str> = match records.first() {
            Some(record) => record.fields().into_iter().map(|(name, _)| name).collect(),
            None => Vec::new(),
        };
        canonical.into_iter().filter(|name| columns.contains(name)).collect()
    }

    // numeric column: anything that is not a finite number becomes empty
    fn coerce_price(value: &str) -> String {
        match value.trim().parse::<f64>() {
            Ok(price) if price.is_finite() => price.to_string(),
            _ => String::new(),
        }
    }

    pub fn format_table(records: &[ListingRecord]) -> String {
        let columns = Self::columns(records);
        let mut output = String::new();
        output.push_str(&columns.join(","));
        output.push('\n');

        for record in records {
            let fields = record.fields();
            let row: Vec<String> = columns
                .iter()
                .map(|column| {
                    let value = fields
                        .iter()
                        .find(|(name, _)| name == column)
                        .and_then(|(_, value)| value.clone())
                        .unwrap_or_default();
                    if *column == "price" {
                        Self::coerce_price(&value)
                    } else {
                        Self::escape_csv_field(&value)
                    }
                })
                .collect();
            output.push_str(&row.join(","));
            output.push('\n');
        }

        output
    }
}

#[async_trait]
impl Exporter for CsvExporter {
    async fn write_table(&self, records: &[ListingRecord], label: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| HarvestError::ExportError(format!("Failed to create directory: {}", e)))?;

        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let path = self
            .output_dir
            .join(format!("results_{}_{}.csv", clean_label(label), timestamp));

        debug!("Writing {} records to {:?}", records.len(), path);
        fs::write(&path, Self::format_table(records))
            .map_err(|e| HarvestError::ExportError(format!("Failed to write table: {}", e)))?;

        info!("Results saved to {:?}", path);
        Ok(path)
    }
}
