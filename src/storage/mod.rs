pub mod artifacts;
pub mod export;
pub mod images;
pub mod seen;

pub use artifacts::{clean_label, safe_title, ArtifactStore};
pub use export::{CsvExporter, Exporter};
pub use images::{HttpImageFetcher, ImageFetcher};
pub use seen::{FileSeenRegistry, InMemorySeenRegistry, SeenRegistry, SeenSet};
