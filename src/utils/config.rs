use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Bounding box for the thumbnail generated for every ingested image.
pub const DEFAULT_THUMB_SIZE: (u32, u32) = (150, 150);

/// Bounding box used when the caller asks to submit a resized copy
/// instead of the original file.
pub const RESIZE_SIZE: (u32, u32) = (200, 200);

/// Timeout applied to every network call. No retries.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(10);

/// Hosts that either expose no tag metadata or actively block the tag
/// fetch flow. Matches on these hosts are served without tags.
pub const NO_TAGS_HOSTS: &[&str] = &["anime-pictures.net", "www.theanimegallery.com"];

/// Paths used across one run: one database file plus a folder of derived
/// thumbnails named by content hash and size.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub thumb_folder: PathBuf,
}

impl AppConfig {
    /// Resolve paths, falling back to the platform data directory
    /// (`~/.local/share/iqdb-tagger` on Linux) when not overridden.
    pub fn resolve(db_path: Option<PathBuf>, thumb_folder: Option<PathBuf>) -> Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine user data directory"))?
            .join("iqdb-tagger");
        Ok(Self {
            db_path: db_path.unwrap_or_else(|| data_dir.join("iqdb.db")),
            thumb_folder: thumb_folder.unwrap_or_else(|| data_dir.join("thumbs")),
        })
    }
}
