//! The seam between the engine and a page under test.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PageDriver (async trait)                                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────┐   ┌───────────────────────────┐  │
//! │  │  VirtualPage           │   │  ChromiumDriver           │  │
//! │  │  in-memory DOM,        │   │  (feature = "browser")    │  │
//! │  │  timer-driven handlers │   │  CDP via chromiumoxide    │  │
//! │  └────────────────────────┘   └───────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drivers expose raw capabilities only. Waiting, strictness, and the
//! actionability gate live above this trait so every driver gets the same
//! semantics.

use std::path::Path;

use async_trait::async_trait;

use crate::dom::{Document, ElementRef};
use crate::result::EnsayoResult;

/// Screenshot data with metadata
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Timestamp when screenshot was taken
    pub timestamp: std::time::SystemTime,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: std::time::SystemTime::now(),
        }
    }

    /// Get the size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if screenshot is valid (has data)
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.width > 0 && self.height > 0
    }

    /// Write the PNG to disk, creating parent directories
    pub fn save(&self, path: &Path) -> EnsayoResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

/// Raw page capabilities
///
/// All methods take `&self`; implementations guard their own state. A driver
/// instance belongs to exactly one page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to an absolute URL
    async fn goto(&self, url: &str) -> EnsayoResult<()>;

    /// Fresh, owned copy of the current DOM
    async fn snapshot(&self) -> EnsayoResult<Document>;

    /// Dispatch a pointer activation on the element
    async fn click(&self, target: ElementRef) -> EnsayoResult<()>;

    /// Replace the element's value and fire input events
    async fn fill(&self, target: ElementRef, value: &str) -> EnsayoResult<()>;

    /// Create the overlay container if absent; returns whether it was created
    async fn ensure_overlay(&self, id: &str) -> EnsayoResult<bool>;

    /// Append one line to the overlay container
    async fn append_overlay_line(&self, id: &str, line: &str) -> EnsayoResult<()>;

    /// Capture the viewport
    async fn screenshot(&self) -> EnsayoResult<Screenshot>;

    /// Current URL
    async fn current_url(&self) -> EnsayoResult<String>;

    /// Release the page
    async fn close(&self) -> EnsayoResult<()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod screenshot_tests {
        use super::*;

        #[test]
        fn test_screenshot_validity() {
            assert!(Screenshot::new(vec![1, 2, 3], 10, 10).is_valid());
            assert!(!Screenshot::new(Vec::new(), 10, 10).is_valid());
            assert!(!Screenshot::new(vec![1], 0, 10).is_valid());
            assert_eq!(Screenshot::new(vec![1, 2, 3], 1, 1).size_bytes(), 3);
        }

        #[test]
        fn test_screenshot_save_creates_directories() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested/failure.png");
            Screenshot::new(vec![0x89, b'P', b'N', b'G'], 1, 1)
                .save(&path)
                .unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), vec![0x89, b'P', b'N', b'G']);
        }
    }
}
