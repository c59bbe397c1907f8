use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::artifact::Blob;

/// In-memory table of revocable `blob:` access URLs.
///
/// Each URL keeps its blob alive until revoked. Cloned blobs share their
/// bytes, so minting does not copy data.
#[derive(Debug)]
pub struct ObjectUrlRegistry {
    origin: String,
    entries: Mutex<HashMap<String, Blob>>,
}

impl ObjectUrlRegistry {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a fresh URL for `blob`.
    pub fn create(&self, blob: &Blob) -> String {
        let url = format!("blob:{}/{}", self.origin, Uuid::new_v4());
        self.entries.lock().insert(url.clone(), blob.clone());
        log::debug!("minted {} ({} bytes, {})", url, blob.len(), blob.mime_type());
        url
    }

    /// Revoke `url`. Returns false if it was not live.
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.entries.lock().remove(url).is_some();
        if removed {
            log::debug!("revoked {}", url);
        }
        removed
    }

    pub fn resolve(&self, url: &str) -> Option<Blob> {
        self.entries.lock().get(url).cloned()
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.entries.lock().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Revoke every URL. Returns how many were live.
    pub fn revoke_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}

impl Default for ObjectUrlRegistry {
    fn default() -> Self {
        Self::new("media-capture")
    }
}
