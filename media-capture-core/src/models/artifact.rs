use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Kind of captured media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Video,
    Audio,
    Image,
}

/// Immutable binary payload with its MIME type. Cloning shares the bytes.
#[derive(Clone)]
pub struct Blob {
    data: Arc<[u8]>,
    mime_type: String,
}

impl Blob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Concatenate recorder chunks in delivery order.
    pub fn concat(chunks: &[Vec<u8>], mime_type: impl Into<String>) -> Self {
        let total = chunks.iter().map(Vec::len).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in chunks {
            data.extend_from_slice(chunk);
        }
        Self::new(data, mime_type)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// SHA-256 hex digest of the payload.
    pub fn checksum(&self) -> String {
        let digest = Sha256::digest(self.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.mime_type == other.mime_type && (Arc::ptr_eq(&self.data, &other.data) || self.data == other.data)
    }
}

impl Eq for Blob {}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Blob", 2)?;
        state.serialize_field("mime_type", &self.mime_type)?;
        state.serialize_field("size", &self.data.len())?;
        state.end()
    }
}

/// A finalized capture, addressable through a revocable access URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedArtifact {
    pub kind: ArtifactKind,
    pub url: String,
    pub blob: Blob,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_ms: Option<u64>,
    pub checksum: String,
    pub created_at: String,
    /// Set once `extract` has handed the media to the caller; the engine
    /// no longer revokes the URL on its own.
    pub extracted: bool,
}

impl CapturedArtifact {
    pub fn new(kind: ArtifactKind, url: String, blob: Blob) -> Self {
        let checksum = blob.checksum();
        Self {
            kind,
            url,
            blob,
            width: None,
            height: None,
            duration_ms: None,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
            extracted: false,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Copy of the media without its access URL.
    pub fn to_extracted(&self) -> ExtractedArtifact {
        ExtractedArtifact {
            kind: self.kind,
            blob: self.blob.clone(),
            width: self.width,
            height: self.height,
            duration_ms: self.duration_ms,
            checksum: self.checksum.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Captured media handed over to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedArtifact {
    pub kind: ArtifactKind,
    pub blob: Blob,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_ms: Option<u64>,
    pub checksum: String,
    pub created_at: String,
}

/// Result of `CaptureEngine::extract`, one slot per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedMedia {
    pub video: Option<ExtractedArtifact>,
    pub audio: Option<ExtractedArtifact>,
    pub image: Option<ExtractedArtifact>,
}

impl ExtractedMedia {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none() && self.image.is_none()
    }
}
