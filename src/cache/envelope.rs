use sha2::{Digest, Sha256};

/// Checksummed wrapper for cached result pages.
///
/// A cached value whose checksum no longer matches its payload (truncated
/// write, foreign writer on a shared cache) is rejected, and the caller
/// recomputes from the lead store as on any other miss.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheEnvelope {
    /// Serialized page or preview (JSON string).
    pub payload: String,
    /// SHA-256 checksum of the payload (hex encoded).
    pub checksum: String,
}

impl CacheEnvelope {
    pub fn new(payload: String) -> Self {
        let checksum = Self::compute_checksum(&payload);
        Self { payload, checksum }
    }

    fn compute_checksum(payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.payload) == self.checksum
    }

    /// Serializes the envelope for storage in the cache.
    pub fn seal(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses and verifies a stored envelope.
    ///
    /// Returns `None` for invalid JSON or a checksum mismatch.
    pub fn open(stored: &str) -> Option<String> {
        let envelope: CacheEnvelope = serde_json::from_str(stored).ok()?;

        if envelope.is_valid() {
            Some(envelope.payload)
        } else {
            tracing::warn!(
                "Cache envelope rejected: checksum mismatch ({} byte payload)",
                envelope.payload.len()
            );
            None
        }
    }
}
