use sha2::{Digest, Sha256};

/// Integrity envelope for the persisted scan history.
///
/// The history file is written by this process and read back on the next
/// start. A truncated or hand-edited file must never feed a half-valid result
/// list to the presentation layer, so the JSON body is stored next to its
/// SHA-256 digest and discarded on mismatch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedSnapshot {
    /// Serialized history entries (JSON string).
    pub data: String,
    /// Hex encoded SHA-256 of `data`.
    pub checksum: String,
}

impl ValidatedSnapshot {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Envelope as written to disk.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Returns the inner data if the envelope parses and the digest matches.
    pub fn open(serialized: &str) -> Option<String> {
        let snapshot: ValidatedSnapshot = match serde_json::from_str(serialized) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("History snapshot is not a valid envelope: {}", e);
                return None;
            }
        };

        if snapshot.is_valid() {
            Some(snapshot.data)
        } else {
            tracing::warn!(
                "History snapshot checksum mismatch. Expected: {}, Data length: {}",
                snapshot.checksum,
                snapshot.data.len()
            );
            None
        }
    }
}
