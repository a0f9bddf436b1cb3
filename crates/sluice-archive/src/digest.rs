use serde::{Deserialize, Serialize};

/// Digest computed over each extracted file while it streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStrategy {
    #[default]
    None,
    #[cfg(feature = "sha256")]
    Sha256,
    #[cfg(feature = "blake3")]
    Blake3,
}

impl HashStrategy {
    pub fn hasher(self) -> Option<EntryHasher> {
        match self {
            Self::None => None,
            #[cfg(feature = "sha256")]
            Self::Sha256 => Some(EntryHasher::Sha256(Box::default())),
            #[cfg(feature = "blake3")]
            Self::Blake3 => Some(EntryHasher::Blake3(Box::default())),
        }
    }

    /// Digest of an in-memory buffer.
    pub fn compute_from_bytes(self, content: &[u8]) -> Option<String> {
        let mut hasher = self.hasher()?;
        hasher.update(content);
        Some(hasher.finalize())
    }
}

/// Incremental hasher fed chunk by chunk.
pub enum EntryHasher {
    #[cfg(feature = "sha256")]
    Sha256(Box<sha2::Sha256>),
    #[cfg(feature = "blake3")]
    Blake3(Box<blake3::Hasher>),
}

impl EntryHasher {
    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            #[cfg(feature = "sha256")]
            Self::Sha256(h) => sha2::Digest::update(h.as_mut(), chunk),
            #[cfg(feature = "blake3")]
            Self::Blake3(h) => {
                h.update(chunk);
            }
        }
    }

    /// Lowercase hex digest.
    pub fn finalize(self) -> String {
        match self {
            #[cfg(feature = "sha256")]
            Self::Sha256(h) => hex::encode(sha2::Digest::finalize(*h)),
            #[cfg(feature = "blake3")]
            Self::Blake3(h) => hex::encode(h.finalize().as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_strategy_has_no_hasher() {
        assert!(HashStrategy::None.hasher().is_none());
        assert!(HashStrategy::None.compute_from_bytes(b"hello").is_none());
    }

    #[cfg(feature = "sha256")]
    #[test]
    fn sha256_known_digest() {
        assert_eq!(
            HashStrategy::Sha256.compute_from_bytes(b"hello world").unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[cfg(feature = "sha256")]
    #[test]
    fn chunked_updates_match_one_shot() {
        let mut hasher = HashStrategy::Sha256.hasher().unwrap();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(
            hasher.finalize(),
            HashStrategy::Sha256.compute_from_bytes(b"hello world").unwrap()
        );
    }

    #[cfg(feature = "blake3")]
    #[test]
    fn blake3_digest_is_hex() {
        let digest = HashStrategy::Blake3.compute_from_bytes(b"hello world").unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, blake3::hash(b"hello world").to_hex().as_str());
    }
}
