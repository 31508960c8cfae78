//! Codec Module
//!
//! The cache never decodes or encodes images itself. Hosts plug in their
//! image format through [`ImageCodec`].

use std::sync::Arc;

use thiserror::Error;

// == Codec Error ==
/// Failure reported by a codec implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CodecError {
    pub message: String,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// == Image Codec ==
/// Converts between encoded bytes and decoded images.
///
/// Implementations are shared between the caller's threads and the disk
/// lane, so they must be `Send + Sync`.
pub trait ImageCodec: Send + Sync + 'static {
    /// Decoded form kept in the memory tier. Cloning should be cheap
    /// (typically an `Arc`).
    type Image: Clone + Send + Sync + 'static;

    /// Decodes bytes read from disk.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, CodecError>;

    /// Encodes an image for disk storage when the caller supplied no bytes.
    fn encode(&self, image: &Self::Image) -> Result<Vec<u8>, CodecError>;

    /// Memory cost of a decoded image.
    fn estimated_cost(&self, image: &Self::Image) -> usize;

    /// Empty images are never cached.
    fn is_empty(&self, image: &Self::Image) -> bool {
        self.estimated_cost(image) == 0
    }
}

// == Passthrough Codec ==
/// Codec whose decoded form is the encoded bytes themselves.
///
/// Useful for tooling that only manages the disk tier, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl ImageCodec for PassthroughCodec {
    type Image = Arc<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, CodecError> {
        Ok(Arc::new(bytes.to_vec()))
    }

    fn encode(&self, image: &Self::Image) -> Result<Vec<u8>, CodecError> {
        Ok(image.as_ref().clone())
    }

    fn estimated_cost(&self, image: &Self::Image) -> usize {
        image.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_roundtrip() {
        let codec = PassthroughCodec;
        let image = codec.decode(b"\x89PNG-bytes").unwrap();
        assert_eq!(codec.encode(&image).unwrap(), b"\x89PNG-bytes".to_vec());
        assert_eq!(codec.estimated_cost(&image), 10);
    }

    #[test]
    fn test_empty_image_detected() {
        let codec = PassthroughCodec;
        assert!(codec.is_empty(&Arc::new(Vec::new())));
        assert!(!codec.is_empty(&Arc::new(vec![1])));
    }
}
