//! The signature extractor seam.

use crate::error::{Error, Result};
use crate::types::Signature;
use image::DynamicImage;
use std::sync::Arc;

/// Maps a decoded photograph to a face signature.
///
/// Returns `Ok(None)` when no face is present. Must be deterministic for a
/// fixed model version and input.
pub trait SignatureExtractor: Send + Sync {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Signature>>;

    /// Version tag stamped on every signature this extractor produces.
    fn version(&self) -> &str;
}

impl<T: SignatureExtractor + ?Sized> SignatureExtractor for Arc<T> {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Signature>> {
        (**self).extract(image)
    }

    fn version(&self) -> &str {
        (**self).version()
    }
}

/// Decode raw upload bytes. Undecodable input is `InvalidImage`, never "no face".
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::InvalidImage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image(b"definitely not a jpeg").unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert!(matches!(decode_image(&[]), Err(Error::InvalidImage(_))));
    }
}
