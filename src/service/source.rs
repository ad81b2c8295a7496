use crate::core::embedding::{Embedding, EmbeddingExtractor};
use crate::storage::ledger::Vote;
use image::{DynamicImage, RgbaImage};

/// Outcome of calling an optional collaborator. Being unavailable is a normal state.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> SourceOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, SourceOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            SourceOutcome::Ready(value) => Some(value),
            SourceOutcome::Unavailable(_) => None,
        }
    }
}

/// A captured RGBA frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        }
    }
}

/// Anything that turns a frame into an embedding: the local extractor or a remote recogniser.
pub trait EmbeddingSource: Send + Sync {
    fn embed(&self, frame: &Frame) -> SourceOutcome<Embedding>;

    /// Length of the embeddings this source produces.
    fn dimensions(&self) -> usize;
}

/// Records a cast vote somewhere external and hands back an opaque confirmation token.
pub trait ReceiptService: Send + Sync {
    fn record(&self, vote: &Vote) -> SourceOutcome<String>;
}

pub struct LocalEmbeddingSource {
    extractor: EmbeddingExtractor,
}

impl LocalEmbeddingSource {
    pub fn new(extractor: EmbeddingExtractor) -> Self {
        Self { extractor }
    }
}

impl EmbeddingSource for LocalEmbeddingSource {
    fn embed(&self, frame: &Frame) -> SourceOutcome<Embedding> {
        if frame.width == 0 || frame.height == 0 {
            return SourceOutcome::Unavailable(format!("empty {}x{} frame", frame.width, frame.height));
        }

        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.pixels.len() != expected {
            return SourceOutcome::Unavailable(format!(
                "frame of {} bytes does not hold {}x{} RGBA pixels",
                frame.pixels.len(), frame.width, frame.height
            ));
        }

        if expected == self.extractor.frame_len() {
            return SourceOutcome::Ready(self.extractor.extract(&frame.pixels));
        }

        // Other sizes go through a resize
        match RgbaImage::from_raw(frame.width, frame.height, frame.pixels.clone()) {
            Some(image) => SourceOutcome::Ready(
                self.extractor.extract_image(&DynamicImage::ImageRgba8(image)),
            ),
            None => SourceOutcome::Unavailable("frame could not be decoded as RGBA".into()),
        }
    }

    fn dimensions(&self) -> usize {
        self.extractor.dimensions()
    }
}

/// No external recorder configured.
pub struct NoReceipts;

impl ReceiptService for NoReceipts {
    fn record(&self, _vote: &Vote) -> SourceOutcome<String> {
        SourceOutcome::Unavailable("no receipt service configured".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::EmbeddingConfig;
    use image::Rgba;

    fn source() -> LocalEmbeddingSource {
        let config = EmbeddingConfig {
            width: 8,
            height: 8,
            region_size: 4,
            dimensions: 16,
            edge_stride: 1,
            edge_samples: 4,
        };
        LocalEmbeddingSource::new(EmbeddingExtractor::new(&config))
    }

    #[test]
    fn test_exact_frame_is_ready() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([90, 10, 200, 255])));
        let source = source();
        let outcome = source.embed(&Frame::from_image(&image));
        assert_eq!(outcome.ready().map(|e| e.len()), Some(source.dimensions()));
    }

    #[test]
    fn test_other_size_is_resized() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 12, Rgba([90, 10, 200, 255])));
        assert!(source().embed(&Frame::from_image(&image)).is_ready());
    }

    #[test]
    fn test_malformed_frame_is_unavailable() {
        let frame = Frame { width: 8, height: 8, pixels: vec![0; 7] };
        assert!(matches!(source().embed(&frame), SourceOutcome::Unavailable(_)));
    }

    #[test]
    fn test_empty_frame_is_unavailable() {
        let frame = Frame { width: 0, height: 0, pixels: vec![] };
        assert!(matches!(source().embed(&frame), SourceOutcome::Unavailable(_)));

        let frame = Frame { width: 0, height: 8, pixels: vec![] };
        assert!(!source().embed(&frame).is_ready());
    }

    #[test]
    fn test_oversized_buffer_is_unavailable() {
        let frame = Frame { width: 8, height: 8, pixels: vec![0; 8 * 8 * 4 + 4] };
        assert!(matches!(source().embed(&frame), SourceOutcome::Unavailable(_)));
    }

    #[test]
    fn test_no_receipts() {
        let vote = Vote {
            id: "b1".into(),
            voter_id: "v1".into(),
            candidate_id: "1".into(),
            timestamp: chrono::Utc::now(),
            receipt: None,
        };
        assert!(!NoReceipts.record(&vote).is_ready());
    }
}
