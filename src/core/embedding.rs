use crate::common::config::EmbeddingConfig;
use image::{DynamicImage, imageops::FilterType};

pub type Embedding = Vec<f32>;

/// Deterministic texture fingerprint of an RGBA frame.
///
/// The frame is cut into square regions; each region contributes its grayscale
/// mean and standard deviation, followed by a handful of luminance deltas
/// between neighbouring pixels. The result is L2-normalised.
#[derive(Debug, Clone)]
pub struct EmbeddingExtractor {
    config: EmbeddingConfig,
}

impl EmbeddingExtractor {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Expected length of an RGBA buffer for this extractor.
    pub fn frame_len(&self) -> usize {
        self.config.width as usize * self.config.height as usize * 4
    }

    /// Extract from an interleaved RGBA buffer of `width * height * 4` bytes.
    ///
    /// Never fails: a buffer of the wrong size yields the zero vector.
    pub fn extract(&self, pixels: &[u8]) -> Embedding {
        let mut embedding = self.features(pixels);
        l2_normalize(&mut embedding);
        embedding
    }

    /// Resize a decoded image to the configured frame size and extract from it.
    pub fn extract_image(&self, image: &DynamicImage) -> Embedding {
        let (width, height) = (self.config.width, self.config.height);

        let frame = if image.width() == width && image.height() == height {
            image.to_rgba8()
        } else {
            image.resize_exact(width, height, FilterType::Triangle).to_rgba8()
        };

        self.extract(frame.as_raw())
    }

    fn features(&self, pixels: &[u8]) -> Embedding {
        let dims = self.config.dimensions;
        let mut embedding = vec![0.0f32; dims];

        if pixels.len() != self.frame_len() {
            tracing::warn!("Frame has {} bytes, expected {}; returning zero embedding",
                           pixels.len(), self.frame_len());
            return embedding;
        }

        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let region = self.config.region_size as usize;

        let gray = |pixel: usize| -> f64 {
            let i = pixel * 4;
            (pixels[i] as f64 + pixels[i + 1] as f64 + pixels[i + 2] as f64) / 3.0
        };

        let mut index = 0;

        // Only whole regions contribute, row-major
        'regions: for ry in 0..height / region {
            for rx in 0..width / region {
                if index >= dims {
                    break 'regions;
                }

                let rows = ry * region..(ry + 1) * region;
                let cols = rx * region..(rx + 1) * region;
                let count = (region * region) as f64;

                let mut sum = 0.0;
                for y in rows.clone() {
                    for x in cols.clone() {
                        sum += gray(y * width + x);
                    }
                }
                let mean = sum / count;

                let mut squared = 0.0;
                for y in rows.clone() {
                    for x in cols.clone() {
                        squared += (gray(y * width + x) - mean).powi(2);
                    }
                }
                let variance = squared / count;

                embedding[index] = (mean / 255.0) as f32;
                index += 1;
                if index < dims {
                    embedding[index] = (variance.sqrt() / 255.0) as f32;
                    index += 1;
                }
            }
        }

        // Coarse edge features fill whatever room is left
        let pixel_count = width * height;
        let mut pixel = 0;
        let mut taken = 0;
        while index < dims && taken < self.config.edge_samples && pixel + 1 < pixel_count {
            embedding[index] = ((gray(pixel) - gray(pixel + 1)).abs() / 255.0) as f32;
            index += 1;
            taken += 1;
            pixel += self.config.edge_stride;
        }

        embedding
    }
}

/// Scale to unit Euclidean norm in place. A zero vector is left untouched.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

pub fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}
