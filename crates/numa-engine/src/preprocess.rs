use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use numa_contracts::AnalysisError;

pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// JPEG-encoded photo ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub base64: String,
    pub byte_len: usize,
    pub quality: u8,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64)
    }
}

/// Re-encodes a photo at falling JPEG quality until it fits the size cap.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    pub max_bytes: usize,
    pub start_quality: u8,
    pub quality_step: u8,
    pub min_quality: u8,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
            start_quality: 80,
            quality_step: 10,
            min_quality: 10,
        }
    }
}

impl ImagePreprocessor {
    pub fn encode(&self, image: &DynamicImage) -> Result<EncodedImage, AnalysisError> {
        let rgb = flatten_to_rgb(image);
        let step = self.quality_step.max(1);
        let floor = self.min_quality.clamp(1, 100);
        let mut quality = self.start_quality.clamp(floor, 100);
        let mut bytes = encode_jpeg(&rgb, quality)?;

        while bytes.len() > self.max_bytes && quality > floor {
            quality = quality.saturating_sub(step).max(floor);
            bytes = encode_jpeg(&rgb, quality)?;
            log::debug!("re-encoded meal photo at quality {quality}: {} bytes", bytes.len());
        }

        if bytes.len() > self.max_bytes {
            log::warn!(
                "meal photo still {} bytes at quality floor {floor} (cap {})",
                bytes.len(),
                self.max_bytes
            );
            return Err(AnalysisError::ImageTooLarge);
        }

        Ok(EncodedImage {
            byte_len: bytes.len(),
            base64: BASE64.encode(&bytes),
            quality,
        })
    }
}

/// Decodes a photo from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, AnalysisError> {
    image::open(path).map_err(|err| {
        log::error!("failed to decode {}: {err}", path.display());
        AnalysisError::ImageProcessingFailed
    })
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, AnalysisError> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder.encode_image(image).map_err(|err| {
        log::error!("jpeg encode failed at quality {quality}: {err}");
        AnalysisError::ImageProcessingFailed
    })?;
    if bytes.is_empty() {
        return Err(AnalysisError::ImageProcessingFailed);
    }
    Ok(bytes)
}

// JPEG has no alpha; blend translucent pixels onto white.
fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}
