//! # OCR Processing Module
//!
//! This module provides optical character recognition (OCR) functionality for extracting
//! text and word bounding boxes from images using the Tesseract OCR engine.
//!
//! ## Features
//!
//! - Upload validation from raw bytes (magic-byte format detection, per-format
//!   size limits, decode memory estimate)
//! - Decoding with the `image` crate before any engine work is scheduled
//! - [`TesseractEngine`], the production [`RecognitionEngine`]
//! - hOCR parsing into word-level [`TextBox`]es
//!
//! ## Supported Image Formats
//!
//! - PNG (Portable Network Graphics)
//! - JPEG/JPG (Joint Photographic Experts Group)
//! - BMP (Bitmap)
//! - TIFF/TIF (Tagged Image File Format)
//! - GIF (Graphics Interchange Format)
//!
//! ## Dependencies
//!
//! - `leptess`: Rust bindings for Tesseract OCR and Leptonica
//! - `image`: Image format detection and decoding
//! - `regex`: hOCR word extraction

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use lazy_static::lazy_static;
use leptess::LepTess;
use regex::Regex;
use tracing::{debug, info, warn, Instrument};

pub use crate::instance_manager::OcrInstanceManager;
use crate::observability;
pub use crate::ocr_config::OcrConfig;
pub use crate::ocr_errors::OcrError;
use crate::recognition::{BoundingBox, DetailedResult, RecognitionEngine, TextBox};

lazy_static! {
    static ref HOCR_WORD: Regex = Regex::new(
        r#"(?s)<span\s+class=['"]ocrx_word['"][^>]*?title=['"]bbox\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)(?:;\s*x_wconf\s+(\d+(?:\.\d+)?))?[^'"]*['"][^>]*>(.*?)</span>"#
    )
    .expect("hOCR word pattern is valid");
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").expect("HTML tag pattern is valid");
}

/// Validate uploaded image bytes and detect their format
///
/// Performs the checks that can be done without decoding:
/// 1. Non-empty input with enough bytes to sniff a format
/// 2. Format detection using magic bytes (`image::guess_format`)
/// 3. File size validation against format-specific limits
/// 4. Decode memory estimation against the configured ceiling
///
/// # Examples
///
/// ```rust
/// use ocr_batch::ocr::{validate_image_bytes, OcrConfig};
///
/// let config = OcrConfig::default();
/// assert!(validate_image_bytes(b"definitely not an image", &config).is_err());
/// ```
pub fn validate_image_bytes(bytes: &[u8], config: &OcrConfig) -> Result<ImageFormat> {
    if bytes.is_empty() {
        return Err(anyhow::anyhow!("Image validation failed: file is empty"));
    }

    if bytes.len() < config.min_format_bytes {
        return Err(anyhow::anyhow!(
            "Image validation failed: not enough bytes to detect format (read {}, need at least {})",
            bytes.len(),
            config.min_format_bytes
        ));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| anyhow::anyhow!("Image validation failed: unrecognized image format ({e})"))?;

    let format_limit = config
        .format_limits
        .limit_for(format)
        .ok_or_else(|| anyhow::anyhow!("Image validation failed: unsupported image format {format:?}"))?;

    let file_size = bytes.len() as u64;
    if file_size > format_limit {
        return Err(anyhow::anyhow!(
            "Image file too large for {:?} format: {} bytes (maximum allowed: {} bytes)",
            format,
            file_size,
            format_limit
        ));
    }

    let estimated_memory_mb = estimate_memory_usage(file_size, &format);
    if estimated_memory_mb > config.memory_limit_mb {
        return Err(anyhow::anyhow!(
            "Estimated memory usage too high: {:.1}MB (maximum allowed: {}MB)",
            estimated_memory_mb,
            config.memory_limit_mb
        ));
    }

    debug!(
        format = ?format,
        file_size,
        estimated_memory_mb,
        "Image bytes validated"
    );
    Ok(format)
}

/// Validate and decode uploaded image bytes
///
/// Any error here is a decode failure of the upload itself; nothing has been
/// sent to the OCR engine yet.
pub fn decode_image(bytes: &[u8], config: &OcrConfig) -> Result<DynamicImage> {
    let format = validate_image_bytes(bytes, config)?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| anyhow::anyhow!("Invalid image: {e}"))
}

/// Estimate memory usage for image processing based on file size and format
///
/// Calculates expected memory consumption during image decompression and OCR processing.
///
/// # Memory Factors by Format
///
/// | Format | Factor | Reason |
/// |--------|--------|--------|
/// | PNG    | 3.0x   | Lossless decompression expands compressed data |
/// | JPEG   | 2.5x   | Lossy decompression with working buffers |
/// | BMP    | 1.2x   | Mostly uncompressed, minimal expansion |
/// | TIFF   | 4.0x   | Complex format with layers and metadata |
///
/// # Examples
///
/// ```rust
/// use ocr_batch::ocr::estimate_memory_usage;
/// use image::ImageFormat;
///
/// // 1MB PNG file
/// let memory_mb = estimate_memory_usage(1024 * 1024, &ImageFormat::Png);
/// assert_eq!(memory_mb, 3.0);
///
/// // 2MB JPEG file
/// let memory_mb = estimate_memory_usage(2 * 1024 * 1024, &ImageFormat::Jpeg);
/// assert_eq!(memory_mb, 5.0);
/// ```
pub fn estimate_memory_usage(file_size: u64, format: &ImageFormat) -> f64 {
    // Precision loss is irrelevant at image file sizes
    #[allow(clippy::cast_precision_loss)]
    let file_size_mb = file_size as f64 / (1024.0 * 1024.0);

    let memory_factor = match format {
        ImageFormat::Png => 3.0,
        ImageFormat::Jpeg => 2.5,
        ImageFormat::Bmp => 1.2,
        ImageFormat::Tiff => 4.0,
        _ => 3.0,
    };

    file_size_mb * memory_factor
}

/// Parse Tesseract hOCR output into word boxes
///
/// Only `ocrx_word` spans are read. Words that are blank after tag stripping
/// and entity decoding, or whose `x_wconf` is missing or zero, are dropped.
/// Confidence is normalized from Tesseract's 0-100 scale to `[0, 1]`.
///
/// # Examples
///
/// ```rust
/// use ocr_batch::ocr::parse_hocr_words;
///
/// let hocr = "<span class='ocrx_word' id='word_1_1' title='bbox 10 20 60 40; x_wconf 91'>Hola</span>";
/// let words = parse_hocr_words(hocr);
/// assert_eq!(words.len(), 1);
/// assert_eq!(words[0].text, "Hola");
/// assert_eq!(words[0].bbox.width, 50);
/// ```
pub fn parse_hocr_words(hocr: &str) -> Vec<TextBox> {
    HOCR_WORD
        .captures_iter(hocr)
        .filter_map(|caps| {
            let coord = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i32>().ok());
            let (x0, y0, x1, y1) = (coord(1)?, coord(2)?, coord(3)?, coord(4)?);

            let confidence = caps
                .get(5)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0);
            if confidence <= 0.0 {
                return None;
            }

            let raw = caps.get(6).map(|m| m.as_str()).unwrap_or_default();
            let text = decode_html_entities(&HTML_TAG.replace_all(raw, ""));
            let text = text.trim();
            if text.is_empty() {
                return None;
            }

            Some(TextBox {
                text: text.to_string(),
                confidence: (confidence / 100.0).clamp(0.0, 1.0),
                bbox: BoundingBox::from_corners(x0, y0, x1, y1),
            })
        })
        .collect()
}

fn decode_html_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Tesseract-backed recognition engine
///
/// One engine is created at startup and shared by every request. Each call
/// runs on tokio's blocking pool with an instance checked out of the
/// [`OcrInstanceManager`], so concurrent calls never share a `LepTess`
/// handle.
///
/// A call that the caller stops waiting for (deadline or cancellation) keeps
/// running on its blocking thread until Tesseract returns; its instance then
/// goes back to the pool.
pub struct TesseractEngine {
    config: OcrConfig,
    instances: Arc<OcrInstanceManager>,
}

impl TesseractEngine {
    /// Create the engine and eagerly initialize one instance so that missing
    /// language data is reported at startup rather than on the first upload
    pub fn new(config: OcrConfig) -> Result<Self, OcrError> {
        let instances = Arc::new(OcrInstanceManager::new());
        instances
            .checkout(&config)
            .map_err(|e| OcrError::Initialization(e.to_string()))?;

        info!(
            languages = %config.languages,
            model = config.model_type.tessdata_dir(),
            psm = config.psm_mode.as_str(),
            "Tesseract engine initialized"
        );

        Ok(Self { config, instances })
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Release pooled Tesseract instances
    pub fn shutdown(&self) {
        self.instances.clear();
    }
}

fn recognize_blocking(
    instances: &OcrInstanceManager,
    config: &OcrConfig,
    image: &DynamicImage,
) -> (Result<DetailedResult, OcrError>, u64) {
    let mut png = Vec::new();
    if let Err(e) = image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
        return (
            Err(OcrError::ImageLoad(format!("Failed to encode image for OCR: {e}"))),
            0,
        );
    }
    let image_size = png.len() as u64;

    let result = (|| -> Result<DetailedResult, OcrError> {
        let mut tess = instances
            .checkout(config)
            .map_err(|e| OcrError::Initialization(e.to_string()))?;

        tess.set_image_from_mem(&png).map_err(|e| {
            OcrError::ImageLoad(format!("Failed to load image for OCR: {e}"))
        })?;

        let hocr = tess.get_hocr_text(0).map_err(|e| {
            OcrError::Extraction(format!("Failed to extract text from image: {e}"))
        })?;

        Ok(DetailedResult::from_boxes(
            parse_hocr_words(&hocr),
            config.languages.clone(),
        ))
    })();

    (result, image_size)
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: DynamicImage) -> Result<DetailedResult, OcrError> {
        let instances = Arc::clone(&self.instances);
        let config = self.config.clone();

        async move {
            let start_time = Instant::now();
            let joined = tokio::task::spawn_blocking(move || {
                recognize_blocking(&instances, &config, &image)
            })
            .await;
            let (result, image_size) = match joined {
                Ok(pair) => pair,
                Err(e) => (
                    Err(OcrError::Extraction(format!("OCR worker thread failed: {e}"))),
                    0,
                ),
            };

            let duration = start_time.elapsed();
            observability::record_ocr_metrics(result.is_ok(), duration, image_size);

            match &result {
                Ok(detailed) => info!(
                    "OCR processing completed in {}ms, extracted {} words",
                    duration.as_millis(),
                    detailed.total_lines
                ),
                Err(e) => warn!("OCR processing failed after {}ms: {e}", duration.as_millis()),
            }

            result
        }
        .instrument(observability::ocr_span("recognize"))
        .await
    }
}

/// Check OCR engine availability by testing Tesseract initialization
pub async fn check_ocr_health(config: &OcrConfig) -> Result<()> {
    let languages = config.languages.clone();
    tokio::task::spawn_blocking(move || LepTess::new(None, &languages).map(|_| ()))
        .await?
        .map_err(|e| anyhow::anyhow!("OCR health check failed: {}", e))?;

    debug!("OCR health check passed");
    Ok(())
}
