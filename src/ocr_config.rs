//! # OCR Configuration Module
//!
//! This module defines configuration structures for OCR processing,
//! including Tesseract model selection, format limits, and upload validation
//! parameters.

use serde::{Deserialize, Serialize};
use std::env;

use crate::errors::{AppError, AppResult};

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "spa";
pub const MIN_FORMAT_BYTES: usize = 8;
pub const DEFAULT_MEMORY_LIMIT_MB: f64 = 256.0;

/// Format-specific file size limits for different image formats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatSizeLimits {
    /// PNG format limit (higher due to better compression)
    pub png_max: u64,
    /// JPEG format limit (moderate due to lossy compression)
    pub jpeg_max: u64,
    /// BMP format limit (lower due to uncompressed nature)
    pub bmp_max: u64,
    /// TIFF format limit (can be large, multi-page support)
    pub tiff_max: u64,
    /// GIF format limit
    pub gif_max: u64,
}

impl Default for FormatSizeLimits {
    fn default() -> Self {
        Self {
            png_max: 15 * 1024 * 1024,  // 15MB for PNG
            jpeg_max: 10 * 1024 * 1024, // 10MB for JPEG
            bmp_max: 5 * 1024 * 1024,   // 5MB for BMP
            tiff_max: 20 * 1024 * 1024, // 20MB for TIFF
            gif_max: 5 * 1024 * 1024,   // 5MB for GIF
        }
    }
}

impl FormatSizeLimits {
    /// Size limit for a detected format, `None` when the format is not accepted
    pub fn limit_for(&self, format: image::ImageFormat) -> Option<u64> {
        match format {
            image::ImageFormat::Png => Some(self.png_max),
            image::ImageFormat::Jpeg => Some(self.jpeg_max),
            image::ImageFormat::Bmp => Some(self.bmp_max),
            image::ImageFormat::Tiff => Some(self.tiff_max),
            image::ImageFormat::Gif => Some(self.gif_max),
            _ => None,
        }
    }

    /// Validate format size limits
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("png_max", self.png_max),
            ("jpeg_max", self.jpeg_max),
            ("bmp_max", self.bmp_max),
            ("tiff_max", self.tiff_max),
            ("gif_max", self.gif_max),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than 0", name)));
            }
        }

        // Ensure format limits are reasonable compared to each other
        if self.bmp_max > self.png_max {
            return Err(AppError::Config(format!(
                "bmp_max ({}) should not exceed png_max ({})",
                self.bmp_max, self.png_max
            )));
        }
        if self.jpeg_max > self.png_max {
            return Err(AppError::Config(format!(
                "jpeg_max ({}) should not exceed png_max ({})",
                self.jpeg_max, self.png_max
            )));
        }

        Ok(())
    }
}

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSegMode {
    /// Automatic page segmentation with OSD
    AutoOsd = 1,
    /// Fully automatic page segmentation
    #[default]
    Auto = 3,
    /// Assume a single column of text
    SingleColumn = 4,
    /// Assume a single uniform block of text
    SingleBlock = 6,
    /// Treat the image as a single text line
    SingleLine = 7,
    /// Find as much text as possible in no particular order
    SparseText = 11,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::AutoOsd => "1",
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SparseText => "11",
        }
    }

    /// Parse the numeric Tesseract value (`--psm N`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1" => Some(PageSegMode::AutoOsd),
            "3" => Some(PageSegMode::Auto),
            "4" => Some(PageSegMode::SingleColumn),
            "6" => Some(PageSegMode::SingleBlock),
            "7" => Some(PageSegMode::SingleLine),
            "11" => Some(PageSegMode::SparseText),
            _ => None,
        }
    }
}

/// Tesseract model type for different accuracy/speed trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - faster processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }

    /// Parse `fast` / `best` (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "fast" => Some(ModelType::Fast),
            "best" => Some(ModelType::Best),
            _ => None,
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "spa", "eng+fra", "deu")
    pub languages: String,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
    /// Default page segmentation mode for OCR
    pub psm_mode: PageSegMode,
    /// Minimum bytes required for format detection
    pub min_format_bytes: usize,
    /// Format-specific size limits
    pub format_limits: FormatSizeLimits,
    /// Upper bound on estimated decode memory per image, in MB
    pub memory_limit_mb: f64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            model_type: ModelType::default(),
            psm_mode: PageSegMode::default(),
            min_format_bytes: MIN_FORMAT_BYTES,
            format_limits: FormatSizeLimits::default(),
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
        }
    }
}

impl OcrConfig {
    /// Load OCR settings from the environment, falling back to defaults
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(languages) = env::var("TESSERACT_LANG") {
            config.languages = languages;
        }
        if let Ok(model) = env::var("TESSERACT_MODEL") {
            config.model_type = ModelType::parse(&model).ok_or_else(|| {
                AppError::Config(format!(
                    "TESSERACT_MODEL must be 'fast' or 'best', got '{}'",
                    model
                ))
            })?;
        }
        if let Ok(psm) = env::var("TESSERACT_PSM") {
            config.psm_mode = PageSegMode::parse(&psm).ok_or_else(|| {
                AppError::Config(format!("TESSERACT_PSM value '{}' is not supported", psm))
            })?;
        }
        config.memory_limit_mb = env::var("OCR_MEMORY_LIMIT_MB")
            .unwrap_or_else(|_| DEFAULT_MEMORY_LIMIT_MB.to_string())
            .parse()
            .map_err(|_| AppError::Config("OCR_MEMORY_LIMIT_MB must be a number".to_string()))?;

        Ok(config)
    }

    /// Validate OCR configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        // Validate languages string
        if self.languages.trim().is_empty() {
            return Err(AppError::Config("languages cannot be empty".to_string()));
        }

        if self.min_format_bytes == 0 {
            return Err(AppError::Config(
                "min_format_bytes must be greater than 0".to_string(),
            ));
        }

        if self.memory_limit_mb <= 0.0 {
            return Err(AppError::Config(
                "memory_limit_mb must be greater than 0".to_string(),
            ));
        }

        self.format_limits.validate()?;

        Ok(())
    }
}
