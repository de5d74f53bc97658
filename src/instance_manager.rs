//! # OCR Instance Manager Module
//!
//! This module provides thread-safe OCR instance management for reusing Tesseract instances.
//! Reusing instances significantly improves performance by avoiding initialization overhead.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use tracing::{debug, info};

use crate::ocr_config::{ModelType, OcrConfig};

/// Thread-safe pool of Tesseract instances.
///
/// A `LepTess` handle can only run one recognition at a time, so instead of
/// sharing a single locked instance this manager hands out exclusive
/// instances. Idle instances are kept per language/model key and reused by
/// later checkouts; when none is idle a new one is initialized.
///
/// # Performance Benefits
///
/// - Eliminates Tesseract initialization overhead (~100-500ms per instance)
/// - Concurrent batch items each get their own instance
///
/// # Instance Lifecycle
///
/// - Instances are created on demand by [`OcrInstanceManager::checkout`]
/// - Dropping a [`PooledInstance`] returns it to the idle list
/// - The number of live instances grows to the peak number of concurrent
///   checkouts, which the batch admission gate bounds
pub struct OcrInstanceManager {
    idle: Mutex<HashMap<String, Vec<LepTess>>>,
}

/// An instance checked out of the pool; returned on drop
pub struct PooledInstance<'a> {
    manager: &'a OcrInstanceManager,
    key: String,
    tess: Option<LepTess>,
}

impl Deref for PooledInstance<'_> {
    type Target = LepTess;

    fn deref(&self) -> &LepTess {
        // Only `Drop` takes the instance out
        self.tess.as_ref().unwrap_or_else(|| unreachable!("instance taken before drop"))
    }
}

impl DerefMut for PooledInstance<'_> {
    fn deref_mut(&mut self) -> &mut LepTess {
        self.tess.as_mut().unwrap_or_else(|| unreachable!("instance taken before drop"))
    }
}

impl Drop for PooledInstance<'_> {
    fn drop(&mut self) {
        if let Some(tess) = self.tess.take() {
            self.manager
                .idle
                .lock()
                .entry(std::mem::take(&mut self.key))
                .or_default()
                .push(tess);
        }
    }
}

impl OcrInstanceManager {
    /// Create a new OCR instance manager
    ///
    /// Initializes an empty instance pool. Instances will be created
    /// on-demand when first requested via `checkout()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ocr_batch::instance_manager::OcrInstanceManager;
    ///
    /// let manager = OcrInstanceManager::new();
    /// assert_eq!(manager.idle_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
        }
    }

    fn key_for(config: &OcrConfig) -> String {
        format!(
            "{}:{}:{}",
            config.languages,
            config.model_type.tessdata_dir(),
            config.psm_mode.as_str()
        )
    }

    /// Check out an exclusive OCR instance for the given configuration
    ///
    /// Returns an idle instance if one exists for the configuration key,
    /// otherwise initializes a new one. The instance goes back to the pool
    /// when the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if Tesseract instance creation fails (e.g., invalid language codes)
    pub fn checkout(&self, config: &OcrConfig) -> anyhow::Result<PooledInstance<'_>> {
        let key = Self::key_for(config);

        let reused = self.idle.lock().get_mut(&key).and_then(Vec::pop);
        let tess = match reused {
            Some(tess) => {
                debug!(key = %key, "Reusing pooled OCR instance");
                tess
            }
            None => Self::create_instance(config)?,
        };

        Ok(PooledInstance {
            manager: self,
            key,
            tess: Some(tess),
        })
    }

    fn create_instance(config: &OcrConfig) -> anyhow::Result<LepTess> {
        info!(
            "Creating new OCR instance for languages: {} with model: {}",
            config.languages,
            config.model_type.tessdata_dir()
        );

        // Determine tessdata path based on model type
        let tessdata_path = Self::get_tessdata_path(config.model_type);

        let mut tess = LepTess::new(tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to set PSM mode: {}", e))?;

        Ok(tess)
    }

    /// Get the tessdata path for the specified model type
    ///
    /// Attempts to find the appropriate tessdata directory based on the model type.
    /// Falls back to default path if specific model directory is not found.
    fn get_tessdata_path(model_type: ModelType) -> Option<String> {
        // Common tessdata installation paths to try
        let possible_paths = match model_type {
            ModelType::Fast => [
                "/usr/share/tesseract-ocr/5/tessdata_fast",
                "/usr/share/tesseract-ocr/4.00/tessdata_fast",
                "/usr/share/tessdata_fast",
                "/usr/local/share/tessdata_fast",
            ],
            ModelType::Best => [
                "/usr/share/tesseract-ocr/5/tessdata_best",
                "/usr/share/tesseract-ocr/4.00/tessdata_best",
                "/usr/share/tessdata_best",
                "/usr/local/share/tessdata_best",
            ],
        };

        // Try each path and return the first one that exists
        for path in possible_paths {
            if std::path::Path::new(path).exists() {
                info!("Using tessdata path: {}", path);
                return Some(path.to_string());
            }
        }

        info!(
            "No specific tessdata path found for model type {:?}, using default",
            model_type
        );
        None
    }

    /// Number of idle instances across all configurations
    pub fn idle_count(&self) -> usize {
        self.idle.lock().values().map(Vec::len).sum()
    }

    /// Drop every idle instance (used at shutdown)
    pub fn clear(&self) {
        let mut idle = self.idle.lock();
        let count: usize = idle.values().map(Vec::len).sum();
        idle.clear();
        if count > 0 {
            info!("Cleared {count} OCR instances");
        }
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
