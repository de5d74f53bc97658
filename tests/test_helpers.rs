//! # Test Helper Library
//!
//! Shared fixtures for the integration tests: tiny in-memory PNGs and a
//! scriptable recognition engine that never touches Tesseract.
//!
//! Each test image is `(index + 1)` pixels wide, so the fake engine can tell
//! which batch item it is looking at and apply a per-item script.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use ocr_batch::batch::{BatchInput, BatchService, ItemProcessor};
use ocr_batch::config::BatchConfig;
use ocr_batch::ocr_config::OcrConfig;
use ocr_batch::ocr_errors::OcrError;
use ocr_batch::recognition::{BoundingBox, DetailedResult, RecognitionEngine, TextBox};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Encode a white RGB PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([255u8, 255, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode test png");
    bytes
}

/// One decodable input per index, tagged by image width
pub fn image_input(index: usize) -> BatchInput {
    BatchInput::new(
        index,
        format!("page_{index}.png"),
        png_bytes(index as u32 + 1, 4),
    )
}

pub fn image_inputs(count: usize) -> Vec<BatchInput> {
    (0..count).map(image_input).collect()
}

/// Text the fake engine returns for item `index`
pub fn expected_text(index: usize) -> String {
    format!("item-{index}")
}

/// Fake engine with per-item latency, failure, hang and panic scripts
#[derive(Default)]
pub struct ScriptedEngine {
    default_delay: Duration,
    delays: HashMap<usize, Duration>,
    failures: HashSet<usize>,
    hangs: HashSet<usize>,
    panics: HashSet<usize>,
    texts: HashMap<usize, String>,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    started: Mutex<Vec<usize>>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    pub fn failing(mut self, index: usize) -> Self {
        self.failures.insert(index);
        self
    }

    pub fn hanging(mut self, index: usize) -> Self {
        self.hangs.insert(index);
        self
    }

    pub fn panicking(mut self, index: usize) -> Self {
        self.panics.insert(index);
        self
    }

    pub fn with_text(mut self, index: usize, text: impl Into<String>) -> Self {
        self.texts.insert(index, text.into());
        self
    }

    /// Highest number of simultaneous `recognize` calls observed
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Item indices in the order their recognition started
    pub fn started(&self) -> Vec<usize> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self, image: DynamicImage) -> Result<DetailedResult, OcrError> {
        let index = image.width() as usize - 1;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().push(index);

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        if self.panics.contains(&index) {
            panic!("scripted engine panic for item {index}");
        }

        if self.hangs.contains(&index) {
            std::future::pending::<()>().await;
        }

        let delay = self
            .delays
            .get(&index)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failures.contains(&index) {
            return Err(OcrError::Extraction(format!("scripted failure for item {index}")));
        }

        let text = self
            .texts
            .get(&index)
            .cloned()
            .unwrap_or_else(|| expected_text(index));
        let boxes = text
            .split_whitespace()
            .enumerate()
            .map(|(i, word)| TextBox {
                text: word.to_string(),
                confidence: 0.9,
                bbox: BoundingBox::from_corners(i as i32 * 10, 0, i as i32 * 10 + 8, 10),
            })
            .collect();
        Ok(DetailedResult::from_boxes(boxes, "spa"))
    }
}

/// Engine that sleeps on the blocking pool like a native OCR call
///
/// Dropping the `recognize` future does not stop the blocking work, so
/// `peak()` counts calls that are really executing.
pub struct BlockingEngine {
    work: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: AtomicUsize,
}

impl BlockingEngine {
    pub fn new(work: Duration) -> Self {
        Self {
            work,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionEngine for BlockingEngine {
    fn name(&self) -> &str {
        "blocking"
    }

    async fn recognize(&self, image: DynamicImage) -> Result<DetailedResult, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = image.width() as usize - 1;
        let work = self.work;
        let active = Arc::clone(&self.active);
        let peak = Arc::clone(&self.peak);

        tokio::task::spawn_blocking(move || {
            let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now_active, Ordering::SeqCst);
            std::thread::sleep(work);
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .await
        .map_err(|e| OcrError::Extraction(e.to_string()))?;

        Ok(DetailedResult::from_boxes(
            vec![TextBox {
                text: expected_text(index),
                confidence: 0.9,
                bbox: BoundingBox::from_corners(0, 0, 8, 10),
            }],
            "spa",
        ))
    }
}

/// Batch service over `engine` without persistence
pub fn batch_service(engine: Arc<ScriptedEngine>, config: BatchConfig) -> BatchService {
    let processor = ItemProcessor::new(engine, OcrConfig::default());
    BatchService::new(processor, config)
}

pub fn batch_config(max_concurrency: usize, item_timeout_secs: u64) -> BatchConfig {
    BatchConfig {
        max_concurrency,
        item_timeout_secs,
        ..Default::default()
    }
}
