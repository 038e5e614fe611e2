//! In-memory OCR engine for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;

use super::{BoundingBox, EngineOptions, OcrEngine, Recognition};
use crate::error::PipelineError;

/// Returns scripted results and counts calls.
///
/// Scripted responses pushed with [`MockOcrEngine::then`] are consumed first,
/// after which every call returns the fallback.
pub struct MockOcrEngine {
    scripted: Mutex<VecDeque<Result<Recognition, PipelineError>>>,
    fallback: Result<Recognition, PipelineError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    fn new(fallback: Result<Recognition, PipelineError>) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(Ok(Recognition::text(text)))
    }

    pub fn with_words(text: impl Into<String>, words: Vec<BoundingBox>) -> Self {
        Self::new(Ok(Recognition {
            text: text.into(),
            words,
        }))
    }

    pub fn failing(error: PipelineError) -> Self {
        Self::new(Err(error))
    }

    /// Queue a one-off result returned before the fallback
    pub fn then(self, result: Result<Recognition, PipelineError>) -> Self {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for MockOcrEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn recognize(
        &self,
        _image: &DynamicImage,
        _options: &EngineOptions,
    ) -> Result<Recognition, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}
