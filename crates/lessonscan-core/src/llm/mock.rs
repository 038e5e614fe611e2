//! In-memory completion provider for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{CompletionProvider, CompletionRequest};

/// Returns scripted replies and records every request.
pub struct MockProvider {
    scripted: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    fn new(fallback: Result<String, String>) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `reply`
    pub fn reply(reply: impl Into<String>) -> Self {
        Self::new(Ok(reply.into()))
    }

    /// Always fail with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(Err(message.into()))
    }

    /// Queue a one-off reply (`Err` = failure) returned before the fallback
    pub fn then(self, reply: Result<String, String>) -> Self {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted
            .unwrap_or_else(|| self.fallback.clone())
            .map_err(|message| anyhow!(message))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}
