//! Preload bookkeeping for remote resources.
//!
//! The cache never holds bytes: a preload warms the HTTP caches between the
//! display and the backend so the renderer can show media without a visible
//! loading delay. What is tracked here is *which* URLs are warm.
//!
//! Only one preload runs at a time. Requests arriving while one is in flight
//! are queued in arrival order and started one by one as the previous fetch
//! completes:
//!
//! ```text
//!   Unset ──request──► Preloading ──finish──► Ok | NoExpiryInfo | HttpFailed
//!     │                    ▲
//!     └──request (busy)──► Queued ──dequeue──┘
//! ```

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreloadState {
    #[default]
    Unset,
    Preloading,
    Queued,
    Ok,
    NoExpiryInfo,
    HttpFailed,
}

impl PreloadState {
    /// True when the resource can be shown without a loading delay.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ok | Self::NoExpiryInfo)
    }
}

/// Result of one preload fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadOutcome {
    /// 2xx with an `Expires` header: the resource is cacheable.
    Cached,
    /// 2xx without expiry information.
    NoExpiryInfo,
    /// Non-2xx answer or transport error.
    Failed(String),
}

impl PreloadOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    fn state(&self) -> PreloadState {
        match self {
            Self::Cached => PreloadState::Ok,
            Self::NoExpiryInfo => PreloadState::NoExpiryInfo,
            Self::Failed(_) => PreloadState::HttpFailed,
        }
    }
}

/// What the caller must do after [`ResourceCache::request_preload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadRequest {
    /// Nothing in flight: the caller must issue the fetch now.
    Start,
    /// Another fetch is in flight; the URL waits in the queue.
    Queued,
    /// Ready, in flight, queued, or out of attempts already.
    Skipped,
}

#[derive(Debug, Default)]
struct Entry {
    state: PreloadState,
    attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    pub preloading: usize,
    pub queued: usize,
    pub ok: usize,
    pub no_expiry_info: usize,
    pub http_failed: usize,
}

#[derive(Debug)]
pub struct ResourceCache {
    entries: HashMap<String, Entry>,
    queue: VecDeque<String>,
    max_attempts: u32,
}

impl ResourceCache {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            entries: HashMap::new(),
            queue: VecDeque::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn preload_state(&self, url: &str) -> PreloadState {
        self.entries
            .get(url)
            .map(|e| e.state)
            .unwrap_or(PreloadState::Unset)
    }

    pub fn is_ready(&self, url: &str) -> bool {
        self.preload_state(url).is_ready()
    }

    /// Queue `url` for a later preload. Resources that already loaded fine
    /// are left alone.
    pub fn mark_queued(&mut self, url: &str) {
        let entry = self.entries.entry(url.to_string()).or_default();
        if entry.state.is_ready() || entry.state == PreloadState::Queued {
            return;
        }
        entry.state = PreloadState::Queued;
        self.queue.push_back(url.to_string());
    }

    pub fn has_active_preload(&self, include_queue: bool) -> bool {
        self.entries.values().any(|e| {
            e.state == PreloadState::Preloading
                || (include_queue && e.state == PreloadState::Queued)
        })
    }

    /// Whether content pointing at `url` should trigger a preload.
    pub fn needs_preload(&self, url: &str) -> bool {
        match self.entries.get(url) {
            None => true,
            Some(e) => match e.state {
                PreloadState::Unset => true,
                PreloadState::HttpFailed => e.attempts < self.max_attempts,
                _ => false,
            },
        }
    }

    /// Start-or-enqueue entry point used when new content arrives.
    pub fn request_preload(&mut self, url: &str) -> PreloadRequest {
        if !self.needs_preload(url) {
            return PreloadRequest::Skipped;
        }
        if self.has_active_preload(false) {
            self.mark_queued(url);
            PreloadRequest::Queued
        } else {
            self.begin_preload(url);
            PreloadRequest::Start
        }
    }

    /// Mark `url` as the single in-flight preload. The caller issues the fetch.
    pub fn begin_preload(&mut self, url: &str) {
        let entry = self.entries.entry(url.to_string()).or_default();
        entry.state = PreloadState::Preloading;
        entry.attempts += 1;
        debug!(url, attempt = entry.attempts, "preload started");
    }

    /// Record the outcome of the in-flight preload and dequeue the next URL
    /// to fetch. `None` means the preload round is complete.
    pub fn finish_preload(&mut self, url: &str, outcome: &PreloadOutcome) -> Option<String> {
        let entry = self.entries.entry(url.to_string()).or_default();
        entry.state = outcome.state();
        debug!(url, state = ?entry.state, "preload finished");
        self.dequeue()
    }

    fn dequeue(&mut self) -> Option<String> {
        while let Some(url) = self.queue.pop_front() {
            // Skip stale queue slots whose state changed since they were queued.
            if self.preload_state(&url) == PreloadState::Queued {
                return Some(url);
            }
        }
        None
    }

    pub fn summary(&self) -> CacheSummary {
        let mut summary = CacheSummary::default();
        for entry in self.entries.values() {
            match entry.state {
                PreloadState::Unset => {}
                PreloadState::Preloading => summary.preloading += 1,
                PreloadState::Queued => summary.queued += 1,
                PreloadState::Ok => summary.ok += 1,
                PreloadState::NoExpiryInfo => summary.no_expiry_info += 1,
                PreloadState::HttpFailed => summary.http_failed += 1,
            }
        }
        summary
    }
}
