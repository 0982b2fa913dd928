//! Scripted backend and recording renderer for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Url;
use signage_proto::feed::{ContentFeed, ContentItem, ScreenLayout, StatusData, StatusFeed};

use crate::cache::PreloadOutcome;
use crate::error::{PlayerError, Result};
use crate::render::Renderer;
use crate::transport::Transport;

#[derive(Default)]
pub struct ScriptedTransport {
    layouts: Mutex<HashMap<String, ScreenLayout>>,
    contents: Mutex<HashMap<String, ContentFeed>>,
    statuses: Mutex<VecDeque<StatusFeed>>,
    preloads: Mutex<HashMap<String, PreloadOutcome>>,
    preload_log: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_layout(&self, url: &str, layout: ScreenLayout) {
        self.layouts.lock().unwrap().insert(url.to_string(), layout);
    }

    pub fn set_contents(&self, url: &str, feed: ContentFeed) {
        self.contents.lock().unwrap().insert(url.to_string(), feed);
    }

    /// Queue a status answer. The last one keeps being served.
    pub fn push_status(&self, feed: StatusFeed) {
        self.statuses.lock().unwrap().push_back(feed);
    }

    pub fn set_preload(&self, url: &str, outcome: PreloadOutcome) {
        self.preloads.lock().unwrap().insert(url.to_string(), outcome);
    }

    pub fn preloaded(&self) -> Vec<String> {
        self.preload_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_layout(&self, url: &Url) -> Result<ScreenLayout> {
        self.layouts
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| PlayerError::Status {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            })
    }

    async fn fetch_contents(&self, url: &Url) -> Result<ContentFeed> {
        self.contents
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| PlayerError::Status {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            })
    }

    async fn fetch_status(&self, url: &Url) -> Result<StatusFeed> {
        let mut statuses = self.statuses.lock().unwrap();
        let feed = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        feed.ok_or_else(|| PlayerError::Status {
            url: url.to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        })
    }

    async fn preload(&self, url: &Url) -> PreloadOutcome {
        self.preload_log.lock().unwrap().push(url.to_string());
        self.preloads
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or(PreloadOutcome::Cached)
    }
}

#[derive(Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingRenderer {
    pub fn rendered(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, field_id: &str, markup: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((field_id.to_string(), markup.to_string()));
    }
}

pub fn content_feed(items: Vec<ContentItem>) -> ContentFeed {
    ContentFeed {
        success: true,
        next: items,
        message: None,
    }
}

pub fn text(id: &str, data: &str, secs: f64) -> ContentItem {
    ContentItem {
        id: id.into(),
        data: data.into(),
        duration: secs,
        kind: "Text".into(),
    }
}

pub fn image(id: &str, src: &str, secs: f64) -> ContentItem {
    ContentItem {
        id: id.into(),
        data: format!(r#"<img src="{}">"#, src),
        duration: secs,
        kind: "Image".into(),
    }
}

pub fn status(token: &str, duration: f64, next: Option<&str>) -> StatusFeed {
    StatusFeed {
        success: true,
        data: Some(StatusData {
            last_changes: serde_json::json!(token),
            duration,
            next_screen_url: next.map(str::to_string),
        }),
        message: None,
    }
}
