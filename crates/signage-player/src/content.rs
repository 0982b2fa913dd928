//! Playable content items and the checks that decide whether one can go on
//! screen now: readiness of its remote resource and fit before the reload
//! deadline.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use signage_proto::feed::ContentItem;
use signage_proto::media::MediaType;
use tokio::time::Instant;

use crate::cache::ResourceCache;

/// One playable item of a field's pool. Immutable once built; a fetch
/// replaces the whole pool.
#[derive(Debug)]
pub struct Content {
    pub id: String,
    pub data: String,
    duration_ms: i64,
    pub media_type: MediaType,
    /// Page the content is shown on; root-relative references resolve against it.
    origin: Option<Url>,
    resource: OnceLock<Option<String>>,
}

fn src_attribute() -> &'static Regex {
    static SRC: OnceLock<Regex> = OnceLock::new();
    SRC.get_or_init(|| Regex::new(r#"src="([^"]+)""#).expect("src pattern is valid"))
}

impl Content {
    pub fn new(item: &ContentItem, origin: Option<&Url>) -> Self {
        Self {
            id: item.id.clone(),
            data: item.data.clone(),
            duration_ms: item.duration_ms(),
            media_type: MediaType::from_tag(&item.kind),
            origin: origin.cloned(),
            resource: OnceLock::new(),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    /// Zero for malformed (non-positive) durations.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.max(0) as u64)
    }

    /// Content with a non-positive duration is never put on screen.
    pub fn is_playable(&self) -> bool {
        self.duration_ms > 0
    }

    /// Absolute URL of the first `src="..."` reference in the markup.
    pub fn resource_url(&self) -> Option<&str> {
        self.resource
            .get_or_init(|| extract_resource(&self.data, self.origin.as_ref()))
            .as_deref()
    }

    pub fn is_preloadable(&self) -> bool {
        self.media_type.is_preloadable() && self.resource_url().is_some()
    }

    pub fn is_ready(&self, cache: &ResourceCache) -> bool {
        if !self.is_preloadable() {
            return true;
        }
        self.resource_url().map(|url| cache.is_ready(url)).unwrap_or(true)
    }

    /// Ready, and short enough to end before a pending screen reload.
    pub fn can_display(
        &self,
        now: Instant,
        deadline: Option<Instant>,
        cache: &ResourceCache,
    ) -> bool {
        let fits = match deadline {
            Some(deadline) => now + self.duration() < deadline,
            None => true,
        };
        fits && self.is_ready(cache)
    }

    /// The URL a freshly built content should preload, if any.
    pub fn preload_candidate(&self, cache: &ResourceCache) -> Option<&str> {
        if !self.is_preloadable() {
            return None;
        }
        self.resource_url().filter(|url| cache.needs_preload(url))
    }
}

fn extract_resource(data: &str, origin: Option<&Url>) -> Option<String> {
    let src = src_attribute().captures(data)?.get(1)?.as_str();
    let mut url = if src.starts_with('/') {
        origin?.join(src).ok()?
    } else {
        Url::parse(src).ok()?
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}
