//! One content slot of the screen and its pick rules.
//!
//! A field cycles `idle → displaying → picking → displaying | stuck`. The
//! scheduling side (timers, rendering, reload checks) lives in
//! [`crate::screen::Screen`]; this module owns the pool and decides *what*
//! comes next.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Url;
use signage_proto::feed::{ContentItem, FieldLayout};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::warn;

use crate::cache::ResourceCache;
use crate::content::Content;

/// Pools smaller than this may repeat the previous item.
const MIN_POOL_WITHOUT_REPEAT: usize = 2;
/// Pools smaller than this may show what another field already shows.
const MIN_POOL_WITHOUT_DUPLICATE: usize = 3;

/// Pending "pick next" timer of a field. Dropping it cancels the timer.
#[derive(Debug)]
pub struct FieldTimer {
    handle: AbortHandle,
    generation: u64,
}

impl FieldTimer {
    pub fn new(handle: AbortHandle, generation: u64) -> Self {
        Self { handle, generation }
    }
}

impl Drop for FieldTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Screen-wide facts a pick depends on.
pub struct PickContext<'a> {
    pub now: Instant,
    pub deadline: Option<Instant>,
    pub cache: &'a ResourceCache,
    /// Content currently shown by the other fields.
    pub on_screen: &'a [Arc<Content>],
}

impl PickContext<'_> {
    fn shown_elsewhere(&self, data: &str) -> bool {
        self.on_screen.iter().any(|c| c.data == data)
    }
}

#[derive(Debug)]
pub struct Field {
    pub id: String,
    feed_url: Option<Url>,
    pub accepted_types: Vec<String>,
    contents: Vec<Arc<Content>>,
    pub previous: Option<Arc<Content>>,
    pub current: Option<Arc<Content>>,
    pub next: Option<Arc<Content>>,
    timer: Option<FieldTimer>,
    pub display_until: Option<Instant>,
    pub stuck: bool,
}

impl Field {
    pub fn new(id: String, feed_url: Option<Url>, accepted_types: Vec<String>) -> Self {
        Self {
            id,
            feed_url,
            accepted_types,
            contents: Vec::new(),
            previous: None,
            current: None,
            next: None,
            timer: None,
            display_until: None,
            stuck: false,
        }
    }

    /// Build from a layout entry, resolving the feed URL against the screen page.
    pub fn from_layout(layout: &FieldLayout, page: &Url) -> Self {
        let feed_url = layout
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .and_then(|u| match page.join(u) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(field = %layout.id, url = u, "invalid field feed url: {}", e);
                    None
                }
            });
        Self::new(layout.id.clone(), feed_url, layout.types.clone())
    }

    /// Fields without a feed never receive new content.
    pub fn can_update(&self) -> bool {
        self.feed_url.is_some()
    }

    pub fn feed_url(&self) -> Option<&Url> {
        self.feed_url.as_ref()
    }

    pub fn contents(&self) -> &[Arc<Content>] {
        &self.contents
    }

    /// Replace the pool wholesale with a fetched batch.
    pub fn replace_contents(&mut self, items: &[ContentItem], origin: &Url) {
        self.contents = items
            .iter()
            .map(|item| {
                let content = Content::new(item, Some(origin));
                if !content.is_playable() {
                    warn!(
                        field = %self.id,
                        content = %content.id,
                        duration_ms = content.duration_ms(),
                        "content has a non-positive duration and will never be shown"
                    );
                }
                Arc::new(content)
            })
            .collect();
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn timer_generation(&self) -> Option<u64> {
        self.timer.as_ref().map(|t| t.generation)
    }

    /// Install a timer, cancelling the previous one first.
    pub fn set_timer(&mut self, timer: FieldTimer) {
        self.cancel_timer();
        self.timer = Some(timer);
    }

    pub fn cancel_timer(&mut self) {
        self.timer = None;
    }

    /// True while the current content is on screen past `instant`.
    pub fn displays_past(&self, instant: Instant) -> Option<Instant> {
        match (self.has_timer(), self.display_until) {
            (true, Some(until)) if until > instant => Some(until),
            _ => None,
        }
    }

    pub fn displays(&self, data: &str) -> bool {
        self.current.as_ref().map(|c| c.data == data).unwrap_or(false)
    }

    /// Move `current` to `previous` ahead of a new pick.
    pub fn retire_current(&mut self) {
        self.previous = self.current.take();
        self.display_until = None;
    }

    /// Pick the next content: first under the repeat/duplicate rules, then,
    /// failing that, anything that can be displayed at all.
    pub fn choose<R: Rng + ?Sized>(
        &mut self,
        ctx: &PickContext<'_>,
        rng: &mut R,
    ) -> Option<Arc<Content>> {
        let previous_data = self.previous.as_ref().map(|c| c.data.clone());
        self.pick_random_content(previous_data.as_deref(), false, ctx, rng)
            .or_else(|| self.pick_random_content(previous_data.as_deref(), true, ctx, rng))
    }

    fn pick_random_content<R: Rng + ?Sized>(
        &mut self,
        previous_data: Option<&str>,
        any_usable: bool,
        ctx: &PickContext<'_>,
        rng: &mut R,
    ) -> Option<Arc<Content>> {
        self.contents.shuffle(rng);
        let pool = self.contents.len();

        for content in &self.contents {
            if !content.is_playable() || !content.can_display(ctx.now, ctx.deadline, ctx.cache) {
                continue;
            }
            if any_usable {
                return Some(Arc::clone(content));
            }
            if previous_data == Some(content.data.as_str()) {
                if pool < MIN_POOL_WITHOUT_REPEAT {
                    return Some(Arc::clone(content));
                }
                continue;
            }
            if ctx.shown_elsewhere(&content.data) {
                if pool < MIN_POOL_WITHOUT_DUPLICATE {
                    return Some(Arc::clone(content));
                }
                continue;
            }
            return Some(Arc::clone(content));
        }
        None
    }
}
