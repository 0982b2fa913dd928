//! Screen-level scheduling: picks per field, preloads, and the reload deadline.
//!
//! The screen owns every field and the preload cache. It is driven by the
//! session loop, one event at a time, and never blocks: each method takes the
//! current instant and either updates state, renders, or spawns background
//! work whose result comes back as a [`PlayerEvent`].
//!
//! # Reload deadline
//!
//! The deadline only ever moves sooner. A rotation request later than the
//! pending deadline is ignored; an earlier one is adopted and then pushed out
//! to the end of any content still on screen, so a reload never truncates
//! what is showing. A remote configuration change resets the deadline to
//! "now" regardless of what was pending.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Url;
use signage_proto::feed::{ContentFeed, ScreenLayout, StatusFeed, GENERIC_ERROR};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::board::{FieldSnapshot, ScreenSnapshot};
use crate::cache::{PreloadOutcome, PreloadRequest, ResourceCache};
use crate::content::Content;
use crate::core::{PlayerEvent, SessionContext, SessionEnd};
use crate::error::{PlayerError, Result};
use crate::field::{Field, FieldTimer, PickContext};
use crate::transport::resolve_url;

pub struct Screen {
    url: Url,
    status_url: Option<Url>,
    fields: Vec<Field>,
    cache: ResourceCache,
    last_change_token: Option<serde_json::Value>,
    reload_deadline: Option<Instant>,
    deadline_timer: Option<AbortHandle>,
    deadline_generation: u64,
    next_url: Option<Url>,
    finished: Option<SessionEnd>,
    timer_generation: u64,
    rng: StdRng,
    ctx: SessionContext,
}

impl Screen {
    pub fn new(url: Url, layout: &ScreenLayout, ctx: SessionContext, max_preload_attempts: u32) -> Self {
        let status_url = layout
            .status_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .and_then(|u| match resolve_url(&url, u) {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    warn!("Screen: status polling disabled: {}", e);
                    None
                }
            });
        let fields = layout
            .fields
            .iter()
            .map(|f| Field::from_layout(f, &url))
            .collect();

        Self {
            url,
            status_url,
            fields,
            cache: ResourceCache::new(max_preload_attempts),
            last_change_token: None,
            reload_deadline: None,
            deadline_timer: None,
            deadline_generation: 0,
            next_url: None,
            finished: None,
            timer_generation: 0,
            rng: StdRng::from_entropy(),
            ctx,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn polls_status(&self) -> bool {
        self.status_url.is_some()
    }

    /// Set once the screen has decided to reload or navigate.
    pub fn finished(&self) -> Option<&SessionEnd> {
        self.finished.as_ref()
    }

    /// Initial fetch of every feed.
    pub fn start(&mut self) {
        self.poll();
    }

    /// Re-fetch every field and re-check the status feed.
    pub fn poll(&mut self) {
        for idx in 0..self.fields.len() {
            self.fetch_contents(idx);
        }
        self.check_updates();
    }

    // ── Field feeds ───────────────────────────────────────────────────────────

    pub fn fetch_contents(&mut self, idx: usize) {
        let Some(url) = self.fields[idx].feed_url().cloned() else {
            return;
        };
        let transport = Arc::clone(&self.ctx.transport);
        self.ctx.spawn(async move {
            let result = transport.fetch_contents(&url).await;
            PlayerEvent::ContentsFetched { field: idx, result }
        });
    }

    pub fn on_contents_fetched(&mut self, idx: usize, result: Result<ContentFeed>, now: Instant) {
        if idx >= self.fields.len() {
            return;
        }
        match result {
            Ok(feed) if feed.success => {
                debug!(field = %self.fields[idx].id, items = feed.next.len(), "Screen: new contents");
                self.fields[idx].replace_contents(&feed.next, &self.url);
                let wanted: Vec<String> = self.fields[idx]
                    .contents()
                    .iter()
                    .filter_map(|c| c.preload_candidate(&self.cache).map(str::to_string))
                    .collect();
                for url in wanted {
                    self.request_preload(&url);
                }
                self.pick_next_if_necessary(idx, now);
            }
            Ok(feed) => {
                let message = feed.message.as_deref().unwrap_or(GENERIC_ERROR);
                warn!(field = %self.fields[idx].id, "Screen: content feed rejected: {}", message);
                self.set_error(idx, message);
            }
            Err(e) => {
                warn!(field = %self.fields[idx].id, "Screen: content feed failed: {}", e);
                if self.fields[idx].current.is_none() {
                    self.set_error(idx, &e.to_string());
                }
            }
        }
    }

    fn set_error(&self, idx: usize, message: &str) {
        self.ctx.renderer.render(&self.fields[idx].id, message);
    }

    // ── Picking ───────────────────────────────────────────────────────────────

    /// Pick only when nothing is scheduled on the field.
    pub fn pick_next_if_necessary(&mut self, idx: usize, now: Instant) {
        let field = &self.fields[idx];
        if !field.has_timer() && !field.contents().is_empty() {
            self.pick_next(idx, now);
        }
    }

    pub fn pick_next(&mut self, idx: usize, now: Instant) {
        if self.finished.is_some() {
            return;
        }
        if self.reload_deadline.is_some_and(|d| now >= d) {
            // Past the threshold: reload instead of starting anything new.
            self.reload_now();
            return;
        }

        self.fields[idx].retire_current();
        let on_screen: Vec<Arc<Content>> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .filter_map(|(_, f)| f.current.clone())
            .collect();
        let ctx = PickContext {
            now,
            deadline: self.reload_deadline,
            cache: &self.cache,
            on_screen: &on_screen,
        };
        let picked = self.fields[idx].choose(&ctx, &mut self.rng);

        match picked {
            Some(content) => {
                self.fields[idx].next = Some(content);
                self.display_next(idx, now);
                self.fields[idx].stuck = false;
            }
            None => {
                let field = &mut self.fields[idx];
                debug!(field = %field.id, pool = field.contents().len(), "Screen: field is stuck");
                field.stuck = true;
                if self.is_all_fields_stuck() && !self.cache.has_active_preload(true) {
                    info!("Screen: nothing left to display anywhere, reloading");
                    self.reload_now();
                }
            }
        }
    }

    pub fn display_next(&mut self, idx: usize, now: Instant) {
        let Some(next) = self.fields[idx].next.take() else {
            return;
        };
        if !next.is_playable() {
            debug!(field = %self.fields[idx].id, content = %next.id, "Screen: skipping content without duration");
            return;
        }
        if self.displays_data(&next.data) {
            debug!(field = %self.fields[idx].id, content = %next.id, "Screen: small pool, showing a duplicate");
        }

        let field = &mut self.fields[idx];
        let until = now + next.duration();
        self.ctx.renderer.render(&field.id, &next.data);
        debug!(field = %field.id, content = %next.id, ms = next.duration_ms(), "Screen: displaying");
        field.current = Some(next);
        field.display_until = Some(until);

        self.timer_generation += 1;
        let generation = self.timer_generation;
        let handle = self
            .ctx
            .spawn_at(until, PlayerEvent::FieldTimer { field: idx, generation });
        field.set_timer(FieldTimer::new(handle, generation));
    }

    pub fn on_field_timer(&mut self, idx: usize, generation: u64, now: Instant) {
        let Some(field) = self.fields.get_mut(idx) else {
            return;
        };
        if field.timer_generation() != Some(generation) {
            debug!(field = %field.id, generation, "Screen: stale field timer ignored");
            return;
        }
        field.cancel_timer();
        self.pick_next(idx, now);
    }

    /// Let every idle field try again, e.g. after a resource finished loading.
    pub fn new_content_trigger(&mut self, now: Instant) {
        for idx in 0..self.fields.len() {
            if self.finished.is_some() {
                return;
            }
            self.pick_next_if_necessary(idx, now);
        }
    }

    pub fn is_all_fields_stuck(&self) -> bool {
        self.fields.iter().filter(|f| f.can_update()).all(|f| f.stuck)
    }

    pub fn displays_data(&self, data: &str) -> bool {
        self.fields.iter().any(|f| f.displays(data))
    }

    // ── Preloading ────────────────────────────────────────────────────────────

    pub fn request_preload(&mut self, url: &str) {
        match self.cache.request_preload(url) {
            PreloadRequest::Start => self.spawn_preload(url),
            PreloadRequest::Queued => debug!(url, "Screen: preload queued"),
            PreloadRequest::Skipped => {}
        }
    }

    fn start_preload(&mut self, url: &str) {
        self.cache.begin_preload(url);
        self.spawn_preload(url);
    }

    fn spawn_preload(&self, url: &str) {
        let key = url.to_string();
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Cannot happen for URLs produced by `Content`, but keep the queue moving.
                let outcome = PreloadOutcome::Failed(e.to_string());
                self.ctx
                    .spawn(async move { PlayerEvent::PreloadFinished { url: key, outcome } });
                return;
            }
        };
        let transport = Arc::clone(&self.ctx.transport);
        self.ctx.spawn(async move {
            let outcome = transport.preload(&parsed).await;
            PlayerEvent::PreloadFinished { url: key, outcome }
        });
    }

    pub fn on_preload_finished(&mut self, url: &str, outcome: PreloadOutcome, now: Instant) {
        let success = outcome.is_success();
        let next = self.cache.finish_preload(url, &outcome);
        if success {
            self.new_content_trigger(now);
        }
        match next {
            Some(next) => self.start_preload(&next),
            None => self.on_preload_round_complete(now),
        }
        self.maybe_reload_due(now);
    }

    pub fn on_preload_round_complete(&mut self, now: Instant) {
        debug!(summary = ?self.cache.summary(), "Screen: preload round complete");
        self.new_content_trigger(now);
        self.check_updates();
    }

    // ── Status feed & reload ──────────────────────────────────────────────────

    pub fn check_updates(&mut self) {
        if self.finished.is_some() {
            return;
        }
        let Some(url) = self.status_url.clone() else {
            return;
        };
        let transport = Arc::clone(&self.ctx.transport);
        self.ctx.spawn(async move {
            PlayerEvent::StatusFetched(transport.fetch_status(&url).await)
        });
    }

    pub fn on_status(&mut self, result: Result<StatusFeed>, now: Instant) {
        let feed = match result {
            Ok(feed) => feed,
            Err(PlayerError::Unauthorized) => return self.on_unauthorized(),
            Err(e) => {
                warn!("Screen: status feed failed: {}", e);
                return;
            }
        };
        if feed.is_unauthorized() {
            return self.on_unauthorized();
        }
        if !feed.success {
            warn!(
                "Screen: status feed rejected: {}",
                feed.message.as_deref().unwrap_or(GENERIC_ERROR)
            );
            return;
        }

        let data = feed.data.unwrap_or_default();
        match &self.last_change_token {
            None => self.last_change_token = Some(data.last_changes.clone()),
            Some(token) if *token != data.last_changes => {
                info!(old = %token, new = %data.last_changes, "Screen: remote configuration changed");
                self.last_change_token = Some(data.last_changes.clone());
                self.next_url = None;
                self.reset_reload(now);
                return;
            }
            Some(_) => {}
        }

        if data.duration.is_finite() && data.duration > 0.0 {
            let Ok(delay) = Duration::try_from_secs_f64(data.duration) else {
                warn!(duration = data.duration, "Screen: rotation duration out of range, ignored");
                return;
            };
            self.next_url = data
                .next_screen_url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .and_then(|u| match resolve_url(&self.url, u) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        warn!("Screen: ignoring next screen: {}", e);
                        None
                    }
                });
            self.schedule_reload(delay, now);
        }
    }

    fn on_unauthorized(&mut self) {
        warn!("Screen: session unauthorized, reloading");
        self.next_url = None;
        self.reload_now();
    }

    /// Ask for a reload no sooner than `min_delay` from `now`.
    pub fn schedule_reload(&mut self, min_delay: Duration, now: Instant) {
        let Some(candidate) = now.checked_add(min_delay) else {
            warn!(?min_delay, "Screen: reload delay out of range, ignored");
            return;
        };
        if self.reload_deadline.is_some_and(|d| d < candidate) {
            debug!("Screen: reload already due sooner");
            return;
        }
        if self.cache.has_active_preload(false) {
            debug!("Screen: preload in flight, reload request dropped");
            return;
        }
        self.adopt_deadline(candidate, now);
        self.maybe_reload_due(now);
    }

    /// Remote change: reload as soon as the screen allows, whatever was pending.
    fn reset_reload(&mut self, now: Instant) {
        self.adopt_deadline(now, now);
        self.maybe_reload_due(now);
    }

    fn adopt_deadline(&mut self, candidate: Instant, now: Instant) {
        // Never cut content that is already on screen.
        let deadline = self
            .fields
            .iter()
            .filter_map(|f| f.displays_past(candidate))
            .fold(candidate, Instant::max);
        debug!(in_ms = deadline.saturating_duration_since(now).as_millis() as u64, "Screen: reload scheduled");
        self.reload_deadline = Some(deadline);
        self.arm_deadline_timer(deadline);
    }

    fn arm_deadline_timer(&mut self, deadline: Instant) {
        if let Some(old) = self.deadline_timer.take() {
            old.abort();
        }
        self.deadline_generation += 1;
        let generation = self.deadline_generation;
        self.deadline_timer = Some(
            self.ctx
                .spawn_at(deadline, PlayerEvent::ReloadDeadline { generation }),
        );
    }

    pub fn on_deadline(&mut self, generation: u64, now: Instant) {
        if generation != self.deadline_generation {
            return;
        }
        self.maybe_reload_due(now);
    }

    /// Fire a due reload unless a preload is still running; its completion
    /// checks again.
    fn maybe_reload_due(&mut self, now: Instant) {
        if self.reload_deadline.is_some_and(|d| now >= d) && !self.cache.has_active_preload(false) {
            self.reload_now();
        }
    }

    pub fn reload_now(&mut self) {
        if self.finished.is_some() {
            return;
        }
        let end = match self.next_url.take() {
            Some(url) => SessionEnd::Navigate(url),
            None => SessionEnd::Reload,
        };
        info!(?end, "Screen: reloading");
        self.finished = Some(end);
        if let Some(timer) = self.deadline_timer.take() {
            timer.abort();
        }
        for field in &mut self.fields {
            field.cancel_timer();
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn snapshot(&self, now: Instant) -> ScreenSnapshot {
        let remaining = |at: Instant| at.saturating_duration_since(now).as_millis() as u64;
        ScreenSnapshot {
            screen_url: self.url.to_string(),
            reload_in_ms: self.reload_deadline.map(remaining),
            next_url: self.next_url.as_ref().map(Url::to_string),
            fields: self
                .fields
                .iter()
                .map(|f| FieldSnapshot {
                    id: f.id.clone(),
                    can_update: f.can_update(),
                    stuck: f.stuck,
                    pool_size: f.contents().len(),
                    types: f.accepted_types.clone(),
                    current_id: f.current.as_ref().map(|c| c.id.clone()),
                    current_media: f.current.as_ref().map(|c| c.media_type),
                    remaining_ms: f.display_until.filter(|_| f.has_timer()).map(remaining),
                })
                .collect(),
            cache: self.cache.summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{content_feed, image, status, text, RecordingRenderer, ScriptedTransport};
    use signage_proto::feed::FieldLayout;
    use signage_proto::media::MediaType;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        screen: Screen,
        renderer: Arc<RecordingRenderer>,
        _rx: mpsc::Receiver<PlayerEvent>,
    }

    fn page() -> Url {
        Url::parse("https://signage.example/frontend/screen?id=1").unwrap()
    }

    fn harness(fields: &[(&str, bool)]) -> Harness {
        let layout = ScreenLayout {
            status_url: Some("/frontend/update?id=1".into()),
            fields: fields
                .iter()
                .map(|(id, feed)| FieldLayout {
                    id: id.to_string(),
                    url: feed.then(|| format!("/frontend/next?fieldid={}", id)),
                    types: vec![],
                })
                .collect(),
        };
        let (tx, rx) = mpsc::channel(256);
        let renderer = Arc::new(RecordingRenderer::default());
        let ctx = SessionContext::new(
            Arc::new(ScriptedTransport::new()),
            renderer.clone(),
            tx,
            CancellationToken::new(),
        );
        let mut screen = Screen::new(page(), &layout, ctx, 1);
        screen.rng = StdRng::seed_from_u64(11);
        Harness {
            screen,
            renderer,
            _rx: rx,
        }
    }

    fn feed(screen: &mut Screen, idx: usize, feed: ContentFeed, now: Instant) {
        screen.on_contents_fetched(idx, Ok(feed), now);
    }

    fn current(screen: &Screen, idx: usize) -> Option<String> {
        screen.fields()[idx].current.as_ref().map(|c| c.data.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_content_displays_immediately() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("a", "A", 5.0)]), now);

        assert_eq!(current(&h.screen, 0).as_deref(), Some("A"));
        assert!(h.screen.fields()[0].has_timer());
        assert_eq!(h.screen.fields()[0].display_until, Some(now + Duration::from_secs(5)));
        assert_eq!(h.renderer.rendered(), vec![("1".to_string(), "A".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_waits_for_preload() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![image("a", "/uploads/a.png", 5.0)]), now);

        let url = "https://signage.example/uploads/a.png";
        assert!(current(&h.screen, 0).is_none());
        assert!(h.screen.fields()[0].stuck);
        // stuck, but a preload is in flight: no reload
        assert!(h.screen.finished().is_none());
        assert_eq!(h.screen.cache().preload_state(url), crate::cache::PreloadState::Preloading);

        h.screen.on_preload_finished(url, PreloadOutcome::Cached, now);
        assert_eq!(h.screen.fields()[0].current.as_ref().unwrap().id, "a");
        assert!(!h.screen.fields()[0].stuck);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_field_avoids_duplicate() {
        let mut h = harness(&[("1", true), ("2", true)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("x", "X", 5.0)]), now);
        assert_eq!(current(&h.screen, 0).as_deref(), Some("X"));

        feed(
            &mut h.screen,
            1,
            content_feed(vec![text("x", "X", 5.0), text("y", "Y", 5.0), text("z", "Z", 5.0)]),
            now,
        );
        assert_ne!(current(&h.screen, 1).as_deref(), Some("X"));
        assert!(h.screen.displays_data("X"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_duplicate_across_many_rounds() {
        let mut h = harness(&[("1", true), ("2", true)]);
        let pool = || {
            content_feed(vec![
                text("a", "A", 5.0),
                text("b", "B", 5.0),
                text("c", "C", 5.0),
                text("d", "D", 5.0),
            ])
        };
        let mut now = Instant::now();
        feed(&mut h.screen, 0, pool(), now);
        feed(&mut h.screen, 1, pool(), now);
        for round in 0..50 {
            now += Duration::from_secs(5);
            let idx = round % 2;
            let generation = h.screen.fields()[idx].timer_generation().unwrap();
            h.screen.on_field_timer(idx, generation, now);
            assert_ne!(current(&h.screen, 0), current(&h.screen, 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_waits_for_displayed_content() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("a", "A", 45.0)]), now);

        h.screen.schedule_reload(Duration::from_secs(30), now);
        assert_eq!(h.screen.reload_deadline, Some(now + Duration::from_secs(45)));
        assert!(h.screen.finished().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_only_tightens() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.schedule_reload(Duration::from_secs(10), now);
        h.screen.schedule_reload(Duration::from_secs(30), now);
        assert_eq!(h.screen.reload_deadline, Some(now + Duration::from_secs(10)));

        h.screen.schedule_reload(Duration::from_secs(5), now);
        assert_eq!(h.screen.reload_deadline, Some(now + Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_in_flight_drops_schedule() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.request_preload("https://cdn.example/v.mp4");
        h.screen.schedule_reload(Duration::ZERO, now);
        assert_eq!(h.screen.reload_deadline, None);
        assert!(h.screen.finished().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_longer_than_deadline_is_not_started() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.schedule_reload(Duration::from_secs(20), now);
        feed(
            &mut h.screen,
            0,
            content_feed(vec![text("long", "L", 30.0), text("short", "S", 10.0)]),
            now,
        );
        assert_eq!(current(&h.screen, 0).as_deref(), Some("S"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_status_records_token() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.on_status(Ok(status("t1", 0.0, None)), now);
        assert_eq!(h.screen.last_change_token, Some(serde_json::json!("t1")));
        assert_eq!(h.screen.reload_deadline, None);
        assert!(h.screen.finished().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_records_next_screen() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.on_status(Ok(status("t1", 30.0, Some("/frontend/screen?id=2"))), now);
        assert_eq!(h.screen.reload_deadline, Some(now + Duration::from_secs(30)));
        assert_eq!(
            h.screen.next_url.as_ref().map(Url::as_str),
            Some("https://signage.example/frontend/screen?id=2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_rotation_duration_is_ignored() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("a", "A", 5.0)]), now);

        // beyond what a Duration can hold
        h.screen.on_status(Ok(status("t1", 1e20, Some("/frontend/screen?id=2"))), now);
        assert_eq!(h.screen.reload_deadline, None);
        assert!(h.screen.next_url.is_none());

        // fits a Duration, but not an Instant
        h.screen.on_status(Ok(status("t1", 1e19, None)), now);
        assert_eq!(h.screen.reload_deadline, None);
        assert!(h.screen.finished().is_none());

        // a sane rotation still works afterwards
        h.screen.on_status(Ok(status("t1", 30.0, None)), now);
        assert_eq!(h.screen.reload_deadline, Some(now + Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_reload_with_overflowing_delay() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.schedule_reload(Duration::MAX, now);
        assert_eq!(h.screen.reload_deadline, None);
        assert!(h.screen.finished().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_change_resets_deadline_and_target() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.on_status(Ok(status("t1", 100.0, Some("/frontend/screen?id=2"))), now);
        assert_eq!(h.screen.reload_deadline, Some(now + Duration::from_secs(100)));

        let later = now + Duration::from_secs(1);
        h.screen.on_status(Ok(status("t2", 100.0, Some("/frontend/screen?id=2"))), later);
        assert_eq!(h.screen.reload_deadline, Some(later));
        assert_eq!(h.screen.finished(), Some(&SessionEnd::Reload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_change_waits_for_preload() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.on_status(Ok(status("t1", 0.0, None)), now);
        h.screen.request_preload("https://cdn.example/v.mp4");

        h.screen.on_status(Ok(status("t2", 0.0, None)), now);
        assert_eq!(h.screen.reload_deadline, Some(now));
        assert!(h.screen.finished().is_none());

        h.screen
            .on_preload_finished("https://cdn.example/v.mp4", PreloadOutcome::NoExpiryInfo, now);
        assert_eq!(h.screen.finished(), Some(&SessionEnd::Reload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_reloads_same_page() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        h.screen.on_status(Ok(status("t1", 30.0, Some("/frontend/screen?id=2"))), now);

        let denied = StatusFeed {
            success: false,
            data: None,
            message: Some("Unauthorized".into()),
        };
        h.screen.on_status(Ok(denied), now);
        assert_eq!(h.screen.finished(), Some(&SessionEnd::Reload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_unauthorized_reloads() {
        let mut h = harness(&[("1", true)]);
        h.screen.on_status(Err(PlayerError::Unauthorized), Instant::now());
        assert_eq!(h.screen.finished(), Some(&SessionEnd::Reload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_fields_stuck_reloads() {
        let mut h = harness(&[("1", true), ("2", true), ("static", false)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("z", "Z", 0.0)]), now);
        assert!(h.screen.fields()[0].stuck);
        assert!(h.screen.finished().is_none());

        feed(&mut h.screen, 1, content_feed(vec![text("n", "N", -5.0)]), now);
        // the feedless field does not keep the screen alive
        assert!(h.screen.is_all_fields_stuck());
        assert_eq!(h.screen.finished(), Some(&SessionEnd::Reload));
        assert!(h.renderer.rendered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_deadline_reloads_on_pick() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("a", "A", 5.0), text("b", "B", 5.0)]), now);
        h.screen
            .on_status(Ok(status("t1", 2.0, Some("https://other.example/screen"))), now);
        assert_eq!(h.screen.reload_deadline, Some(now + Duration::from_secs(5)));

        let generation = h.screen.fields()[0].timer_generation().unwrap();
        h.screen.on_field_timer(0, generation, now + Duration::from_secs(5));
        assert_eq!(
            h.screen.finished(),
            Some(&SessionEnd::Navigate(Url::parse("https://other.example/screen").unwrap()))
        );
        assert_eq!(h.renderer.rendered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_is_ignored() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("a", "A", 5.0), text("b", "B", 5.0)]), now);
        let generation = h.screen.fields()[0].timer_generation().unwrap();

        h.screen.on_field_timer(0, generation + 7, now + Duration::from_secs(5));
        assert_eq!(h.renderer.rendered().len(), 1);

        h.screen.on_field_timer(0, generation, now + Duration::from_secs(5));
        assert_eq!(h.renderer.rendered().len(), 2);
        assert_ne!(h.renderer.rendered()[0].1, h.renderer.rendered()[1].1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_errors_are_rendered() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        let rejected = ContentFeed {
            success: false,
            next: vec![],
            message: Some("Flow disabled".into()),
        };
        feed(&mut h.screen, 0, rejected, now);
        let anonymous = ContentFeed {
            success: false,
            next: vec![],
            message: None,
        };
        feed(&mut h.screen, 0, anonymous, now);

        let rendered = h.renderer.rendered();
        assert_eq!(rendered[0].1, "Flow disabled");
        assert_eq!(rendered[1].1, GENERIC_ERROR);
        assert!(h.screen.finished().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_keeps_current_content() {
        let mut h = harness(&[("1", true)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("a", "A", 5.0)]), now);
        let err = PlayerError::InvalidUrl {
            url: "x".into(),
            reason: "test".into(),
        };
        h.screen.on_contents_fetched(0, Err(err), now);
        assert_eq!(h.renderer.rendered().len(), 1);
        assert_eq!(current(&h.screen, 0).as_deref(), Some("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_fields() {
        let mut h = harness(&[("1", true), ("static", false)]);
        let now = Instant::now();
        feed(&mut h.screen, 0, content_feed(vec![text("a", "A", 5.0)]), now);
        let snapshot = h.screen.snapshot(now + Duration::from_secs(2));
        assert_eq!(snapshot.fields.len(), 2);
        assert_eq!(snapshot.fields[0].current_id.as_deref(), Some("a"));
        assert_eq!(snapshot.fields[0].remaining_ms, Some(3_000));
        assert_eq!(snapshot.fields[0].current_media, Some(MediaType::Other));
        assert!(!snapshot.fields[1].can_update);
        assert_eq!(snapshot.reload_in_ms, None);
    }
}
