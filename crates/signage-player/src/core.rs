//! Session: single-owner event loop for one screen.
//!
//! A session is the lifetime of one "page": it is built from a screen layout,
//! runs until the screen decides to reload or navigate, and is then torn down
//! entirely. All mutable scheduling state (fields, preload cache, reload
//! deadline) lives in the [`Screen`] owned by this loop; no other task touches
//! it.
//!
//! Everything asynchronous (feed fetches, preloads, display timers, the poll
//! ticker) runs as a spawned task that posts a [`PlayerEvent`] back into the
//! loop when it completes:
//!
//! ```text
//!   spawned fetch / timer ──PlayerEvent──► mpsc ──► Session::run ──► Screen
//!                                                        │
//!                                          board ◄───────┘ snapshot after each event
//! ```
//!
//! Ending the session cancels a shared [`CancellationToken`], so tasks still
//! in flight simply drop their result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use signage_proto::feed::{ContentFeed, ScreenLayout, StatusFeed};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::board::Board;
use crate::cache::PreloadOutcome;
use crate::error::Result;
use crate::render::Renderer;
use crate::screen::Screen;
use crate::transport::Transport;

// ── PlayerEvent ───────────────────────────────────────────────────────────────

/// All inputs into the session loop.
#[derive(Debug)]
pub enum PlayerEvent {
    /// A field content feed answered (or failed).
    ContentsFetched {
        field: usize,
        result: Result<ContentFeed>,
    },
    /// The screen status feed answered (or failed).
    StatusFetched(Result<StatusFeed>),
    /// The in-flight preload completed.
    PreloadFinished { url: String, outcome: PreloadOutcome },
    /// A field's display duration elapsed.
    FieldTimer { field: usize, generation: u64 },
    /// The screen reload deadline was reached.
    ReloadDeadline { generation: u64 },
    /// Fallback poll of every feed.
    PollTick,
    /// Operator asked for a reload through the API.
    ReloadRequested,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Show the same screen again from scratch.
    Reload,
    /// Switch to another screen.
    Navigate(Url),
}

/// Knobs that do not change during a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub max_preload_attempts: u32,
}

// ── SessionContext ────────────────────────────────────────────────────────────

/// Handles the screen needs to start asynchronous work.
#[derive(Clone)]
pub struct SessionContext {
    pub transport: Arc<dyn Transport>,
    pub renderer: Arc<dyn Renderer>,
    event_tx: mpsc::Sender<PlayerEvent>,
    cancel: CancellationToken,
}

impl SessionContext {
    pub fn new(
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
        event_tx: mpsc::Sender<PlayerEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            renderer,
            event_tx,
            cancel,
        }
    }

    /// Run `work` in the background and feed its result into the loop.
    pub fn spawn<F>(&self, work: F) -> AbortHandle
    where
        F: Future<Output = PlayerEvent> + Send + 'static,
    {
        let tx = self.event_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                event = work => {
                    // A closed channel means the session is already over.
                    let _ = tx.send(event).await;
                }
            }
        })
        .abort_handle()
    }

    /// Post `event` once `at` is reached.
    pub fn spawn_at(&self, at: Instant, event: PlayerEvent) -> AbortHandle {
        self.spawn(async move {
            tokio::time::sleep_until(at).await;
            event
        })
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session {
    screen: Screen,
    board: Arc<Board>,
    settings: SessionSettings,
    ctx: SessionContext,
    event_rx: mpsc::Receiver<PlayerEvent>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        page: Url,
        layout: &ScreenLayout,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
        board: Arc<Board>,
        settings: SessionSettings,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(256);
        let cancel = CancellationToken::new();
        let ctx = SessionContext::new(transport, renderer, event_tx, cancel.clone());
        let screen = Screen::new(page, layout, ctx.clone(), settings.max_preload_attempts);

        board.reset(screen.fields().iter().map(|f| f.id.clone()));

        Self {
            screen,
            board,
            settings,
            ctx,
            event_rx,
            cancel,
        }
    }

    /// Run until the screen reloads or navigates.
    pub async fn run(mut self) -> anyhow::Result<SessionEnd> {
        info!(
            url = %self.screen.url(),
            fields = self.screen.fields().len(),
            "Session: starting"
        );

        self.screen.start();
        if self.screen.polls_status() || self.screen.fields().iter().any(|f| f.can_update()) {
            self.start_ticker();
        }

        let end = loop {
            self.board.publish(self.screen.snapshot(Instant::now()));
            if let Some(end) = self.screen.finished() {
                break end.clone();
            }

            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => anyhow::bail!("session event channel closed"),
                },
                _ = self.board.reload_requested() => {
                    self.handle_event(PlayerEvent::ReloadRequested);
                }
            }
        };

        info!(?end, cache = ?self.screen.cache().summary(), "Session: finished");
        self.cancel.cancel();
        Ok(end)
    }

    fn start_ticker(&self) {
        let tx = self.ctx.event_tx.clone();
        let cancel = self.cancel.clone();
        let period = self.settings.poll_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(PlayerEvent::PollTick).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub fn handle_event(&mut self, event: PlayerEvent) {
        let now = Instant::now();
        match event {
            PlayerEvent::ContentsFetched { field, result } => {
                self.screen.on_contents_fetched(field, result, now);
            }
            PlayerEvent::StatusFetched(result) => {
                self.screen.on_status(result, now);
            }
            PlayerEvent::PreloadFinished { url, outcome } => {
                self.screen.on_preload_finished(&url, outcome, now);
            }
            PlayerEvent::FieldTimer { field, generation } => {
                self.screen.on_field_timer(field, generation, now);
            }
            PlayerEvent::ReloadDeadline { generation } => {
                self.screen.on_deadline(generation, now);
            }
            PlayerEvent::PollTick => {
                debug!("Session: poll tick");
                self.screen.poll();
            }
            PlayerEvent::ReloadRequested => {
                warn!("Session: reload requested by operator");
                self.screen.schedule_reload(Duration::ZERO, now);
            }
        }
    }
}
