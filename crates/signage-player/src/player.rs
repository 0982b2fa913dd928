//! Runs one session after another for as long as the display is on.

use std::sync::Arc;

use anyhow::Context;
use reqwest::Url;
use signage_proto::config::Config;
use signage_proto::feed::ScreenLayout;
use tracing::{info, warn};

use crate::board::Board;
use crate::core::{Session, SessionEnd, SessionSettings};
use crate::render::Renderer;
use crate::transport::Transport;

pub struct Player {
    screen_url: Url,
    settings: SessionSettings,
    transport: Arc<dyn Transport>,
    renderer: Arc<dyn Renderer>,
    board: Arc<Board>,
}

impl Player {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
        board: Arc<Board>,
    ) -> anyhow::Result<Self> {
        let screen_url = Url::parse(&config.player.screen_url)
            .with_context(|| format!("invalid player.screen_url {:?}", config.player.screen_url))?;
        Ok(Self {
            screen_url,
            settings: SessionSettings {
                poll_interval: config.player.poll_interval(),
                max_preload_attempts: config.preload.max_attempts,
            },
            transport,
            renderer,
            board,
        })
    }

    /// Never returns unless a session fails.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            match self.run_once().await? {
                SessionEnd::Reload => info!(url = %self.screen_url, "Player: reloading screen"),
                SessionEnd::Navigate(next) => {
                    info!(from = %self.screen_url, to = %next, "Player: switching screen");
                    self.screen_url = next;
                }
            }
        }
    }

    /// One "page load" of the current screen.
    pub async fn run_once(&self) -> anyhow::Result<SessionEnd> {
        let layout = self.load_layout().await;
        let session = Session::new(
            self.screen_url.clone(),
            &layout,
            Arc::clone(&self.transport),
            Arc::clone(&self.renderer),
            Arc::clone(&self.board),
            self.settings.clone(),
        );
        session.run().await
    }

    async fn load_layout(&self) -> ScreenLayout {
        loop {
            match self.transport.fetch_layout(&self.screen_url).await {
                Ok(layout) => return layout,
                Err(e) => {
                    warn!(
                        url = %self.screen_url,
                        retry_in = ?self.settings.poll_interval,
                        "Player: layout unavailable: {}",
                        e
                    );
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
        }
    }
}
