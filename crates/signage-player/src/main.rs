mod board;
mod cache;
mod content;
mod core;
mod error;
mod field;
mod http;
mod player;
mod render;
mod screen;
mod transport;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use signage_proto::config::Config;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::board::Board;
use crate::player::Player;
use crate::render::BoardRenderer;
use crate::transport::HttpTransport;

/// Keeps recent WARN and ERROR lines on the board for `/api/state`.
struct WarningLayer {
    board: Arc<Board>,
}

impl WarningLayer {
    fn new(board: Arc<Board>) -> Self {
        Self { board }
    }
}

impl<S> tracing_subscriber::Layer<S> for WarningLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut line = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        event.record(&mut MessageVisitor(&mut line));
        self.board.push_warning(line);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The board exists before logging so the warning layer can feed it.
    let board = Arc::new(Board::new());

    let data_dir = signage_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = signage_proto::platform::log_path();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(WarningLayer::new(board.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,signage_player=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let transport = Arc::new(HttpTransport::new(&config.network)?);
    let renderer = Arc::new(BoardRenderer::new(board.clone()));

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            board.clone(),
        );
    }

    let player = Player::new(&config, transport, renderer, board)?;
    info!(screen = %config.player.screen_url, "Player initialised");

    tokio::select! {
        result = player.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;
    use tracing_subscriber::Registry;

    #[test]
    fn test_warning_layer_keeps_only_warnings() {
        let board = Arc::new(Board::new());
        let subscriber = Registry::default().with(WarningLayer::new(board.clone()));

        with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::warn!(field = "1", "feed failed");
            tracing::error!("boom");
        });

        let warnings = board.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("[WARN] feed failed"));
        assert!(warnings[0].contains("field=\"1\""));
        assert!(warnings[1].contains("[ERROR] boom"));
    }
}
