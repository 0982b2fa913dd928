use std::sync::Arc;

use tracing::debug;

use crate::board::Board;

/// Puts markup on screen for one field. Rendering itself (HTML layout, text
/// fitting) happens outside the player.
pub trait Renderer: Send + Sync {
    fn render(&self, field_id: &str, markup: &str);
}

/// Publishes field markup on the [`Board`], where the kiosk page picks it up
/// through `/api/fields/{id}`.
pub struct BoardRenderer {
    board: Arc<Board>,
}

impl BoardRenderer {
    pub fn new(board: Arc<Board>) -> Self {
        Self { board }
    }
}

impl Renderer for BoardRenderer {
    fn render(&self, field_id: &str, markup: &str) {
        debug!(field = field_id, bytes = markup.len(), "render");
        self.board.set_markup(field_id, markup);
    }
}
