//! Shared, read-mostly view of what the player is showing.
//!
//! The session loop is the only writer of markup and snapshots; the HTTP API
//! and the log layer read from (or append warnings to) the same board.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use signage_proto::media::MediaType;
use tokio::sync::Notify;

use crate::cache::CacheSummary;

/// Recent warnings kept for `/api/state`.
const MAX_WARNINGS: usize = 50;

#[derive(Debug, Clone, Serialize, Default)]
pub struct FieldSnapshot {
    pub id: String,
    pub can_update: bool,
    pub stuck: bool,
    pub pool_size: usize,
    /// Media tags the field accepts, as declared by the layout.
    pub types: Vec<String>,
    pub current_id: Option<String>,
    pub current_media: Option<MediaType>,
    /// Milliseconds until the current content ends.
    pub remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ScreenSnapshot {
    pub screen_url: String,
    /// Milliseconds until the scheduled reload; `Some(0)` when overdue.
    pub reload_in_ms: Option<u64>,
    pub next_url: Option<String>,
    pub fields: Vec<FieldSnapshot>,
    pub cache: CacheSummary,
}

#[derive(Debug, Default)]
struct BoardState {
    rev: u64,
    markup: BTreeMap<String, String>,
    snapshot: Option<ScreenSnapshot>,
    warnings: VecDeque<String>,
}

#[derive(Debug, Default)]
pub struct Board {
    state: RwLock<BoardState>,
    reload: Notify,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    fn write<T>(&self, f: impl FnOnce(&mut BoardState) -> T) -> T {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn read<T>(&self, f: impl FnOnce(&BoardState) -> T) -> T {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Forget the previous screen's fields.
    pub fn reset(&self, field_ids: impl IntoIterator<Item = String>) {
        self.write(|s| {
            s.markup = field_ids.into_iter().map(|id| (id, String::new())).collect();
            s.snapshot = None;
            s.rev += 1;
        });
    }

    pub fn set_markup(&self, field_id: &str, markup: &str) {
        self.write(|s| {
            s.markup.insert(field_id.to_string(), markup.to_string());
            s.rev += 1;
        });
    }

    pub fn markup(&self, field_id: &str) -> Option<String> {
        self.read(|s| s.markup.get(field_id).cloned())
    }

    pub fn rev(&self) -> u64 {
        self.read(|s| s.rev)
    }

    pub fn publish(&self, snapshot: ScreenSnapshot) {
        self.write(|s| s.snapshot = Some(snapshot));
    }

    pub fn snapshot(&self) -> Option<ScreenSnapshot> {
        self.read(|s| s.snapshot.clone())
    }

    pub fn push_warning(&self, line: String) {
        self.write(|s| {
            if s.warnings.len() == MAX_WARNINGS {
                s.warnings.pop_front();
            }
            s.warnings.push_back(line);
        });
    }

    pub fn warnings(&self) -> Vec<String> {
        self.read(|s| s.warnings.iter().cloned().collect())
    }

    /// Ask the running session for an immediate reload.
    pub fn request_reload(&self) {
        self.reload.notify_one();
    }

    pub async fn reload_requested(&self) {
        self.reload.notified().await;
    }
}
