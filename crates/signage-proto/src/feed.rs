//! JSON documents exchanged with the signage backend.
//!
//! Three documents are consumed:
//!
//! - the **layout** of a screen (which fields it has and where to poll),
//! - a **field content feed** listing the next playable items for one field,
//! - the **screen status feed** reporting configuration changes and rotation.

use serde::{Deserialize, Deserializer, Serialize};

/// `message` value the backend sends when the session cookie is gone.
pub const UNAUTHORIZED: &str = "Unauthorized";

/// Fallback text rendered when a feed rejects a request without a message.
pub const GENERIC_ERROR: &str = "Error";

// ── Layout ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScreenLayout {
    /// Status feed of this screen. `None` disables status polling.
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FieldLayout {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Content feed of this field. Absent or empty: the field never updates.
    #[serde(default)]
    pub url: Option<String>,
    /// Accepted media tags, informational only (filtering happens server side).
    #[serde(default)]
    pub types: Vec<String>,
}

// ── Field content feed ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentFeed {
    pub success: bool,
    #[serde(default)]
    pub next: Vec<ContentItem>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub data: String,
    /// Display duration in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl ContentItem {
    /// Duration in milliseconds. Non-finite values collapse to 0 (never shown).
    pub fn duration_ms(&self) -> i64 {
        if self.duration.is_finite() {
            (self.duration * 1000.0).round() as i64
        } else {
            0
        }
    }
}

// ── Screen status feed ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusFeed {
    pub success: bool,
    #[serde(default)]
    pub data: Option<StatusData>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    /// Opaque change token; only compared for equality.
    #[serde(default)]
    pub last_changes: serde_json::Value,
    /// Seconds until the screen should rotate. `<= 0` means no rotation.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub next_screen_url: Option<String>,
}

impl StatusFeed {
    pub fn is_unauthorized(&self) -> bool {
        !self.success && self.message.as_deref() == Some(UNAUTHORIZED)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Int(i) => i.to_string(),
        Id::Float(f) => f.to_string(),
    })
}
