use serde::Serialize;

/// Media kind of a content item, derived from the feed's free-form `type` tag.
///
/// Backends send class-like names (`Image`, `Video`, `LocalVideo`, `Agenda`,
/// `Text`...); only the families below change scheduling behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Image,
    Agenda,
    /// Anything else: text, raw markup, unknown widgets.
    Other,
}

/// Capability table: whether content of a kind fetches a remote resource
/// that must be preloaded before it is shown.
const CAPABILITIES: &[(MediaType, bool)] = &[
    (MediaType::Video, true),
    (MediaType::Image, true),
    (MediaType::Agenda, true),
    (MediaType::Other, false),
];

impl MediaType {
    pub fn from_tag(tag: &str) -> Self {
        // Order matters for composite tags such as "ImageVideo".
        if tag.contains("Video") {
            Self::Video
        } else if tag.contains("Image") {
            Self::Image
        } else if tag.contains("Agenda") {
            Self::Agenda
        } else {
            Self::Other
        }
    }

    pub fn is_preloadable(self) -> bool {
        CAPABILITIES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, preload)| *preload)
            .unwrap_or(false)
    }

}
