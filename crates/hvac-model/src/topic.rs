//! Raw MQTT topic parsing.
//!
//! Plant topics follow `LSST/<floor>/<component path>/<item>`. The item is
//! always the final path segment; the component path is everything between
//! the floor segment and the item and may itself contain slashes
//! (e.g. `MANEJADORA/LOWER_01`).

use serde::{Deserialize, Serialize};

/// Root segment shared by all plant topics.
pub const TOPIC_ROOT: &str = "LSST";

/// A parsed plant topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPath {
    pub floor: String,
    pub component: String,
    pub item: String,
}

impl TopicPath {
    /// Parse a raw topic string.
    ///
    /// Floor segments are zero-padded on the way in (`PISO1` becomes
    /// `PISO01`) because the plant is inconsistent about the spelling.
    pub fn parse(raw: &str) -> Result<Self, TopicParseError> {
        let trimmed = raw.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() < 4 {
            return Err(TopicParseError::TooShort {
                topic: raw.to_string(),
            });
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TopicParseError::EmptySegment {
                topic: raw.to_string(),
            });
        }
        if !segments[0].eq_ignore_ascii_case(TOPIC_ROOT) {
            return Err(TopicParseError::UnknownRoot {
                root: segments[0].to_string(),
            });
        }

        let floor = normalize_floor(segments[1]);
        let component = segments[2..segments.len() - 1].join("/");
        let item = segments[segments.len() - 1].to_string();
        Ok(Self {
            floor,
            component,
            item,
        })
    }

    /// The canonical wire spelling of this topic.
    pub fn to_topic(&self) -> String {
        format!("{TOPIC_ROOT}/{}/{}/{}", self.floor, self.component, self.item)
    }
}

impl std::fmt::Display for TopicPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_topic())
    }
}

/// Zero-pad single-digit floor numbers, e.g. `PISO1` -> `PISO01`.
pub fn normalize_floor(floor: &str) -> String {
    let upper = floor.trim().to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix("PISO") {
        if rest.len() == 1 && rest.chars().all(|c| c.is_ascii_digit()) {
            return format!("PISO0{rest}");
        }
    }
    upper
}

/// A topic string that does not follow the plant naming contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicParseError {
    #[error("topic {topic:?} has fewer than four segments")]
    TooShort { topic: String },

    #[error("topic {topic:?} contains an empty segment")]
    EmptySegment { topic: String },

    #[error("unknown topic root {root:?}")]
    UnknownRoot { root: String },
}
