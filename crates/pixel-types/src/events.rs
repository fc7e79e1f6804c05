use serde::{Deserialize, Serialize};

use crate::models::Pixel;

/// Kind of row change carried by the changefeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// Which change kinds a subscriber wants. Serialized as `*`, `INSERT` or `UPDATE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFilter {
    #[default]
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
}

impl EventFilter {
    pub fn matches(self, kind: ChangeKind) -> bool {
        match self {
            Self::All => true,
            Self::Insert => kind == ChangeKind::Insert,
            Self::Update => kind == ChangeKind::Update,
        }
    }
}

/// A single row-level change, carrying the full new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    pub table: String,
    pub new: Pixel,
}

/// Frames sent FROM the server TO a changefeed subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Subscription accepted; changes follow.
    Subscribed { table: String, event: EventFilter },

    /// A row was inserted or updated
    Change(ChangeEvent),

    /// The last command was rejected
    Error { message: String },
}

/// Frames sent FROM a subscriber TO the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedCommand {
    /// Start receiving changes for a table
    Subscribe {
        table: String,
        #[serde(default)]
        event: EventFilter,
    },

    /// Stop receiving changes; the server closes the session
    Unsubscribe,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_frame_uses_event_type_field() {
        let frame = FeedEvent::Change(ChangeEvent {
            event_type: ChangeKind::Update,
            table: "pixels".into(),
            new: Pixel::unadopted(1),
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "Change");
        assert_eq!(json["data"]["eventType"], "UPDATE");
        assert_eq!(json["data"]["new"]["id"], 1);
    }

    #[test]
    fn subscribe_defaults_to_all_events() {
        let cmd: FeedCommand =
            serde_json::from_str(r#"{"type":"Subscribe","data":{"table":"pixels"}}"#).unwrap();
        match cmd {
            FeedCommand::Subscribe { table, event } => {
                assert_eq!(table, "pixels");
                assert_eq!(event, EventFilter::All);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn filter_matches_kinds() {
        assert!(EventFilter::All.matches(ChangeKind::Insert));
        assert!(EventFilter::Update.matches(ChangeKind::Update));
        assert!(!EventFilter::Update.matches(ChangeKind::Insert));
        let star: EventFilter = serde_json::from_str(r#""*""#).unwrap();
        assert_eq!(star, EventFilter::All);
    }
}
