//! Inbound event shapes.
//!
//! Every frame carries a `type` tag. [`EventKind`] lists the tags this client
//! understands; anything else is dropped by the dispatcher.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The session is ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Hello {}

/// A message posted to a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    /// Channel the message was posted in.
    #[serde(default)]
    pub channel: String,
    /// Author's user id; empty for some bot and system messages.
    #[serde(default)]
    pub user: String,
    /// Message text.
    #[serde(default)]
    pub text: String,
    /// Message timestamp, also its id within the channel.
    #[serde(default)]
    pub ts: String,
    /// Subtype such as `message_changed`, if any.
    #[serde(default)]
    pub subtype: Option<String>,
    /// Set on edits and deletions; such messages are never dispatched.
    #[serde(default)]
    pub hidden: bool,
}

impl MessageEvent {
    /// Parse `ts` (`"<seconds>.<micros>"`) into a UTC timestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let (secs, frac) = self.ts.split_once('.').unwrap_or((self.ts.as_str(), "0"));
        let secs: i64 = secs.parse().ok()?;
        let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
        Utc.timestamp_opt(secs, micros * 1_000).single()
    }
}

/// Acknowledgement of a ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pong {
    /// Id of the ping being acknowledged.
    pub reply_to: i32,
}

/// A team member's presence changed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresenceChange {
    /// User whose presence changed.
    #[serde(default)]
    pub user: String,
    /// `active` or `away`.
    #[serde(default)]
    pub presence: String,
}

/// A team member's do-not-disturb settings changed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DndUpdatedUser {
    /// User whose settings changed.
    #[serde(default)]
    pub user: String,
    /// The new settings.
    #[serde(default)]
    pub dnd_status: DndStatus,
}

/// Do-not-disturb window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DndStatus {
    /// Whether do-not-disturb is on.
    #[serde(default)]
    pub dnd_enabled: bool,
    /// Unix time the next window starts.
    #[serde(default)]
    pub next_dnd_start_ts: i64,
    /// Unix time the next window ends.
    #[serde(default)]
    pub next_dnd_end_ts: i64,
}

/// Type tags this client recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `hello`
    Hello,
    /// `message`
    Message,
    /// `pong`
    Pong,
    /// `presence_change`
    PresenceChange,
    /// `dnd_updated_user`
    DndUpdatedUser,
}

impl EventKind {
    /// Look up a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "hello" => Some(Self::Hello),
            "message" => Some(Self::Message),
            "pong" => Some(Self::Pong),
            "presence_change" => Some(Self::PresenceChange),
            "dnd_updated_user" => Some(Self::DndUpdatedUser),
            _ => None,
        }
    }

    /// The wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Message => "message",
            Self::Pong => "pong",
            Self::PresenceChange => "presence_change",
            Self::DndUpdatedUser => "dnd_updated_user",
        }
    }
}

/// A fully parsed inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// See [`Hello`].
    Hello(Hello),
    /// See [`MessageEvent`].
    Message(MessageEvent),
    /// See [`Pong`].
    Pong(Pong),
    /// See [`PresenceChange`].
    PresenceChange(PresenceChange),
    /// See [`DndUpdatedUser`].
    DndUpdatedUser(DndUpdatedUser),
}

impl Event {
    /// Parse `raw` into the shape registered for `kind`.
    pub fn parse(kind: EventKind, raw: &str) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::Hello => Self::Hello(serde_json::from_str(raw)?),
            EventKind::Message => Self::Message(serde_json::from_str(raw)?),
            EventKind::Pong => Self::Pong(serde_json::from_str(raw)?),
            EventKind::PresenceChange => Self::PresenceChange(serde_json::from_str(raw)?),
            EventKind::DndUpdatedUser => Self::DndUpdatedUser(serde_json::from_str(raw)?),
        })
    }

    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Hello(_) => EventKind::Hello,
            Self::Message(_) => EventKind::Message,
            Self::Pong(_) => EventKind::Pong,
            Self::PresenceChange(_) => EventKind::PresenceChange,
            Self::DndUpdatedUser(_) => EventKind::DndUpdatedUser,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup() {
        for kind in [
            EventKind::Hello,
            EventKind::Message,
            EventKind::Pong,
            EventKind::PresenceChange,
            EventKind::DndUpdatedUser,
        ] {
            assert_eq!(EventKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EventKind::from_tag("user_typing"), None);
    }

    #[test]
    fn test_parse_message_with_defaults() {
        let raw = r#"{"type":"message","channel":"C1","text":"hi","ts":"1.5"}"#;
        let Event::Message(msg) = Event::parse(EventKind::Message, raw).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(msg.channel, "C1");
        assert_eq!(msg.user, "");
        assert!(!msg.hidden);
        assert!(msg.subtype.is_none());
    }

    #[test]
    fn test_parse_pong_requires_reply_to() {
        assert!(Event::parse(EventKind::Pong, r#"{"type":"pong"}"#).is_err());
        let event = Event::parse(EventKind::Pong, r#"{"type":"pong","reply_to":5}"#).unwrap();
        assert_eq!(event, Event::Pong(Pong { reply_to: 5 }));
        assert_eq!(event.kind(), EventKind::Pong);
    }

    #[test]
    fn test_parse_dnd_updated_user() {
        let raw = r#"{"type":"dnd_updated_user","user":"U1",
            "dnd_status":{"dnd_enabled":true,"next_dnd_start_ts":10,"next_dnd_end_ts":20}}"#;
        let Event::DndUpdatedUser(ev) = Event::parse(EventKind::DndUpdatedUser, raw).unwrap()
        else {
            panic!("expected dnd_updated_user");
        };
        assert!(ev.dnd_status.dnd_enabled);
        assert_eq!(ev.dnd_status.next_dnd_end_ts, 20);
    }

    #[test]
    fn test_message_timestamp() {
        let msg = MessageEvent {
            ts: "1355517523.000005".into(),
            ..MessageEvent::default()
        };
        let ts = msg.timestamp().unwrap();
        assert_eq!(ts.timestamp(), 1_355_517_523);
        assert_eq!(ts.timestamp_subsec_micros(), 5);

        let bad = MessageEvent {
            ts: "soon".into(),
            ..MessageEvent::default()
        };
        assert!(bad.timestamp().is_none());
    }
}
