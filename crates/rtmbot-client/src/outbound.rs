use serde::Serialize;

/// A chat message written to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage<'a> {
    /// Per-session message id.
    pub id: i32,
    #[serde(rename = "type")]
    kind: &'static str,
    /// Target channel id.
    pub channel: &'a str,
    /// Message body.
    pub text: &'a str,
}

impl<'a> OutboundMessage<'a> {
    /// Build a `message` frame.
    pub fn new(id: i32, channel: &'a str, text: &'a str) -> Self {
        Self {
            id,
            kind: "message",
            channel,
            text,
        }
    }
}

/// A heartbeat probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ping {
    /// Ping id, echoed back as `reply_to` in the pong.
    pub id: i32,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Ping {
    /// Build a `ping` frame.
    pub fn new(id: i32) -> Self {
        Self { id, kind: "ping" }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_string(&OutboundMessage::new(1, "C1", "hi")).unwrap();
        assert_eq!(json, r#"{"id":1,"type":"message","channel":"C1","text":"hi"}"#);
    }

    #[test]
    fn test_ping_wire_shape() {
        let json = serde_json::to_string(&Ping::new(3)).unwrap();
        assert_eq!(json, r#"{"id":3,"type":"ping"}"#);
    }
}
