use rtmbot_core::{RtmConfig, RtmError, RtmResult};
use serde::Deserialize;
use tracing::{debug, info};

const CONNECT_PATH: &str = "/api/rtm.connect";

/// Identity and endpoint returned by a successful `rtm.connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    /// WebSocket URL of the session.
    pub url: String,
    /// The bot's own user id.
    pub bot_id: String,
    /// The bot's display name.
    pub bot_name: String,
    /// Workspace the bot belongs to.
    pub team: Team,
}

/// Workspace description included in the `rtm.connect` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Team {
    /// Team id.
    #[serde(default)]
    pub id: String,
    /// Team name.
    #[serde(default)]
    pub name: String,
    /// Team domain (`<domain>.slack.com`).
    #[serde(default)]
    pub domain: String,
    /// Enterprise grid id, if any.
    #[serde(default)]
    pub enterprise_id: Option<String>,
    /// Enterprise grid name, if any.
    #[serde(default)]
    pub enterprise_name: Option<String>,
}

// ── rtm.connect response ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    team: Team,
    #[serde(default, rename = "self")]
    bot: Option<SelfInfo>,
}

#[derive(Debug, Deserialize)]
struct SelfInfo {
    id: String,
    #[serde(default)]
    name: String,
}

/// Exchanges a bot token for a session URL via `rtm.connect`.
///
/// One request per call, no retries.
#[derive(Debug, Clone)]
pub struct HandshakeClient {
    client: reqwest::Client,
    api_base_url: String,
}

impl HandshakeClient {
    /// Create a client for the given API base URL (e.g. `https://slack.com`).
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base_url: api_base_url.into(),
        }
    }

    /// Create a client from configuration, applying its request timeout.
    pub fn from_config(config: &RtmConfig) -> RtmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| RtmError::Transport(format!("HTTP client build error: {e}")))?;
        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
        })
    }

    /// Perform the handshake.
    ///
    /// Fails with [`RtmError::Transport`] when the request cannot be sent or
    /// the status is not a success, and with [`RtmError::Protocol`] when the
    /// body is malformed or reports `ok = false`.
    pub async fn connect(&self, token: &str) -> RtmResult<ConnectInfo> {
        let endpoint = format!(
            "{}{CONNECT_PATH}",
            self.api_base_url.trim_end_matches('/')
        );
        info!(endpoint = %endpoint, "Requesting RTM session URL");

        let resp = self
            .client
            .get(&endpoint)
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| RtmError::Transport(format!("rtm.connect request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RtmError::Transport(format!(
                "rtm.connect request failed with status {status}"
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| RtmError::Transport(format!("rtm.connect read error: {e}")))?;
        let body: ConnectResponse = serde_json::from_slice(&body)
            .map_err(|e| RtmError::Protocol(format!("rtm.connect parse error: {e}")))?;

        if !body.ok {
            return Err(RtmError::Protocol(format!(
                "rtm.connect failed: {}",
                body.error.unwrap_or_default()
            )));
        }

        let url = body
            .url
            .ok_or_else(|| RtmError::Protocol("rtm.connect returned no URL".into()))?;
        let bot = body
            .bot
            .ok_or_else(|| RtmError::Protocol("rtm.connect returned no bot identity".into()))?;

        debug!(bot_id = %bot.id, team = %body.team.id, "rtm.connect succeeded");
        Ok(ConnectInfo {
            url,
            bot_id: bot.id,
            bot_name: bot.name,
            team: body.team,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_connect_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rtm.connect"))
            .and(query_param("token", "xoxb-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "url": "wss://example/session",
                "team": {"id": "T1", "name": "Team", "domain": "team"},
                "self": {"id": "U1", "name": "bot"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = HandshakeClient::new(server.uri())
            .connect("xoxb-1")
            .await
            .unwrap();
        assert_eq!(info.url, "wss://example/session");
        assert_eq!(info.bot_id, "U1");
        assert_eq!(info.bot_name, "bot");
        assert_eq!(info.team.domain, "team");
        assert!(info.team.enterprise_id.is_none());
    }

    #[tokio::test]
    async fn test_connect_not_ok_surfaces_server_error() {
        let server = MockServer::start().await;
        Mock::given(path("/api/rtm.connect"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "error": "invalid_auth"})),
            )
            .mount(&server)
            .await;

        let err = HandshakeClient::new(server.uri())
            .connect("bad")
            .await
            .unwrap_err();
        match err {
            RtmError::Protocol(msg) => assert!(msg.contains("invalid_auth")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connect_http_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(path("/api/rtm.connect"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = HandshakeClient::new(server.uri())
            .connect("t")
            .await
            .unwrap_err();
        assert!(matches!(err, RtmError::Transport(_)));
    }

    #[tokio::test]
    async fn test_connect_malformed_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(path("/api/rtm.connect"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let err = HandshakeClient::new(server.uri())
            .connect("t")
            .await
            .unwrap_err();
        assert!(matches!(err, RtmError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_connect_unreachable_is_transport_error() {
        let err = HandshakeClient::new("http://127.0.0.1:1")
            .connect("t")
            .await
            .unwrap_err();
        assert!(matches!(err, RtmError::Transport(_)));
    }
}
