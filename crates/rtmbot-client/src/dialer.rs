use crate::tls;
use rtmbot_core::{RtmConfig, RtmError, RtmResult};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::rustls::RootCertStore;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::ORIGIN, HeaderValue, Uri};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// The open frame connection produced by [`Dialer::dial`].
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Parts of a session URL needed to dial it by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// `true` for `wss://`.
    pub secure: bool,
    /// Hostname as written in the URL, without IPv6 brackets.
    pub host: String,
    /// Explicit port or the scheme default.
    pub port: u16,
    /// Path and query, `/` when absent.
    pub path_and_query: String,
}

impl Target {
    /// Split a `ws://` or `wss://` URL.
    pub fn parse(url: &str) -> RtmResult<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| RtmError::Transport(format!("Invalid session URL '{url}': {e}")))?;

        let secure = match uri.scheme_str() {
            Some("wss") => true,
            Some("ws") => false,
            other => {
                return Err(RtmError::Transport(format!(
                    "Unsupported session URL scheme: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };

        let host = uri
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RtmError::Transport(format!("No hostname in session URL '{url}'")))?
            .to_string();

        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
        let path_and_query = uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string());

        Ok(Self {
            secure,
            host,
            port,
            path_and_query,
        })
    }

    /// The same URL with the hostname replaced by `ip`.
    pub fn numeric_url(&self, ip: IpAddr) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let host = match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        format!("{scheme}://{host}:{}{}", self.port, self.path_and_query)
    }
}

/// Opens the session WebSocket against the resolved numeric address.
///
/// The certificate is still validated, but against the hostname from the
/// session URL rather than the dialed address. There is no fallback to
/// hostname-based dialing.
#[derive(Debug, Clone)]
pub struct Dialer {
    origin: String,
    roots: Arc<RootCertStore>,
}

impl Dialer {
    /// Create a dialer using the bundled web PKI roots.
    pub fn new(origin: impl Into<String>) -> RtmResult<Self> {
        Ok(Self::with_roots(origin, tls::root_store(None)?))
    }

    /// Create a dialer trusting only `roots`.
    pub fn with_roots(origin: impl Into<String>, roots: RootCertStore) -> Self {
        Self {
            origin: origin.into(),
            roots: Arc::new(roots),
        }
    }

    /// Create a dialer from configuration, loading any extra roots.
    pub fn from_config(config: &RtmConfig) -> RtmResult<Self> {
        let roots = tls::root_store(config.tls.extra_root_certs.as_deref())?;
        Ok(Self::with_roots(config.origin.clone(), roots))
    }

    /// Dial `url` and complete the WebSocket upgrade.
    pub async fn dial(&self, url: &str) -> RtmResult<WsStream> {
        let target = Target::parse(url)?;
        let addr = resolve(&target.host, target.port).await?;
        let numeric_url = target.numeric_url(addr.ip());
        info!(url = %url, addr = %addr, "Connecting to WebSocket");

        let mut request = numeric_url
            .as_str()
            .into_client_request()
            .map_err(|e| RtmError::Transport(format!("Invalid WebSocket request: {e}")))?;
        let origin = HeaderValue::from_str(&self.origin)
            .map_err(|e| RtmError::Transport(format!("Invalid origin '{}': {e}", self.origin)))?;
        request.headers_mut().insert(ORIGIN, origin);

        let connector = if target.secure {
            let config = tls::client_config(&target.host, self.roots.clone())?;
            Some(Connector::Rustls(Arc::new(config)))
        } else {
            None
        };

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RtmError::Transport(format!("Connect to {addr} failed: {e}")))?;

        let (ws, response) =
            tokio_tungstenite::client_async_tls_with_config(request, stream, None, connector)
                .await
                .map_err(|e| RtmError::Transport(format!("WebSocket handshake failed: {e}")))?;
        debug!(status = %response.status(), "WebSocket upgrade complete");

        Ok(ws)
    }
}

/// Resolve `host` and take the first candidate address.
async fn resolve(host: &str, port: u16) -> RtmResult<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| RtmError::Transport(format!("Could not resolve address of {host}: {e}")))?;
    let addr = addrs
        .next()
        .ok_or_else(|| RtmError::Transport(format!("No addresses found for {host}")))?;
    debug!(host = %host, addr = %addr, "Resolved session host");
    Ok(addr)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_parse_wss_url() {
        let target = Target::parse("wss://wss-primary.slack.com/websocket/abc?x=1").unwrap();
        assert!(target.secure);
        assert_eq!(target.host, "wss-primary.slack.com");
        assert_eq!(target.port, 443);
        assert_eq!(target.path_and_query, "/websocket/abc?x=1");
    }

    #[test]
    fn test_parse_ws_url_with_port() {
        let target = Target::parse("ws://127.0.0.1:9000").unwrap();
        assert!(!target.secure);
        assert_eq!(target.port, 9000);
        assert_eq!(target.path_and_query, "/");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(matches!(
            Target::parse("https://slack.com/"),
            Err(RtmError::Transport(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_host() {
        assert!(Target::parse("/websocket/abc").is_err());
    }

    #[test]
    fn test_numeric_url_strips_hostname() {
        let target = Target::parse("wss://wss-primary.slack.com/websocket/abc").unwrap();
        let url = target.numeric_url(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(url, "wss://10.0.0.7:443/websocket/abc");
        assert!(!url.contains("slack.com"));
    }

    #[test]
    fn test_numeric_url_brackets_ipv6() {
        let target = Target::parse("ws://example.org:8080/s").unwrap();
        let url = target.numeric_url(IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(url, "ws://[::1]:8080/s");
    }

    #[tokio::test]
    async fn test_resolve_numeric_host() {
        let addr = resolve("127.0.0.1", 443).await.unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(addr.port(), 443);
    }

    #[tokio::test]
    async fn test_dial_refused_is_transport_error() {
        let dialer = Dialer::new("https://api.slack.com/").unwrap();
        let err = dialer.dial("ws://127.0.0.1:1/session").await.unwrap_err();
        assert!(matches!(err, RtmError::Transport(_)));
    }
}
