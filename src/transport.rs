use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:4688/api/v1";
pub const DEFAULT_RESOURCE_PATH: &str = "api/v1/namespaces";
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Frame {
    Text(String),
    Failed(String),
    Closed(Option<u16>),
}

pub type FrameStream = BoxStream<'static, Frame>;

/// Opens the long-lived watch stream for one target.
pub trait WatchTransport: Send + Sync + 'static {
    fn open(&self, target: &str) -> BoxFuture<'static, Result<FrameStream>>;
}

/// One-shot bulk list for one target.
pub trait ListSource<T>: Send + Sync + 'static {
    fn list(&self, target: &str) -> BoxFuture<'static, Result<Vec<T>>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Items { items: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListBody<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Self::Items { items } => items,
            Self::Bare(items) => items,
        }
    }
}

/// Client for the dashboard API proxy, which fronts each cluster under
/// `{base}/clusters/{cluster}/...`.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: Url,
    resource_path: String,
}

impl ProxyClient {
    pub fn new(base_url: &str, resource_path: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid proxy base url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("proxy base url '{base_url}' cannot carry a path");
        }
        let http = reqwest::Client::builder()
            .timeout(LIST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            resource_path: resource_path.trim().trim_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn list_url(&self, target: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let Ok(mut segments) = url.path_segments_mut() else {
                anyhow::bail!("proxy base url '{}' cannot carry a path", self.base_url);
            };
            segments.pop_if_empty().push("clusters").push(target);
            for segment in self
                .resource_path
                .split('/')
                .filter(|segment| !segment.is_empty())
            {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    pub fn watch_url(&self, target: &str) -> Result<Url> {
        let mut url = self.list_url(target)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => anyhow::bail!("unsupported proxy scheme '{other}'"),
        };
        if url.set_scheme(scheme).is_err() {
            anyhow::bail!("failed to derive watch url from '{url}'");
        }
        url.query_pairs_mut().append_pair("watch", "1");
        Ok(url)
    }
}

impl<T> ListSource<T> for ProxyClient
where
    T: DeserializeOwned + Send + 'static,
{
    fn list(&self, target: &str) -> BoxFuture<'static, Result<Vec<T>>> {
        let http = self.http.clone();
        let url = self.list_url(target);
        async move {
            let url = url?;
            let response = http
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("failed to request {url}"))?
                .error_for_status()
                .with_context(|| format!("list request to {url} was rejected"))?;
            let body = response
                .json::<ListBody<T>>()
                .await
                .with_context(|| format!("failed to decode list response from {url}"))?;
            Ok(body.into_items())
        }
        .boxed()
    }
}

impl WatchTransport for ProxyClient {
    fn open(&self, target: &str) -> BoxFuture<'static, Result<FrameStream>> {
        let url = self.watch_url(target);
        async move {
            let url = url?;
            let (socket, _) =
                bounded_handshake(CONNECT_TIMEOUT, &url, connect_async(url.as_str())).await?;
            let frames = socket
                .filter_map(|message| async move { socket_frame(message) })
                .boxed();
            Ok(frames)
        }
        .boxed()
    }
}

async fn bounded_handshake<F, T, E>(limit: Duration, url: &Url, handshake: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::time::timeout(limit, handshake)
        .await
        .with_context(|| format!("timed out opening watch stream {url}"))?
        .with_context(|| format!("failed to open watch stream {url}"))
}

fn socket_frame(
    message: std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Frame> {
    match message {
        Ok(Message::Text(text)) => Some(Frame::Text(text)),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Some(Frame::Text(text)),
            Err(error) => {
                warn!("dropping binary watch frame that is not UTF-8: {error}");
                None
            }
        },
        Ok(Message::Close(frame)) => Some(Frame::Closed(frame.map(|frame| u16::from(frame.code)))),
        Ok(_) => None,
        Err(error) => Some(Frame::Failed(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{Frame, ListBody, ProxyClient, bounded_handshake, socket_frame};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn list_and_watch_urls_follow_proxy_layout() {
        let client = ProxyClient::new("http://localhost:4688/api/v1", "api/v1/namespaces")
            .expect("client should build");

        assert_eq!(
            client.list_url("kind-dev").expect("list url").as_str(),
            "http://localhost:4688/api/v1/clusters/kind-dev/api/v1/namespaces"
        );
        assert_eq!(
            client.watch_url("kind-dev").expect("watch url").as_str(),
            "ws://localhost:4688/api/v1/clusters/kind-dev/api/v1/namespaces?watch=1"
        );
    }

    #[test]
    fn target_names_are_path_encoded() {
        let client = ProxyClient::new("https://proxy.internal/api/v1/", "/api/v1/namespaces/")
            .expect("client should build");

        assert_eq!(
            client.watch_url("arn:aws/eks prod").expect("watch url").as_str(),
            "wss://proxy.internal/api/v1/clusters/arn:aws%2Feks%20prod/api/v1/namespaces?watch=1"
        );
    }

    #[test]
    fn invalid_base_urls_are_rejected() {
        assert!(ProxyClient::new("not a url", "api/v1/namespaces").is_err());
        assert!(ProxyClient::new("mailto:ops@example.com", "api/v1/namespaces").is_err());

        let client =
            ProxyClient::new("ftp://example.com/api", "api/v1/namespaces").expect("parses");
        assert!(client.watch_url("a").is_err());
    }

    #[test]
    fn list_bodies_accept_arrays_and_list_objects() {
        let wrapped: ListBody<serde_json::Value> =
            serde_json::from_str(r#"{"kind":"NamespaceList","items":[{"a":1},{"b":2}]}"#)
                .expect("wrapped list");
        assert_eq!(wrapped.into_items().len(), 2);

        let bare: ListBody<serde_json::Value> =
            serde_json::from_str(r#"[{"a":1}]"#).expect("bare list");
        assert_eq!(bare.into_items().len(), 1);
    }

    #[test]
    fn socket_messages_map_to_frames() {
        assert_eq!(
            socket_frame(Ok(Message::Text("{}".to_string()))),
            Some(Frame::Text("{}".to_string()))
        );
        assert_eq!(
            socket_frame(Ok(Message::Binary(b"{\"type\":1}".to_vec()))),
            Some(Frame::Text("{\"type\":1}".to_string()))
        );
        assert_eq!(socket_frame(Ok(Message::Binary(vec![0xff, 0xfe, b'{']))), None);
        assert_eq!(socket_frame(Ok(Message::Ping(Vec::new()))), None);
        assert_eq!(
            socket_frame(Ok(Message::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "".into(),
            })))),
            Some(Frame::Closed(Some(1001)))
        );
        assert_eq!(
            socket_frame(Ok(Message::Close(None))),
            Some(Frame::Closed(None))
        );
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        let url = url::Url::parse("ws://localhost:4688/watch").expect("url");
        let stalled = futures::future::pending::<Result<(), std::io::Error>>();

        let error = bounded_handshake(Duration::from_millis(20), &url, stalled)
            .await
            .expect_err("handshake should time out");
        assert!(error.to_string().contains("timed out opening watch stream"));

        let refused = futures::future::ready(Err::<(), _>(std::io::Error::other("refused")));
        let error = bounded_handshake(Duration::from_secs(1), &url, refused)
            .await
            .expect_err("handshake error should surface");
        assert!(error.to_string().contains("failed to open watch stream"));
    }
}
