use crate::ledger::ConnectionIdentity;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use k8s_openapi::api::core::v1::Namespace;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// A server-side object that can be mirrored by name.
pub trait WatchItem: Clone + Send + 'static {
    fn key(&self) -> &str;
}

impl WatchItem for Namespace {
    fn key(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

impl EventKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "ADDED" => Some(Self::Added),
            "MODIFIED" => Some(Self::Modified),
            "DELETED" => Some(Self::Deleted),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Error => "ERROR",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    Error(String),
}

#[derive(Debug, Deserialize)]
struct RawWatchFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    object: Value,
}

/// Decodes one `{type, object}` frame. Bookmarks decode to `None`.
pub fn parse_watch_frame<T>(text: &str) -> Result<Option<WatchEvent<T>>>
where
    T: DeserializeOwned,
{
    let raw: RawWatchFrame =
        serde_json::from_str(text).context("watch frame is not a valid event envelope")?;
    if raw.kind.eq_ignore_ascii_case("BOOKMARK") {
        return Ok(None);
    }

    let Some(kind) = EventKind::from_token(&raw.kind) else {
        anyhow::bail!("unknown watch event type '{}'", raw.kind);
    };
    let event = match kind {
        EventKind::Added => WatchEvent::Added(decode_object(kind, raw.object)?),
        EventKind::Modified => WatchEvent::Modified(decode_object(kind, raw.object)?),
        EventKind::Deleted => WatchEvent::Deleted(decode_object(kind, raw.object)?),
        EventKind::Error => WatchEvent::Error(status_message(&raw.object)),
    };
    Ok(Some(event))
}

fn decode_object<T>(kind: EventKind, object: Value) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value::<T>(object).with_context(|| format!("failed to decode {kind} object"))
}

fn status_message(object: &Value) -> String {
    ["message", "reason"]
        .iter()
        .find_map(|field| {
            object
                .get(*field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| match object {
            Value::Null => "watch stream reported an error".to_string(),
            other => other.to_string(),
        })
}

/// Transport-level happenings of one watch connection, tagged upstream with
/// the identity of the connection that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    Opened,
    Message(String),
    Error(String),
    Closed(Option<u16>),
}

#[derive(Debug)]
pub enum SyncMessage<T> {
    Listed {
        epoch: u64,
        target: String,
        result: std::result::Result<Vec<T>, String>,
    },
    Link {
        identity: ConnectionIdentity,
        signal: LinkSignal,
    },
    ReconnectDue {
        identity: ConnectionIdentity,
    },
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MemberSnapshot {
    pub target: Option<String>,
    pub available: Vec<String>,
    pub selected: Vec<String>,
    pub all_selected: bool,
    pub loading: bool,
    pub last_error: Option<String>,
    pub connection: String,
    pub last_synced: Option<DateTime<Local>>,
}

impl MemberSnapshot {
    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.iter().any(|selected| selected == name)
    }
}

pub fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{EventKind, WatchEvent, WatchItem, compact_error, parse_watch_frame};
    use k8s_openapi::api::core::v1::Namespace;

    #[test]
    fn event_tokens_are_case_insensitive() {
        assert_eq!(EventKind::from_token("added"), Some(EventKind::Added));
        assert_eq!(EventKind::from_token(" MODIFIED "), Some(EventKind::Modified));
        assert_eq!(EventKind::from_token("Deleted"), Some(EventKind::Deleted));
        assert_eq!(EventKind::from_token("ERROR"), Some(EventKind::Error));
        assert_eq!(EventKind::from_token("SYNC"), None);
    }

    #[test]
    fn namespace_frames_decode_to_events() {
        let frame = r#"{"type":"ADDED","object":{"apiVersion":"v1","kind":"Namespace","metadata":{"name":"payments","resourceVersion":"42"}}}"#;
        let event = parse_watch_frame::<Namespace>(frame)
            .expect("frame should parse")
            .expect("added frames carry an event");
        let WatchEvent::Added(namespace) = event else {
            panic!("expected an added event");
        };
        assert_eq!(namespace.key(), "payments");
    }

    #[test]
    fn error_frames_surface_status_message() {
        let frame = r#"{"type":"ERROR","object":{"kind":"Status","status":"Failure","message":"too old resource version","reason":"Expired"}}"#;
        let event = parse_watch_frame::<Namespace>(frame).expect("frame should parse");
        assert_eq!(
            event,
            Some(WatchEvent::Error("too old resource version".to_string()))
        );

        let bare = r#"{"type":"ERROR"}"#;
        let event = parse_watch_frame::<Namespace>(bare).expect("frame should parse");
        assert_eq!(
            event,
            Some(WatchEvent::Error("watch stream reported an error".to_string()))
        );
    }

    #[test]
    fn bookmark_frames_are_skipped() {
        let frame = r#"{"type":"BOOKMARK","object":{"metadata":{"resourceVersion":"77"}}}"#;
        let event = parse_watch_frame::<Namespace>(frame).expect("bookmark should parse");
        assert!(event.is_none());
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(parse_watch_frame::<Namespace>("not json").is_err());
        assert!(parse_watch_frame::<Namespace>(r#"{"type":"RESYNC","object":{}}"#).is_err());
        assert!(parse_watch_frame::<Namespace>(r#"{"type":"ADDED","object":[1,2]}"#).is_err());
    }

    #[test]
    fn compact_error_keeps_two_causes() {
        let error = anyhow::anyhow!("root")
            .context("middle")
            .context("outer")
            .context("top");
        assert_eq!(
            compact_error(&error),
            "top\ncaused by: outer\ncaused by: middle"
        );
    }
}
