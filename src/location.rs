use anyhow::{Context, Result};
use std::fmt::{Display, Formatter};
use url::{Url, form_urlencoded};

const LOCAL_ORIGIN: &str = "http://nswatch.local/";

/// Path plus query of an in-app location, e.g. `/workloads?namespace=default`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Location {
    path: String,
    query: Vec<(String, String)>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            query: Vec::new(),
        }
    }
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self> {
        let origin = Url::parse(LOCAL_ORIGIN).context("invalid local origin")?;
        let url = origin
            .join(raw.trim())
            .with_context(|| format!("invalid location '{raw}'"))?;
        Ok(Self {
            path: url.path().to_string(),
            query: url
                .query_pairs()
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect(),
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn without_param(&self, key: &str) -> Self {
        Self {
            path: self.path.clone(),
            query: self
                .query
                .iter()
                .filter(|(name, _)| name != key)
                .cloned()
                .collect(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.query.is_empty() {
            return write!(f, "{}", self.path);
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        write!(f, "{}?{}", self.path, query)
    }
}

/// Current location with history. Every navigation (not every replace)
/// advances `version`.
#[derive(Debug, Clone)]
pub struct Navigation {
    current: Location,
    history: Vec<Location>,
    version: u64,
}

impl Navigation {
    pub fn new(initial: Location) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
            version: 1,
        }
    }

    pub fn current(&self) -> &Location {
        &self.current
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn navigate(&mut self, location: Location) {
        let previous = std::mem::replace(&mut self.current, location);
        self.history.push(previous);
        self.version += 1;
    }

    pub fn replace(&mut self, location: Location) {
        self.current = location;
    }

    pub fn back(&mut self) -> bool {
        let Some(previous) = self.history.pop() else {
            return false;
        };
        self.current = previous;
        self.version += 1;
        true
    }
}

/// Stamp of one navigation as seen by one target activation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct NavigationStamp {
    pub epoch: u64,
    pub version: u64,
}

/// One-way gate from the location to the selection.
///
/// Each stamp is consumed at most once, so re-rendering the same navigation
/// never re-asserts the location's member over a manual selection.
#[derive(Debug, Clone)]
pub struct UrlSync {
    param: String,
    last_processed: Option<NavigationStamp>,
}

impl UrlSync {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            last_processed: None,
        }
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    /// Renames the query parameter. Navigations already consumed stay
    /// consumed.
    pub fn set_param(&mut self, param: impl Into<String>) {
        self.param = param.into();
    }

    pub fn is_processed(&self, stamp: NavigationStamp) -> bool {
        self.last_processed == Some(stamp)
    }

    pub fn mark_processed(&mut self, stamp: NavigationStamp) {
        self.last_processed = Some(stamp);
    }

    /// Returns the member named by an unprocessed navigation, consuming it.
    pub fn observe<'a>(
        &mut self,
        stamp: NavigationStamp,
        navigation: &'a Navigation,
    ) -> Option<&'a str> {
        if self.is_processed(stamp) {
            return None;
        }
        self.last_processed = Some(stamp);
        navigation.current().param(&self.param)
    }

    /// Drops the member parameter without adding a history entry.
    pub fn clear_override(&self, navigation: &mut Navigation) -> bool {
        if navigation.current().param(&self.param).is_none() {
            return false;
        }
        let cleared = navigation.current().without_param(&self.param);
        navigation.replace(cleared);
        true
    }

    pub fn reset(&mut self) {
        self.last_processed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{Location, Navigation, NavigationStamp, UrlSync};

    fn location(raw: &str) -> Location {
        Location::parse(raw).expect("location should parse")
    }

    #[test]
    fn location_parses_path_and_query() {
        let parsed = location("/workloads?namespace=kube-system&view=list");
        assert_eq!(parsed.path, "/workloads");
        assert_eq!(parsed.param("namespace"), Some("kube-system"));
        assert_eq!(parsed.param("view"), Some("list"));
        assert_eq!(parsed.param("missing"), None);
        assert_eq!(parsed.to_string(), "/workloads?namespace=kube-system&view=list");
    }

    #[test]
    fn location_handles_relative_and_empty_input() {
        assert_eq!(location("").to_string(), "/");
        assert_eq!(location("pods").path, "/pods");
        assert_eq!(location("?namespace=a").param("namespace"), Some("a"));
        assert_eq!(location("/x?namespace=").param("namespace"), None);
    }

    #[test]
    fn location_param_edits_preserve_other_pairs() {
        let parsed = location("/pods?view=list&namespace=a");
        let cleared = parsed.without_param("namespace");
        assert_eq!(cleared.to_string(), "/pods?view=list");
    }

    #[test]
    fn navigation_versions_track_navigations_not_replacements() {
        let mut navigation = Navigation::new(location("/"));
        assert_eq!(navigation.version(), 1);

        navigation.navigate(location("/pods?namespace=a"));
        assert_eq!(navigation.version(), 2);

        navigation.replace(location("/pods"));
        assert_eq!(navigation.version(), 2);
        assert_eq!(navigation.current().to_string(), "/pods");

        assert!(navigation.back());
        assert_eq!(navigation.version(), 3);
        assert_eq!(navigation.current().to_string(), "/");
        assert!(!navigation.back());
    }

    #[test]
    fn gate_consumes_each_stamp_once() {
        let navigation = Navigation::new(location("/pods?namespace=a"));
        let mut gate = UrlSync::new("namespace");
        let stamp = NavigationStamp {
            epoch: 1,
            version: navigation.version(),
        };

        assert_eq!(gate.observe(stamp, &navigation), Some("a"));
        assert_eq!(gate.observe(stamp, &navigation), None);

        let next_epoch = NavigationStamp {
            epoch: 2,
            version: navigation.version(),
        };
        assert_eq!(gate.observe(next_epoch, &navigation), Some("a"));
    }

    #[test]
    fn renamed_param_keeps_consumed_navigation() {
        let navigation = Navigation::new(location("/pods?ns=a"));
        let mut gate = UrlSync::new("namespace");
        let stamp = NavigationStamp {
            epoch: 1,
            version: navigation.version(),
        };
        assert_eq!(gate.observe(stamp, &navigation), None);

        gate.set_param("ns");
        assert_eq!(gate.param(), "ns");
        assert_eq!(gate.observe(stamp, &navigation), None);
    }

    #[test]
    fn clearing_override_replaces_without_history() {
        let mut navigation = Navigation::new(location("/"));
        navigation.navigate(location("/pods?namespace=a&view=list"));
        let gate = UrlSync::new("namespace");

        assert!(gate.clear_override(&mut navigation));
        assert_eq!(navigation.current().to_string(), "/pods?view=list");
        assert_eq!(navigation.version(), 2);
        assert!(!gate.clear_override(&mut navigation));

        assert!(navigation.back());
        assert_eq!(navigation.current().to_string(), "/");
    }
}
